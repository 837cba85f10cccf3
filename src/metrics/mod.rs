pub mod prometheus;

pub use prometheus::init_metrics_server;
