pub mod http_trends;

pub use http_trends::HttpTrendSource;
