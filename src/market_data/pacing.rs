use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Sequential iterator over outbound queries that enforces a minimum gap
/// between consecutive items. The first item is released immediately.
///
/// Driving every trend-source call through one `Paced` keeps the refresh
/// strictly sequential: the next query is not released until the caller asks
/// for it, which it only does after the previous call has finished.
#[derive(Debug)]
pub struct Paced<T> {
    items: VecDeque<T>,
    min_gap: Duration,
    last_release: Option<Instant>,
}

impl<T> Paced<T> {
    pub fn new(items: impl IntoIterator<Item = T>, min_gap: Duration) -> Self {
        Self {
            items: items.into_iter().collect(),
            min_gap,
            last_release: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    pub async fn next(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        if let Some(last) = self.last_release {
            if !self.min_gap.is_zero() {
                sleep_until(last + self.min_gap).await;
            }
        }
        self.last_release = Some(Instant::now());
        Some(item)
    }
}
