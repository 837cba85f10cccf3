use serde::{Deserialize, Serialize};

use crate::state::market::TrendDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    LastWeek,
    LastMonth,
    LastThreeMonths,
}

impl TimeWindow {
    pub fn as_param(&self) -> &'static str {
        match self {
            TimeWindow::LastWeek => "now 7-d",
            TimeWindow::LastMonth => "today 1-m",
            TimeWindow::LastThreeMonths => "today 3-m",
        }
    }
}

/// What a single call to the trend source asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendQuery {
    pub keywords: Vec<String>,
    pub geo: String,
    pub window: TimeWindow,
}

/// Interest values (0-100) in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestSeries {
    pub values: Vec<f64>,
}

impl InterestSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        mean(&self.values)
    }

    /// Compare the second half of the window against the first half.
    /// More than 10% relative movement either way counts as a direction.
    pub fn direction(&self) -> TrendDirection {
        if self.values.len() < 2 {
            return TrendDirection::Stable;
        }
        let (first, second) = self.values.split_at(self.values.len() / 2);
        let (first, second) = (mean(first), mean(second));

        if first <= 0.0 {
            return if second > 0.0 {
                TrendDirection::Rising
            } else {
                TrendDirection::Stable
            };
        }

        let change = (second - first) / first;
        if change > DIRECTION_THRESHOLD {
            TrendDirection::Rising
        } else if change < -DIRECTION_THRESHOLD {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        }
    }
}

const DIRECTION_THRESHOLD: f64 = 0.10;

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_window() {
        assert_eq!(InterestSeries::new(vec![40.0, 60.0, 80.0]).mean(), 60.0);
        assert_eq!(InterestSeries::default().mean(), 0.0);
    }

    #[test]
    fn direction_uses_ten_percent_relative_threshold() {
        let rising = InterestSeries::new(vec![50.0, 50.0, 56.0, 56.0]);
        assert_eq!(rising.direction(), TrendDirection::Rising);

        let flat = InterestSeries::new(vec![50.0, 50.0, 55.0, 55.0]);
        assert_eq!(flat.direction(), TrendDirection::Stable);

        let falling = InterestSeries::new(vec![50.0, 50.0, 44.0, 44.0]);
        assert_eq!(falling.direction(), TrendDirection::Falling);
    }

    #[test]
    fn odd_length_puts_middle_point_in_second_half() {
        // first = [10], second = [10, 40] -> mean 25
        let series = InterestSeries::new(vec![10.0, 10.0, 40.0]);
        assert_eq!(series.direction(), TrendDirection::Rising);
    }

    #[test]
    fn zero_baseline() {
        assert_eq!(InterestSeries::new(vec![0.0, 0.0, 5.0, 5.0]).direction(), TrendDirection::Rising);
        assert_eq!(InterestSeries::new(vec![0.0, 0.0]).direction(), TrendDirection::Stable);
        assert_eq!(InterestSeries::new(vec![70.0]).direction(), TrendDirection::Stable);
    }
}
