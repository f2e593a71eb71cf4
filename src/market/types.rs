use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Settlement {
    Yes,
    No,
}

/// One contract as listed by the market operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListing {
    pub ticker: String,
    pub subtitle: String,
    pub settlement: Option<Settlement>,
}

impl MarketListing {
    pub fn new(ticker: &str, subtitle: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            subtitle: subtitle.to_string(),
            settlement: None,
        }
    }
}

/// Closed temperature interval a contract pays out on.
///
/// `low` is `-inf` for "or below" contracts and `high` is `+inf` for "or above".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRange {
    pub ticker: String,
    pub subtitle: String,
    #[serde(with = "bound::low")]
    pub low: f64,
    #[serde(with = "bound::high")]
    pub high: f64,
}

impl MarketRange {
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    /// Integer-degree bucket `[floor(t), floor(t) + 1]` used when no market set is at hand.
    pub fn degree_bucket(value: f64) -> Self {
        let low = value.floor();
        let high = low + 1.0;
        Self {
            ticker: String::new(),
            subtitle: format!("{}° to {}°", low as i64, high as i64),
            low,
            high,
        }
    }
}

impl fmt::Display for MarketRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ticker.is_empty() {
            write!(f, "{}", self.subtitle)
        } else {
            write!(f, "{} ({})", self.subtitle, self.ticker)
        }
    }
}

/// JSON has no infinities; unbounded ends are stored as `null`.
mod bound {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub mod low {
        use super::*;

        pub use super::serialize;

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
            Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
        }
    }

    pub mod high {
        use super::*;

        pub use super::serialize;

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
            Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
        }
    }
}
