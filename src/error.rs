use thiserror::Error;

/// A market subtitle that is not one of the three known range forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unrecognized range format: {0:?}")]
    UnrecognizedFormat(String),
}

/// Reasons a trading day ends without a decision.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("no market range contains {0:.1}°F")]
    NotFound(f64),
}

/// Failure of a single forecast or observation source.
///
/// Always recovered locally by leaving that source out of the current
/// estimate or poll tick.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_name} fetch failed: {reason}")]
    Fetch { source_name: String, reason: String },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("{0} returned no temperature")]
    MissingValue(String),
}

impl SourceError {
    pub fn fetch(source_name: &str, err: impl std::fmt::Display) -> Self {
        SourceError::Fetch {
            source_name: source_name.to_string(),
            reason: err.to_string(),
        }
    }
}
