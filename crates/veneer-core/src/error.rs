use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VeneerError>;

/// Errors raised while planning or executing a virtual-table scan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VeneerError {
    /// The constraints can never be satisfied. Recovered by the bridge as an
    /// empty result; never shown to the user.
    #[error("Impossible filter: {0}")]
    ImpossibleFilter(String),

    /// An equality constraint reached the cross-column combinator.
    #[error("Invalid filter combination: {0}")]
    InvalidFilterCombination(String),

    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl VeneerError {
    pub fn impossible(msg: impl Into<String>) -> Self {
        Self::ImpossibleFilter(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedValue(msg.into())
    }

    pub fn is_impossible(&self) -> bool {
        matches!(self, Self::ImpossibleFilter(_))
    }
}

/// Failure reported by an upstream data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub adapter: String,
    /// HTTP status (or equivalent), `None` for transport failures.
    pub status: Option<u16>,
    pub reason: String,
}

impl SourceError {
    pub fn new(adapter: impl Into<String>, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Transport failures, timeouts, throttling and server errors may succeed
    /// on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(s) => s == 408 || s == 429 || s >= 500,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "Source error from '{}' (status {}): {}",
                self.adapter, status, self.reason
            ),
            None => write!(f, "Source error from '{}': {}", self.adapter, self.reason),
        }
    }
}

impl std::error::Error for SourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_retryable() {
        assert!(SourceError::new("weatherapi", None, "connection reset").is_retryable());
        assert!(SourceError::new("weatherapi", Some(429), "slow down").is_retryable());
        assert!(SourceError::new("weatherapi", Some(503), "unavailable").is_retryable());
        assert!(!SourceError::new("weatherapi", Some(400), "bad request").is_retryable());
        assert!(!SourceError::new("weatherapi", Some(404), "not found").is_retryable());
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::new("gsheets", Some(403), "forbidden");
        assert_eq!(
            err.to_string(),
            "Source error from 'gsheets' (status 403): forbidden"
        );
        let err: VeneerError = SourceError::new("gsheets", None, "dns").into();
        assert_eq!(err.to_string(), "Source error from 'gsheets': dns");
    }

    #[test]
    fn test_is_impossible() {
        assert!(VeneerError::impossible("x").is_impossible());
        assert!(!VeneerError::unsupported("x").is_impossible());
    }
}
