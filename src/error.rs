use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid range: {0} (expected 6m or 12m)")]
    InvalidRange(String),

    #[error("Invalid granularity: {0} (expected month or quarter)")]
    InvalidGranularity(String),

    #[error("Unknown metric: {0}")]
    InvalidMetric(String),

    #[error("Dimension '{dimension}' is not available for metric '{metric}'")]
    InvalidDimension { metric: String, dimension: String },

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for rejected-input conditions the caller should report as a bad
    /// request. Everything else is an internal error.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Error::InvalidRange(_)
                | Error::InvalidGranularity(_)
                | Error::InvalidMetric(_)
                | Error::InvalidDimension { .. }
                | Error::PeriodParse(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_classification() {
        assert!(Error::InvalidRange("3m".into()).is_bad_request());
        assert!(Error::InvalidGranularity("week".into()).is_bad_request());
        assert!(Error::InvalidDimension {
            metric: "lead_time".into(),
            dimension: "customer".into(),
        }
        .is_bad_request());
        assert!(!Error::Database("disk I/O error".into()).is_bad_request());
        assert!(!Error::Config("bad value".into()).is_bad_request());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::InvalidRange("3m".into()).to_string(),
            "Invalid range: 3m (expected 6m or 12m)"
        );
    }
}
