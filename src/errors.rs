//! Error types for the scan engine, one enum per concern.

use std::fmt;

/// Fatal configuration problems, surfaced before any station task is
/// dispatched.
#[derive(Debug)]
pub enum ConfigError {
    /// A filter entry was empty or contained characters outside
    /// `[A-Za-z0-9]`.
    InvalidFilter(String),
    /// A metric name in the scan list has no registered variant.
    UnknownMetric(String),
    /// The same metric appears twice in the scan list.
    DuplicateMetric(String),
    /// A `noise-deviation` powerband spec could not be parsed or is
    /// not a positive low < high range.
    InvalidPowerband(String),
    /// The scan day string parsed as neither `YYYY-DDD` nor `YYYY-MM-DD`.
    InvalidDay(String),
    /// A required noise model file was missing or malformed.
    Model(String),
    /// A required setting was absent from the environment.
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidFilter(s) => write!(f, "invalid filter entry: {}", s),
            ConfigError::UnknownMetric(s) => write!(f, "unknown metric: {}", s),
            ConfigError::DuplicateMetric(s) => write!(f, "metric listed twice: {}", s),
            ConfigError::InvalidPowerband(s) => write!(f, "invalid powerband: {}", s),
            ConfigError::InvalidDay(s) => write!(f, "invalid scan day: {}", s),
            ConfigError::Model(s) => write!(f, "noise model error: {}", s),
            ConfigError::Missing(k) => write!(f, "missing required setting: {}", k),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Persistence backend failures.
#[derive(Debug)]
pub enum StoreError {
    /// Could not open or prepare the backing database.
    Unavailable(String),
    /// A lookup or commit failed mid-flight.
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(s) => write!(f, "store unavailable: {}", s),
            StoreError::Database(s) => write!(f, "database error: {}", s),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Archive access failures. A per-channel failure is downgraded to a
/// skip by the runner; a station-level failure fails the station task.
#[derive(Debug)]
pub enum ProviderError {
    Io(std::io::Error),
    Parse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Io(e) => write!(f, "archive I/O error: {}", e),
            ProviderError::Parse(s) => write!(f, "archive parse error: {}", s),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Io(err)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

/// A metric's compute step failed. Distinct from the metric legitimately
/// producing nothing, which is `Ok(None)`.
#[derive(Debug)]
pub struct MetricError(pub String);

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metric computation failed: {}", self.0)
    }
}

impl std::error::Error for MetricError {}
