//! Incremental quality-control scanning of archived seismic-station
//! day files.
//!
//! One run evaluates one calendar day: every configured metric runs over
//! every applicable channel of every station that passes the scan
//! filters, but only where the content digest shows the stored value is
//! stale. Results land in SQLite, one atomic commit per station-day.

pub mod config;
pub mod db;
pub mod digest;
pub mod dispatcher;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod result;
pub mod runner;
pub mod types;

pub use config::ScanConfig;
pub use db::{MetricStore, NullMetricStore, SqliteMetricStore};
pub use dispatcher::{Dispatcher, ScanSummary};
pub use metrics::Metric;
pub use provider::{DataProvider, FsArchiveProvider};
pub use runner::{StationContext, StationOutcome};
pub use types::{Channel, ScanDay, Station};
