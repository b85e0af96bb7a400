//! Persistence gateway: digest lookups and atomic batch commits.
//!
//! One table holds every metric value, keyed by
//! `(date, metric_name, metric_version, network, station, location, channel)`
//! with upsert semantics. Station-level metrics (no channel) persist with
//! empty location/channel columns.
//!
//! Concurrency contract: any number of station tasks may look up digests
//! while scans are in flight, but only one commit is ever in its write
//! phase at a time. The `Mutex` around the connection is that single
//! serialization point; a commit is a real SQLite transaction, so a
//! station-day result set lands fully or not at all.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::digest::Digest;
use crate::errors::StoreError;
use crate::result::MetricResult;
use crate::types::{Channel, MetricId, ScanDay, Station};

/// Backend contract for the scan engine. Any store with point lookup
/// and atomic batch-upsert can implement this.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Stored digest for one `(station, day, metric, channel)` key, or
    /// `None` if never computed (or stored under a different version).
    async fn digest_lookup(
        &self,
        station: &Station,
        day: ScanDay,
        metric: &MetricId,
        channel: &Channel,
    ) -> Result<Option<Digest>, StoreError>;

    /// Stored digest for a station-level metric (one that produces a
    /// single value per station rather than per channel).
    async fn station_digest_lookup(
        &self,
        station: &Station,
        day: ScanDay,
        metric: &MetricId,
    ) -> Result<Option<Digest>, StoreError>;

    /// Write every entry of a station-day result as one atomic unit.
    /// Returns the number of rows written.
    async fn commit_results(&self, result: &MetricResult) -> Result<usize, StoreError>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS metric_values (
    date            TEXT NOT NULL,
    metric_name     TEXT NOT NULL,
    metric_version  INTEGER NOT NULL,
    network         TEXT NOT NULL,
    station         TEXT NOT NULL,
    location        TEXT NOT NULL,
    channel         TEXT NOT NULL,
    value           REAL NOT NULL,
    digest          BLOB NOT NULL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (date, metric_name, metric_version, network, station, location, channel)
)";

const UPSERT: &str = "INSERT INTO metric_values
    (date, metric_name, metric_version, network, station, location, channel,
     value, digest, updated_at)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
 ON CONFLICT(date, metric_name, metric_version, network, station, location, channel)
 DO UPDATE SET value = excluded.value,
               digest = excluded.digest,
               updated_at = excluded.updated_at";

/// SQLite-backed store. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct SqliteMetricStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetricStore {
    /// Open (or create) the database, apply pragmas, and ensure the
    /// schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let conn =
            Connection::open(path.as_ref()).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        conn.execute(SCHEMA, [])
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metric_values_station
             ON metric_values(network, station, date)",
            [],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        log::info!("metric store ready at {}", path.as_ref().display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lookup(
        &self,
        station: &Station,
        day: ScanDay,
        metric: &MetricId,
        location: &str,
        channel: &str,
    ) -> Result<Option<Digest>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT digest FROM metric_values
                 WHERE date = ?1 AND metric_name = ?2 AND metric_version = ?3
                   AND network = ?4 AND station = ?5 AND location = ?6 AND channel = ?7",
                params![
                    day.iso(),
                    metric.name,
                    metric.version,
                    station.network,
                    station.code,
                    location,
                    channel,
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.as_deref().and_then(Digest::from_slice))
    }
}

#[async_trait]
impl MetricStore for SqliteMetricStore {
    async fn digest_lookup(
        &self,
        station: &Station,
        day: ScanDay,
        metric: &MetricId,
        channel: &Channel,
    ) -> Result<Option<Digest>, StoreError> {
        self.lookup(station, day, metric, &channel.location, &channel.code)
    }

    async fn station_digest_lookup(
        &self,
        station: &Station,
        day: ScanDay,
        metric: &MetricId,
    ) -> Result<Option<Digest>, StoreError> {
        self.lookup(station, day, metric, "", "")
    }

    async fn commit_results(&self, result: &MetricResult) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut written = 0usize;
        for ((metric, channel), entry) in result.iter() {
            tx.execute(
                UPSERT,
                params![
                    result.day.iso(),
                    metric.name,
                    metric.version,
                    result.station.network,
                    result.station.code,
                    channel.location,
                    channel.code,
                    entry.value,
                    entry.digest.as_bytes(),
                    now,
                ],
            )?;
            written += 1;
        }

        tx.commit()?;
        log::debug!(
            "committed {} rows for {} {}",
            written,
            result.station,
            result.day
        );
        Ok(written)
    }
}

/// Degraded-mode store used when the real database cannot be opened at
/// startup: metrics still run, nothing is durable. Every lookup misses
/// (so everything recomputes) and every commit drops its rows.
pub struct NullMetricStore;

#[async_trait]
impl MetricStore for NullMetricStore {
    async fn digest_lookup(
        &self,
        _station: &Station,
        _day: ScanDay,
        _metric: &MetricId,
        _channel: &Channel,
    ) -> Result<Option<Digest>, StoreError> {
        Ok(None)
    }

    async fn station_digest_lookup(
        &self,
        _station: &Station,
        _day: ScanDay,
        _metric: &MetricId,
    ) -> Result<Option<Digest>, StoreError> {
        Ok(None)
    }

    async fn commit_results(&self, result: &MetricResult) -> Result<usize, StoreError> {
        log::warn!(
            "persistence disabled, dropping {} rows for {} {}",
            result.len(),
            result.station,
            result.day
        );
        Ok(0)
    }
}
