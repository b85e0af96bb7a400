//! Per-station scan execution.
//!
//! One `scan_station` call owns one station-day: it walks the configured
//! metrics in order, each metric's applicable channels in sorted order,
//! and only computes where the content digest says the stored value is
//! stale. Everything it aggregates is handed to the store in a single
//! commit at the end; any early exit (cancellation, timeout, failure)
//! discards the aggregate so nothing partial is ever persisted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::db::MetricStore;
use crate::digest::{changed, value_digest};
use crate::metrics::Metric;
use crate::provider::DataProvider;
use crate::result::MetricResult;
use crate::types::{ScanDay, Station};

/// Everything a station task needs, shared across the worker pool.
pub struct StationContext {
    pub day: ScanDay,
    pub force_update: bool,
    pub provider: Arc<dyn DataProvider>,
    pub store: Arc<dyn MetricStore>,
    pub metrics: Vec<Arc<dyn Metric>>,
    pub cancel: CancellationToken,
    pub station_timeout: Option<Duration>,
}

/// Terminal state of one station task.
#[derive(Debug, PartialEq, Eq)]
pub enum StationOutcome {
    /// No archive entry for this station-day.
    Skipped,
    /// Scan ran to the end; `rows` values were durably written.
    Completed { rows: usize },
    /// The task hit an unrecoverable error (metadata unreadable,
    /// duplicate registration, commit failure).
    Failed(String),
    /// The per-station budget expired; partial results were discarded.
    TimedOut,
    /// The scan-wide cancellation signal fired mid-station.
    Cancelled,
}

/// Run every configured metric for one station-day.
pub async fn scan_station(station: &Station, ctx: &StationContext) -> StationOutcome {
    if ctx.cancel.is_cancelled() {
        return StationOutcome::Cancelled;
    }

    let deadline = ctx.station_timeout.map(|t| Instant::now() + t);

    let metadata = match ctx.provider.station_metadata(station, ctx.day) {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            log::debug!("station={} has no archive entry for {}", station, ctx.day);
            return StationOutcome::Skipped;
        }
        Err(e) => {
            log::error!("station={} metadata unreadable: {}", station, e);
            return StationOutcome::Failed(e.to_string());
        }
    };

    let mut result = MetricResult::new(station.clone(), ctx.day);
    let mut computed = 0usize;
    let mut unchanged = 0usize;

    for metric in &ctx.metrics {
        let channels = metric.applicable_channels(&metadata);
        log::debug!(
            "station={} metric={} applies to {} channels",
            station,
            metric.name(),
            channels.len()
        );

        for channel in channels {
            if ctx.cancel.is_cancelled() {
                log::info!("station={} cancelled, discarding partial results", station);
                return StationOutcome::Cancelled;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    log::warn!(
                        "station={} exceeded its time budget, abandoning remaining channels",
                        station
                    );
                    return StationOutcome::TimedOut;
                }
            }

            // Both data and metadata must exist for this channel.
            let chan_meta = match metadata.channel_meta(&channel) {
                Some(m) => m,
                None => {
                    log::debug!("station={} channel={} has no metadata, skipping", station, channel);
                    continue;
                }
            };
            if !ctx.provider.has_channel_data(station, ctx.day, &channel) {
                log::debug!("station={} channel={} has no data, skipping", station, channel);
                continue;
            }
            let data = match ctx.provider.channel_data(station, ctx.day, &channel) {
                Ok(Some(data)) => data,
                Ok(None) => {
                    log::debug!("station={} channel={} has no data, skipping", station, channel);
                    continue;
                }
                Err(e) => {
                    log::warn!(
                        "station={} channel={} data unreadable, skipping: {}",
                        station,
                        channel,
                        e
                    );
                    continue;
                }
            };

            // Digest the in-memory snapshot, then decide whether the
            // stored value is still current.
            let candidate = value_digest(&data, chan_meta, &metric.name(), metric.version());

            if !ctx.force_update {
                let stored = match ctx
                    .store
                    .digest_lookup(station, ctx.day, &metric.id(), &channel)
                    .await
                {
                    Ok(stored) => stored,
                    Err(e) => {
                        log::warn!(
                            "station={} channel={} digest lookup failed, recomputing: {}",
                            station,
                            channel,
                            e
                        );
                        None
                    }
                };
                if !changed(stored.as_ref(), &candidate) {
                    log::debug!(
                        "station={} channel={} metric={} unchanged, skipping",
                        station,
                        channel,
                        metric.name()
                    );
                    unchanged += 1;
                    continue;
                }
            }

            match metric.compute(&channel, &data, chan_meta) {
                Ok(Some(value)) => {
                    if let Err(dup) = result.add(metric.id(), channel.clone(), value, candidate) {
                        log::error!("station={} {}", station, dup);
                        return StationOutcome::Failed(dup.to_string());
                    }
                    computed += 1;
                }
                Ok(None) => {
                    log::debug!(
                        "station={} channel={} metric={} produced no result",
                        station,
                        channel,
                        metric.name()
                    );
                }
                Err(e) => {
                    log::warn!(
                        "station={} channel={} metric={} computation failed, skipping channel: {}",
                        station,
                        channel,
                        metric.name(),
                        e
                    );
                }
            }
        }
    }

    if result.is_empty() {
        log::info!(
            "station={} {}: nothing to commit ({} unchanged)",
            station,
            ctx.day,
            unchanged
        );
        return StationOutcome::Completed { rows: 0 };
    }

    match ctx.store.commit_results(&result).await {
        Ok(rows) => {
            log::info!(
                "station={} {}: committed {} rows ({} computed, {} unchanged)",
                station,
                ctx.day,
                rows,
                computed,
                unchanged
            );
            StationOutcome::Completed { rows }
        }
        Err(e) => {
            log::error!(
                "station={} {}: commit failed, dropping {} rows: {}",
                station,
                ctx.day,
                result.len(),
                e
            );
            StationOutcome::Failed(format!("commit failed: {}", e))
        }
    }
}
