//! Station fan-out across the worker pool.
//!
//! The dispatcher filters the station list, spawns one task per passing
//! station onto a pool bounded by a semaphore, and blocks on the join
//! until every task reaches a terminal state. A failing station never
//! takes its siblings down; the summary reports how each station ended.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::db::MetricStore;
use crate::metrics::Metric;
use crate::provider::DataProvider;
use crate::runner::{scan_station, StationContext, StationOutcome};
use crate::types::Station;

/// Per-outcome station counts for one scan run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub completed: usize,
    pub failed: usize,
    pub filtered: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    /// Total rows durably written across all completed stations.
    pub rows_written: usize,
}

impl std::fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "completed={} failed={} filtered={} skipped={} timed_out={} cancelled={} rows={}",
            self.completed,
            self.failed,
            self.filtered,
            self.skipped,
            self.timed_out,
            self.cancelled,
            self.rows_written
        )
    }
}

pub struct Dispatcher {
    config: ScanConfig,
    ctx: Arc<StationContext>,
}

impl Dispatcher {
    pub fn new(
        config: ScanConfig,
        provider: Arc<dyn DataProvider>,
        store: Arc<dyn MetricStore>,
        metrics: Vec<Arc<dyn Metric>>,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = Arc::new(StationContext {
            day: config.day,
            force_update: config.force_update,
            provider,
            store,
            metrics,
            cancel,
            station_timeout: config.station_timeout_secs.map(Duration::from_secs),
        });
        Self { config, ctx }
    }

    /// Scan every station that passes both filters, `workers` at a time,
    /// and return once all spawned tasks are done.
    pub async fn run(&self, stations: Vec<Station>) -> ScanSummary {
        log::info!(
            "dispatching scan for {} across {} stations with {} workers",
            self.config.day,
            stations.len(),
            self.config.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks: JoinSet<(Station, StationOutcome)> = JoinSet::new();
        let mut summary = ScanSummary::default();

        for station in stations {
            if !self.config.passes_filters(&station) {
                log::debug!("station={} did not pass scan filters", station);
                summary.filtered += 1;
                continue;
            }
            if self.ctx.cancel.is_cancelled() {
                // Stop issuing new work; tasks already spawned run to a
                // terminal state on their own.
                summary.cancelled += 1;
                continue;
            }

            log::debug!("station={} queued", station);
            let ctx = self.ctx.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scan semaphore closed");
                let outcome = scan_station(&station, &ctx).await;
                (station, outcome)
            });
        }

        // Blocking join: the scan is over only when every task has
        // reached a terminal state, successful or not.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((station, outcome)) => match outcome {
                    StationOutcome::Completed { rows } => {
                        summary.completed += 1;
                        summary.rows_written += rows;
                    }
                    StationOutcome::Skipped => summary.skipped += 1,
                    StationOutcome::TimedOut => summary.timed_out += 1,
                    StationOutcome::Cancelled => summary.cancelled += 1,
                    StationOutcome::Failed(reason) => {
                        log::error!("station={} failed: {}", station, reason);
                        summary.failed += 1;
                    }
                },
                Err(join_err) => {
                    log::error!("station task aborted: {}", join_err);
                    summary.failed += 1;
                }
            }
        }

        log::info!("scan finished: {}", summary);
        summary
    }
}
