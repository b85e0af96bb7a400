//! Scan configuration from environment variables.
//!
//! All knobs come from the environment (a `.env` file is honored by the
//! binary). Validation happens here, before any station task is
//! dispatched; anything invalid is fatal.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use crate::errors::ConfigError;
use crate::types::{ScanDay, Station};

/// An exact-match code filter parsed from a comma-separated list
/// (e.g. `IU,CU` or `ANMO,COLA`). Absent filter means accept-all.
#[derive(Debug, Clone)]
pub struct CodeFilter {
    codes: HashSet<String>,
}

impl CodeFilter {
    /// Parse a comma-separated code list. Entries are upper-cased;
    /// empty entries or characters outside `[A-Za-z0-9]` are rejected.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut codes = HashSet::new();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                return Err(ConfigError::InvalidFilter(format!("empty entry in {:?}", raw)));
            }
            if !entry.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigError::InvalidFilter(entry.to_string()));
            }
            codes.insert(entry.to_ascii_uppercase());
        }
        Ok(CodeFilter { codes })
    }

    pub fn accepts(&self, code: &str) -> bool {
        self.codes.contains(&code.to_ascii_uppercase())
    }
}

/// One metric requested in the scan list. `noise-deviation` takes a
/// powerband suffix (`noise-deviation:0.5-8`, periods in seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    pub powerband: Option<(f64, f64)>,
}

impl MetricSpec {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.split_once(':') {
            None => Ok(MetricSpec {
                name: raw.to_string(),
                powerband: None,
            }),
            Some((name, band)) => {
                let (low, high) = band
                    .split_once('-')
                    .ok_or_else(|| ConfigError::InvalidPowerband(raw.to_string()))?;
                let low: f64 = low
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidPowerband(raw.to_string()))?;
                let high: f64 = high
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidPowerband(raw.to_string()))?;
                if !(low > 0.0 && low < high) {
                    return Err(ConfigError::InvalidPowerband(raw.to_string()));
                }
                Ok(MetricSpec {
                    name: name.to_string(),
                    powerband: Some((low, high)),
                })
            }
        }
    }

    /// Full metric name as persisted, including the band suffix for
    /// powerband metrics.
    pub fn full_name(&self) -> String {
        match self.powerband {
            Some((low, high)) => format!("{}:{}-{}", self.name, low, high),
            None => self.name.clone(),
        }
    }
}

/// Everything one scan run needs, resolved and validated up front.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Calendar day under evaluation.
    pub day: ScanDay,
    /// Root of the day-file archive.
    pub archive_dir: PathBuf,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Metrics to run, in configuration order.
    pub metrics: Vec<MetricSpec>,
    /// Optional network-code filter.
    pub network_filter: Option<CodeFilter>,
    /// Optional station-code filter.
    pub station_filter: Option<CodeFilter>,
    /// Recompute every metric regardless of stored digests.
    pub force_update: bool,
    /// Worker pool size.
    pub workers: usize,
    /// Optional per-station wall-clock budget in seconds.
    pub station_timeout_secs: Option<u64>,
    /// Reference noise model file, required by `noise-deviation`.
    pub noise_model: Option<PathBuf>,
}

impl ScanConfig {
    /// Load from environment variables.
    ///
    /// - `SEISCAN_DAY` (required): `YYYY-DDD` or `YYYY-MM-DD`
    /// - `SEISCAN_ARCHIVE` (required): archive root directory
    /// - `SEISCAN_DB_PATH` (default: /var/lib/seiscan/metrics.db)
    /// - `SEISCAN_METRICS` (default: availability,timing-quality)
    /// - `SEISCAN_NETWORKS` / `SEISCAN_STATIONS` (optional filters)
    /// - `SEISCAN_FORCE_UPDATE` (default: false)
    /// - `SEISCAN_WORKERS` (default: available parallelism)
    /// - `SEISCAN_STATION_TIMEOUT_SECS` (optional)
    /// - `SEISCAN_NLNM_MODEL` (model file for noise-deviation)
    pub fn from_env() -> Result<Self, ConfigError> {
        let day_raw = env::var("SEISCAN_DAY").map_err(|_| ConfigError::Missing("SEISCAN_DAY"))?;
        let day = ScanDay::parse(&day_raw).ok_or(ConfigError::InvalidDay(day_raw))?;

        let archive_dir = env::var("SEISCAN_ARCHIVE")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::Missing("SEISCAN_ARCHIVE"))?;

        let db_path = env::var("SEISCAN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/seiscan/metrics.db"));

        let metrics_raw =
            env::var("SEISCAN_METRICS").unwrap_or_else(|_| "availability,timing-quality".to_string());
        let metrics = Self::parse_metrics(&metrics_raw)?;

        let network_filter = match env::var("SEISCAN_NETWORKS") {
            Ok(raw) => Some(CodeFilter::parse(&raw)?),
            Err(_) => None,
        };
        let station_filter = match env::var("SEISCAN_STATIONS") {
            Ok(raw) => Some(CodeFilter::parse(&raw)?),
            Err(_) => None,
        };

        let force_update = env::var("SEISCAN_FORCE_UPDATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        let workers = env::var("SEISCAN_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or_else(default_workers);

        let station_timeout_secs = env::var("SEISCAN_STATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok());

        let noise_model = env::var("SEISCAN_NLNM_MODEL").ok().map(PathBuf::from);

        let config = ScanConfig {
            day,
            archive_dir,
            db_path,
            metrics,
            network_filter,
            station_filter,
            force_update,
            workers,
            station_timeout_secs,
            noise_model,
        };
        config.validate()?;
        Ok(config)
    }

    fn parse_metrics(raw: &str) -> Result<Vec<MetricSpec>, ConfigError> {
        let mut specs = Vec::new();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            specs.push(MetricSpec::parse(entry)?);
        }
        Ok(specs)
    }

    /// Cross-field checks, run before any task is dispatched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for spec in &self.metrics {
            if !seen.insert(spec.full_name()) {
                return Err(ConfigError::DuplicateMetric(spec.full_name()));
            }
        }
        let needs_model = self.metrics.iter().any(|s| s.name == "noise-deviation");
        if needs_model && self.noise_model.is_none() {
            return Err(ConfigError::Missing("SEISCAN_NLNM_MODEL"));
        }
        Ok(())
    }

    /// A station is scanned iff both filters accept it; a missing
    /// filter accepts everything.
    pub fn passes_filters(&self, station: &Station) -> bool {
        let network_ok = self
            .network_filter
            .as_ref()
            .map(|f| f.accepts(&station.network))
            .unwrap_or(true);
        let station_ok = self
            .station_filter
            .as_ref()
            .map(|f| f.accepts(&station.code))
            .unwrap_or(true);
        network_ok && station_ok
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
