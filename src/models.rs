//! Reference noise models for deviation-style metrics.
//!
//! Model files are plain ASCII, one `period power` pair per line (the
//! NLNM/NHNM distribution format). All configured models are loaded once
//! at startup into an immutable cache keyed by source path; metric
//! variants hold an `Arc` to their model and never touch the filesystem
//! during a scan.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::ConfigError;

/// A (period, power) noise model with periods strictly ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseModel {
    /// Periods in seconds, ascending.
    pub periods: Vec<f64>,
    /// Power in dB at each period.
    pub powers: Vec<f64>,
}

impl NoiseModel {
    /// Parse a model file. Every non-empty line must carry exactly two
    /// numeric fields.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Model(format!("{}: {}", path.display(), e)))?;

        let mut periods = Vec::new();
        let mut powers = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(ConfigError::Model(format!(
                    "{}:{}: expected 2 fields, got {}",
                    path.display(),
                    lineno + 1,
                    fields.len()
                )));
            }
            let period: f64 = fields[0].parse().map_err(|_| {
                ConfigError::Model(format!("{}:{}: bad period", path.display(), lineno + 1))
            })?;
            let power: f64 = fields[1].parse().map_err(|_| {
                ConfigError::Model(format!("{}:{}: bad power", path.display(), lineno + 1))
            })?;
            periods.push(period);
            powers.push(power);
        }

        if periods.len() < 2 {
            return Err(ConfigError::Model(format!(
                "{}: model needs at least 2 points",
                path.display()
            )));
        }
        if !periods.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::Model(format!(
                "{}: periods must be strictly ascending",
                path.display()
            )));
        }

        Ok(NoiseModel { periods, powers })
    }
}

/// Linear interpolation of `(x, y)` samples onto new x positions.
/// Positions outside the sample range yield `None` entries.
pub fn interpolate_onto(x: &[f64], y: &[f64], targets: &[f64]) -> Vec<Option<f64>> {
    targets
        .iter()
        .map(|&t| {
            if x.is_empty() || t < x[0] || t > *x.last().unwrap() {
                return None;
            }
            let idx = x.partition_point(|p| *p < t);
            if idx == 0 {
                return Some(y[0]);
            }
            if (x[idx] - t).abs() < f64::EPSILON {
                return Some(y[idx]);
            }
            let (x0, x1) = (x[idx - 1], x[idx]);
            let (y0, y1) = (y[idx - 1], y[idx]);
            Some(y0 + (y1 - y0) * (t - x0) / (x1 - x0))
        })
        .collect()
}

/// All noise models loaded for this process, built once before the scan
/// starts and read-only afterwards.
#[derive(Debug, Default)]
pub struct NoiseModelCache {
    models: HashMap<PathBuf, Arc<NoiseModel>>,
}

impl NoiseModelCache {
    /// Load every path eagerly; any unreadable or malformed file is a
    /// fatal configuration error.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut models = HashMap::new();
        for path in paths {
            let path = path.as_ref().to_path_buf();
            if !models.contains_key(&path) {
                let model = Arc::new(NoiseModel::from_file(&path)?);
                log::info!(
                    "loaded noise model {} ({} points)",
                    path.display(),
                    model.periods.len()
                );
                models.insert(path, model);
            }
        }
        Ok(NoiseModelCache { models })
    }

    pub fn get(&self, path: &Path) -> Option<Arc<NoiseModel>> {
        self.models.get(path).cloned()
    }
}
