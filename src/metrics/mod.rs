//! Metric contract and the registry of built-in variants.
//!
//! The engine treats metrics opaquely: a metric names itself, declares
//! which channels it applies to, and computes one value per channel.
//! `Ok(None)` from `compute` means the metric legitimately produced
//! nothing for that channel; only `Err` is a fault.

pub mod availability;
pub mod noise_deviation;
pub mod timing_quality;

use std::sync::Arc;

use crate::config::MetricSpec;
use crate::errors::{ConfigError, MetricError};
use crate::models::NoiseModelCache;
use crate::types::{Channel, ChannelData, ChannelMeta, MetricId, StationMetadata};

pub use availability::AvailabilityMetric;
pub use noise_deviation::NoiseDeviationMetric;
pub use timing_quality::TimingQualityMetric;

/// Contract every metric variant satisfies.
pub trait Metric: Send + Sync {
    /// Bumped whenever the computation changes in a way that makes old
    /// stored values stale.
    fn version(&self) -> u32;

    /// Variant name as used in the scan configuration.
    fn base_name(&self) -> &'static str;

    /// Persisted name. Powerband metrics append their band so several
    /// instances of the same variant can coexist.
    fn name(&self) -> String {
        self.base_name().to_string()
    }

    fn id(&self) -> MetricId {
        MetricId {
            name: self.name(),
            version: self.version(),
        }
    }

    /// The channels this metric applies to, derived from station
    /// metadata. Must be deterministic for identical metadata.
    fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel>;

    /// Compute the value for one channel from an in-memory snapshot of
    /// its data and metadata.
    fn compute(
        &self,
        channel: &Channel,
        data: &ChannelData,
        meta: &ChannelMeta,
    ) -> Result<Option<f64>, MetricError>;
}

/// Instantiate the configured metrics, in configuration order.
///
/// The variant set is closed: an unknown name is a configuration error,
/// as is a `noise-deviation` entry without a band or without its model
/// loaded in the cache.
pub fn build_metrics(
    specs: &[MetricSpec],
    models: &NoiseModelCache,
    model_path: Option<&std::path::Path>,
) -> Result<Vec<Arc<dyn Metric>>, ConfigError> {
    let mut metrics: Vec<Arc<dyn Metric>> = Vec::with_capacity(specs.len());
    for spec in specs {
        match spec.name.as_str() {
            "availability" => metrics.push(Arc::new(AvailabilityMetric)),
            "timing-quality" => metrics.push(Arc::new(TimingQualityMetric)),
            "noise-deviation" => {
                let (low, high) = spec
                    .powerband
                    .ok_or_else(|| ConfigError::InvalidPowerband(spec.full_name()))?;
                let path = model_path.ok_or(ConfigError::Missing("SEISCAN_NLNM_MODEL"))?;
                let model = models.get(path).ok_or_else(|| {
                    ConfigError::Model(format!("model not loaded: {}", path.display()))
                })?;
                metrics.push(Arc::new(NoiseDeviationMetric::new(low, high, model)));
            }
            other => return Err(ConfigError::UnknownMetric(other.to_string())),
        }
    }
    Ok(metrics)
}
