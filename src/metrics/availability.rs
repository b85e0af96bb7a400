//! Data availability: percentage of the day's expected samples that are
//! actually present in the archive.

use crate::errors::MetricError;
use crate::metrics::Metric;
use crate::types::{Channel, ChannelData, ChannelMeta, StationMetadata};

const SECONDS_PER_DAY: f64 = 86_400.0;

pub struct AvailabilityMetric;

impl Metric for AvailabilityMetric {
    fn version(&self) -> u32 {
        1
    }

    fn base_name(&self) -> &'static str {
        "availability"
    }

    fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel> {
        // Every channel in the inventory has an availability figure.
        meta.channels_with_prefix("")
    }

    fn compute(
        &self,
        _channel: &Channel,
        data: &ChannelData,
        meta: &ChannelMeta,
    ) -> Result<Option<f64>, MetricError> {
        if meta.sample_rate_hz <= 0.0 {
            return Ok(None);
        }
        let expected = meta.sample_rate_hz * SECONDS_PER_DAY;
        let percent = (data.samples.len() as f64 / expected) * 100.0;
        Ok(Some(percent.min(100.0)))
    }
}
