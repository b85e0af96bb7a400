//! Average timing quality across a channel-day's data records.

use crate::errors::MetricError;
use crate::metrics::Metric;
use crate::types::{Channel, ChannelData, ChannelMeta, StationMetadata};

pub struct TimingQualityMetric;

impl Metric for TimingQualityMetric {
    fn version(&self) -> u32 {
        1
    }

    fn base_name(&self) -> &'static str {
        "timing-quality"
    }

    fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel> {
        meta.continuous_channels()
    }

    fn compute(
        &self,
        channel: &Channel,
        data: &ChannelData,
        _meta: &ChannelMeta,
    ) -> Result<Option<f64>, MetricError> {
        if data.timing_quality.is_empty() {
            // Not every datalogger reports timing quality; nothing to
            // average is a legitimate empty outcome.
            log::debug!("no timing quality measurements for channel={}", channel);
            return Ok(None);
        }
        let total: u64 = data.timing_quality.iter().map(|&q| q as u64).sum();
        Ok(Some(total as f64 / data.timing_quality.len() as f64))
    }
}
