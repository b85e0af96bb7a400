//! Deviation of a channel's power spectrum from a reference noise model
//! within a configured period band.
//!
//! The archive carries each channel's day spectrum; this metric
//! interpolates it onto the model's periods and averages the difference
//! over the band. Positive values mean the channel is noisier than the
//! model.

use std::sync::Arc;

use crate::errors::MetricError;
use crate::metrics::Metric;
use crate::models::{interpolate_onto, NoiseModel};
use crate::types::{Channel, ChannelData, ChannelMeta, StationMetadata};

pub struct NoiseDeviationMetric {
    low_period: f64,
    high_period: f64,
    model: Arc<NoiseModel>,
}

impl NoiseDeviationMetric {
    pub fn new(low_period: f64, high_period: f64, model: Arc<NoiseModel>) -> Self {
        Self {
            low_period,
            high_period,
            model,
        }
    }
}

impl Metric for NoiseDeviationMetric {
    fn version(&self) -> u32 {
        1
    }

    fn base_name(&self) -> &'static str {
        "noise-deviation"
    }

    fn name(&self) -> String {
        format!(
            "{}:{}-{}",
            self.base_name(),
            self.low_period,
            self.high_period
        )
    }

    fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel> {
        // Long-period seismometer channels only.
        meta.channels_with_prefix("LH")
    }

    fn compute(
        &self,
        channel: &Channel,
        data: &ChannelData,
        _meta: &ChannelMeta,
    ) -> Result<Option<f64>, MetricError> {
        let spectrum = match &data.spectrum {
            Some(s) if !s.periods.is_empty() => s,
            _ => {
                log::debug!("no spectrum for channel={}, skipping", channel);
                return Ok(None);
            }
        };

        // The requested band must sit inside the spectrum's period
        // range, otherwise the comparison is meaningless.
        let t_min = spectrum.periods[0];
        let t_max = *spectrum.periods.last().unwrap();
        if self.low_period < t_min || self.high_period > t_max {
            log::warn!(
                "powerband {}-{} outside spectrum range {}-{} for channel={}",
                self.low_period,
                self.high_period,
                t_min,
                t_max,
                channel
            );
            return Ok(None);
        }

        let interp = interpolate_onto(&spectrum.periods, &spectrum.powers, &self.model.periods);

        let mut deviation = 0.0;
        let mut n_periods = 0usize;
        for (k, &period) in self.model.periods.iter().enumerate() {
            if period > self.high_period {
                break;
            }
            if period >= self.low_period {
                if let Some(power) = interp[k] {
                    deviation += power - self.model.powers[k];
                    n_periods += 1;
                }
            }
        }

        if n_periods == 0 {
            return Err(MetricError(format!(
                "band {}-{} contains no model periods",
                self.low_period, self.high_period
            )));
        }

        Ok(Some(deviation / n_periods as f64))
    }
}
