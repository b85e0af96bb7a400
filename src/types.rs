//! Core identity and data types shared across the scan engine.
//!
//! These types carry no I/O and no logic beyond formatting and parsing;
//! every other module imports them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A seismic station, identified by its network and station codes
/// (e.g. `IU.ANMO`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Station {
    pub network: String,
    pub code: String,
}

impl Station {
    pub fn new(network: &str, code: &str) -> Self {
        Self {
            network: network.to_string(),
            code: code.to_string(),
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.network, self.code)
    }
}

/// One sensor component stream within a station, identified by its
/// location and channel codes (e.g. `00.LHZ`). The location code may be
/// empty for stations that only carry a single sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel {
    pub location: String,
    pub code: String,
}

impl Channel {
    pub fn new(location: &str, code: &str) -> Self {
        Self {
            location: location.to_string(),
            code: code.to_string(),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "--.{}", self.code)
        } else {
            write!(f, "{}.{}", self.location, self.code)
        }
    }
}

/// The single calendar day a scan run evaluates.
///
/// Accepts both the julian form used in archive layouts (`2023-001`) and
/// plain ISO dates (`2023-01-01`). Displays as julian, persists as ISO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanDay(pub NaiveDate);

impl ScanDay {
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s, "%Y-%j")
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .ok()
            .map(ScanDay)
    }

    /// ISO date string used as the persistence key (`2023-01-01`).
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Archive directory form (`2023.001`).
    pub fn archive_dir(&self) -> String {
        self.0.format("%Y.%j").to_string()
    }
}

impl fmt::Display for ScanDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%j"))
    }
}

/// Identifies one metric variant by its persisted name and version. A
/// version bump makes every previously stored digest for that metric
/// stale, forcing recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    pub name: String,
    pub version: u32,
}

impl MetricId {
    pub fn new(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            version,
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}", self.name, self.version)
    }
}

/// Per-channel metadata as recorded in the station's day archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub location: String,
    pub code: String,
    pub sample_rate_hz: f64,
    /// Whether this channel records continuously (as opposed to
    /// triggered/event channels).
    pub continuous: bool,
    /// Instrument response epoch identifier; part of the metadata
    /// fingerprint so a response change re-triggers computation.
    pub epoch: String,
}

impl ChannelMeta {
    pub fn channel(&self) -> Channel {
        Channel::new(&self.location, &self.code)
    }
}

/// Station metadata for one day: the channel inventory with per-channel
/// attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationMetadata {
    pub network: String,
    pub station: String,
    pub channels: Vec<ChannelMeta>,
}

impl StationMetadata {
    pub fn channel_meta(&self, channel: &Channel) -> Option<&ChannelMeta> {
        self.channels
            .iter()
            .find(|m| m.location == channel.location && m.code == channel.code)
    }

    /// Channels whose code starts with the given prefix, sorted for
    /// reproducible iteration order.
    pub fn channels_with_prefix(&self, prefix: &str) -> Vec<Channel> {
        let mut out: Vec<Channel> = self
            .channels
            .iter()
            .filter(|m| m.code.starts_with(prefix))
            .map(|m| m.channel())
            .collect();
        out.sort();
        out
    }

    /// All continuously recording channels, sorted.
    pub fn continuous_channels(&self) -> Vec<Channel> {
        let mut out: Vec<Channel> = self
            .channels
            .iter()
            .filter(|m| m.continuous)
            .map(|m| m.channel())
            .collect();
        out.sort();
        out
    }
}

/// A precomputed power spectrum for one channel-day, in (period, power)
/// pairs. Spectral estimation happens upstream of the scan engine; the
/// archive carries the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumData {
    /// Periods in seconds, ascending.
    pub periods: Vec<f64>,
    /// Power in dB at each period.
    pub powers: Vec<f64>,
}

/// One channel's raw day data as loaded from the archive. Loaded in full
/// before any digesting or computation, so every metric sees one
/// consistent snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub sample_rate_hz: f64,
    pub samples: Vec<f64>,
    /// Per-record timing quality, 0-100.
    #[serde(default)]
    pub timing_quality: Vec<u8>,
    #[serde(default)]
    pub spectrum: Option<SpectrumData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_day_parses_julian_and_iso() {
        let julian = ScanDay::parse("2023-001").unwrap();
        let iso = ScanDay::parse("2023-01-01").unwrap();
        assert_eq!(julian, iso);
        assert_eq!(julian.iso(), "2023-01-01");
        assert_eq!(julian.to_string(), "2023-001");
        assert_eq!(julian.archive_dir(), "2023.001");
    }

    #[test]
    fn test_scan_day_rejects_garbage() {
        assert!(ScanDay::parse("not-a-day").is_none());
        assert!(ScanDay::parse("2023-400").is_none());
    }

    #[test]
    fn test_channel_display_uses_dashes_for_empty_location() {
        assert_eq!(Channel::new("00", "LHZ").to_string(), "00.LHZ");
        assert_eq!(Channel::new("", "LHZ").to_string(), "--.LHZ");
    }

    #[test]
    fn test_channels_with_prefix_is_sorted() {
        let meta = StationMetadata {
            network: "IU".to_string(),
            station: "ANMO".to_string(),
            channels: vec![
                ChannelMeta {
                    location: "10".to_string(),
                    code: "LHZ".to_string(),
                    sample_rate_hz: 1.0,
                    continuous: true,
                    epoch: "e1".to_string(),
                },
                ChannelMeta {
                    location: "00".to_string(),
                    code: "LHZ".to_string(),
                    sample_rate_hz: 1.0,
                    continuous: true,
                    epoch: "e1".to_string(),
                },
                ChannelMeta {
                    location: "00".to_string(),
                    code: "BHZ".to_string(),
                    sample_rate_hz: 40.0,
                    continuous: true,
                    epoch: "e1".to_string(),
                },
            ],
        };
        let lh = meta.channels_with_prefix("LH");
        assert_eq!(lh, vec![Channel::new("00", "LHZ"), Channel::new("10", "LHZ")]);
        assert_eq!(meta.continuous_channels().len(), 3);
    }
}
