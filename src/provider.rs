//! Archive access: station metadata and per-channel day data.
//!
//! The scan engine only ever sees this trait; the filesystem layout and
//! file formats live behind it. Waveform preprocessing (including
//! spectral estimation) happens upstream, so the archive already
//! carries everything a metric needs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ProviderError;
use crate::types::{Channel, ChannelData, ScanDay, Station, StationMetadata};

/// Read-only access to one day-file archive. Implementations must be
/// shareable across station tasks.
pub trait DataProvider: Send + Sync {
    /// Station metadata for the given day, or `None` if the station has
    /// no archive entry for that day.
    fn station_metadata(
        &self,
        station: &Station,
        day: ScanDay,
    ) -> Result<Option<StationMetadata>, ProviderError>;

    /// Whether any raw data exists for this channel-day.
    fn has_channel_data(&self, station: &Station, day: ScanDay, channel: &Channel) -> bool;

    /// Load the full data snapshot for one channel-day. `None` means no
    /// data was recorded (not an error).
    fn channel_data(
        &self,
        station: &Station,
        day: ScanDay,
        channel: &Channel,
    ) -> Result<Option<ChannelData>, ProviderError>;
}

/// Filesystem-backed archive:
///
/// ```text
/// <root>/
///   IU_ANMO/
///     2023.001/
///       metadata.json        station + channel metadata
///       00_LHZ.json          one ChannelData file per channel
///       00_LH1.json
/// ```
///
/// The location part of a data file name is `--` for channels with an
/// empty location code.
pub struct FsArchiveProvider {
    root: PathBuf,
}

impl FsArchiveProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Enumerate stations from `<NET>_<STA>` directory names under the
    /// archive root, sorted for a reproducible dispatch order.
    pub fn list_stations(&self) -> Result<Vec<Station>, ProviderError> {
        let mut stations = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some((network, code)) = name.split_once('_') {
                if !network.is_empty() && !code.is_empty() {
                    stations.push(Station::new(network, code));
                }
            }
        }
        stations.sort();
        Ok(stations)
    }

    fn day_dir(&self, station: &Station, day: ScanDay) -> PathBuf {
        self.root
            .join(format!("{}_{}", station.network, station.code))
            .join(day.archive_dir())
    }

    fn data_path(&self, station: &Station, day: ScanDay, channel: &Channel) -> PathBuf {
        let location = if channel.location.is_empty() {
            "--"
        } else {
            channel.location.as_str()
        };
        self.day_dir(station, day)
            .join(format!("{}_{}.json", location, channel.code))
    }
}

impl DataProvider for FsArchiveProvider {
    fn station_metadata(
        &self,
        station: &Station,
        day: ScanDay,
    ) -> Result<Option<StationMetadata>, ProviderError> {
        let path = self.day_dir(station, day).join("metadata.json");
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let meta: StationMetadata = serde_json::from_str(&text)?;
        Ok(Some(meta))
    }

    fn has_channel_data(&self, station: &Station, day: ScanDay, channel: &Channel) -> bool {
        self.data_path(station, day, channel).exists()
    }

    fn channel_data(
        &self,
        station: &Station,
        day: ScanDay,
        channel: &Channel,
    ) -> Result<Option<ChannelData>, ProviderError> {
        let path = self.data_path(station, day, channel);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let data: ChannelData = serde_json::from_str(&text)?;
        Ok(Some(data))
    }
}
