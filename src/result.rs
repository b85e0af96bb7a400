//! Per-station-day result aggregation.
//!
//! A `MetricResult` belongs to exactly one station task: it is created
//! when the scan of a station starts, filled as metrics produce values,
//! handed to the store once for commit, and then dropped. Because it is
//! never shared it needs no locking.

use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt;

use crate::digest::Digest;
use crate::types::{Channel, MetricId, ScanDay, Station};

/// A computed value plus the digest of the inputs that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    pub value: f64,
    pub digest: Digest,
}

/// Attempt to register two values under the same `(metric, channel)`
/// key within one scan. Always a configuration bug, never data-driven.
#[derive(Debug)]
pub struct DuplicateEntry {
    pub metric: MetricId,
    pub channel: Channel,
}

impl fmt::Display for DuplicateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate result for metric={} channel={}",
            self.metric, self.channel
        )
    }
}

impl std::error::Error for DuplicateEntry {}

/// Append-only collection of metric values for one `(station, day)`.
///
/// Backed by a `BTreeMap` so iteration order is deterministic, which
/// keeps commit logging reproducible across runs.
#[derive(Debug)]
pub struct MetricResult {
    pub station: Station,
    pub day: ScanDay,
    entries: BTreeMap<(MetricId, Channel), MetricValue>,
}

impl MetricResult {
    pub fn new(station: Station, day: ScanDay) -> Self {
        Self {
            station,
            day,
            entries: BTreeMap::new(),
        }
    }

    /// Register one value. Overwriting an existing key is rejected.
    pub fn add(
        &mut self,
        metric: MetricId,
        channel: Channel,
        value: f64,
        digest: Digest,
    ) -> Result<(), DuplicateEntry> {
        match self.entries.entry((metric, channel)) {
            Entry::Occupied(occupied) => {
                let (metric, channel) = occupied.key().clone();
                Err(DuplicateEntry { metric, channel })
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MetricValue { value, digest });
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order, ready for persistence.
    pub fn iter(&self) -> impl Iterator<Item = (&(MetricId, Channel), &MetricValue)> {
        self.entries.iter()
    }
}
