//! Content digests for change detection.
//!
//! A digest fingerprints everything that can influence one metric value
//! for one channel-day: the raw data snapshot, the channel metadata, and
//! the metric version. If the stored digest for a key equals the freshly
//! computed one, recomputation is redundant and the engine skips it.

use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;

use crate::types::{ChannelData, ChannelMeta};

/// Fixed-length content hash. Byte equality is the only comparison that
/// matters; display is hex for logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Reconstruct from a stored blob. Returns `None` if the blob has
    /// the wrong length (a corrupt row reads as "no stored digest",
    /// which forces recomputation).
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Digest(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

/// Compute the candidate digest for one `(metric, channel)` pair from an
/// in-memory snapshot of the channel's data and metadata.
///
/// The inputs are serialized in a fixed field order, so the digest is
/// byte-identical across runs and processes for identical inputs.
pub fn value_digest(data: &ChannelData, meta: &ChannelMeta, base_name: &str, version: u32) -> Digest {
    let mut hasher = Sha256::new();

    // Raw-data descriptor.
    hasher.update(data.sample_rate_hz.to_le_bytes());
    hasher.update((data.samples.len() as u64).to_le_bytes());
    for s in &data.samples {
        hasher.update(s.to_le_bytes());
    }
    hasher.update((data.timing_quality.len() as u64).to_le_bytes());
    hasher.update(&data.timing_quality);
    match &data.spectrum {
        Some(spec) => {
            hasher.update((spec.periods.len() as u64).to_le_bytes());
            for (p, v) in spec.periods.iter().zip(&spec.powers) {
                hasher.update(p.to_le_bytes());
                hasher.update(v.to_le_bytes());
            }
        }
        None => hasher.update(0u64.to_le_bytes()),
    }

    // Metadata descriptor.
    hasher.update(meta.location.as_bytes());
    hasher.update(b".");
    hasher.update(meta.code.as_bytes());
    hasher.update(meta.sample_rate_hz.to_le_bytes());
    hasher.update([meta.continuous as u8]);
    hasher.update(meta.epoch.as_bytes());

    // Metric identity.
    hasher.update(base_name.as_bytes());
    hasher.update(version.to_le_bytes());

    Digest(hasher.finalize().into())
}

/// Pure change check: a key needs recomputation iff no digest is stored
/// or the stored one differs byte-for-byte from the candidate.
pub fn changed(stored: Option<&Digest>, candidate: &Digest) -> bool {
    match stored {
        None => true,
        Some(prev) => prev != candidate,
    }
}
