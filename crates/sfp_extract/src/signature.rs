//! Signature types produced by the extraction stage.
//!
//! The payload layout is part of the persisted cache contract: any
//! incompatible change to [`SignatureData`] must be accompanied by a bump of
//! the cache schema version in the store crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extraction strategy. The only places allowed to branch on this tag are
/// the extraction dispatch in this crate and score computation in the match
/// engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    /// Banded log-spectral frames; the default, tuned for accuracy.
    #[default]
    Spectral,
    /// Coarser banded frames; trades accuracy for throughput on large batches.
    Lightweight,
    /// Pitch-class symbol sequences hashed into landmarks; level-invariant.
    Chroma,
    /// Spectrogram peak pairs hashed into landmarks; robust to noise and
    /// partial overlap.
    PeakLandmarks,
}

impl SignatureAlgorithm {
    /// Every supported algorithm, in cache-key order.
    pub fn all() -> [SignatureAlgorithm; 4] {
        [
            SignatureAlgorithm::Spectral,
            SignatureAlgorithm::Lightweight,
            SignatureAlgorithm::Chroma,
            SignatureAlgorithm::PeakLandmarks,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Spectral => "spectral",
            SignatureAlgorithm::Lightweight => "lightweight",
            SignatureAlgorithm::Chroma => "chroma",
            SignatureAlgorithm::PeakLandmarks => "peak_landmarks",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hashable time-frequency feature emitted by the landmark algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Landmark {
    /// Packed feature hash. The packing differs per algorithm but is stable
    /// for a given seed and configuration.
    pub hash: u32,
    /// Analysis frame the feature anchors to.
    pub frame: u32,
}

/// Algorithm-specific signature payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureData {
    /// Row-major banded frame energies: `energies[frame * bands + band]`.
    Banded {
        bands: usize,
        frames: usize,
        energies: Vec<f32>,
    },
    /// Unordered-by-hash, frame-anchored landmark set.
    Landmarks { landmarks: Vec<Landmark> },
}

impl SignatureData {
    /// Number of analysis frames the payload spans.
    pub fn frames(&self) -> usize {
        match self {
            SignatureData::Banded { frames, .. } => *frames,
            SignatureData::Landmarks { landmarks } => landmarks
                .iter()
                .map(|lm| lm.frame as usize + 1)
                .max()
                .unwrap_or(0),
        }
    }

    /// Number of landmarks, zero for banded payloads.
    pub fn landmark_count(&self) -> usize {
        match self {
            SignatureData::Banded { .. } => 0,
            SignatureData::Landmarks { landmarks } => landmarks.len(),
        }
    }
}

/// A compact, immutable representation of one audio file's content under one
/// algorithm. Superseded, never mutated, when the source file changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: SignatureAlgorithm,
    pub data: SignatureData,
    /// Analysis frames per second of source audio; converts the match
    /// engine's time windows into frame offsets.
    pub frame_rate: f32,
    pub generated_at: DateTime<Utc>,
    /// Source file mtime (nanoseconds since the unix epoch) at extraction
    /// time. Zero until stamped via [`Signature::with_source_meta`].
    pub source_mtime: i64,
    /// Source file size in bytes at extraction time.
    pub source_size: u64,
}

impl Signature {
    pub(crate) fn new(
        algorithm: SignatureAlgorithm,
        data: SignatureData,
        frame_rate: f32,
    ) -> Signature {
        Signature {
            algorithm,
            data,
            frame_rate,
            generated_at: Utc::now(),
            source_mtime: 0,
            source_size: 0,
        }
    }

    /// Stamp the signature with the source file metadata observed at
    /// extraction time. The store compares these stamps against the live
    /// file to decide staleness.
    pub fn with_source_meta(mut self, mtime: i64, size: u64) -> Signature {
        self.source_mtime = mtime;
        self.source_size = size;
        self
    }

    pub fn frames(&self) -> usize {
        self.data.frames()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.frame_rate > 0.0 {
            self.data.frames() as f32 / self.frame_rate
        } else {
            0.0
        }
    }
}
