//! Extraction configuration. Everything is runtime-configurable; there are
//! no feature flags.

use serde::{Deserialize, Serialize};

use crate::ExtractError;

/// Tunables for every extraction algorithm. One config covers all four so a
/// folder's signatures stay mutually comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// FFT frame size for the spectral, chroma and peak algorithms (default 2048).
    pub frame_size: usize,
    /// Hop between frames (default 512).
    pub hop_size: usize,
    /// Log-spaced bands per spectral frame (default 32).
    pub bands: usize,
    /// FFT frame size for the lightweight algorithm (default 4096).
    pub light_frame_size: usize,
    /// Hop for the lightweight algorithm (default 2048).
    pub light_hop_size: usize,
    /// Bands for the lightweight algorithm (default 16).
    pub light_bands: usize,
    /// Chroma symbols hashed per landmark (default 8).
    pub chroma_window: usize,
    /// Half-width, in frames and bins, of the peak local-maximum
    /// neighborhood (default 2).
    pub peak_neighborhood: usize,
    /// Multiple of the frame's mean magnitude a peak must clear (default 2.0).
    pub peak_magnitude_floor: f32,
    /// Peak cap per frame (default 5).
    pub peaks_per_frame: usize,
    /// Peaks paired ahead of each anchor (default 5).
    pub target_zone: usize,
    /// Upper bound on the frame delta of a peak pair (default 63).
    pub max_pair_delta: u32,
    /// Seed for landmark hashing.
    pub seed: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            bands: 32,
            light_frame_size: 4096,
            light_hop_size: 2048,
            light_bands: 16,
            chroma_window: 8,
            peak_neighborhood: 2,
            peak_magnitude_floor: 2.0,
            peaks_per_frame: 5,
            target_zone: 5,
            max_pair_delta: 63,
            seed: 0x50_4E_47_5F_53_4F_4E_47,
        }
    }
}

impl ExtractConfig {
    /// Validate the configuration before any extraction.
    pub fn validate(&self) -> Result<(), ExtractError> {
        for (label, frame, hop) in [
            ("frame_size", self.frame_size, self.hop_size),
            ("light_frame_size", self.light_frame_size, self.light_hop_size),
        ] {
            if !frame.is_power_of_two() || frame < 64 {
                return Err(ExtractError::InvalidConfig(format!(
                    "{label} must be a power of two >= 64 (got {frame})"
                )));
            }
            if hop == 0 || hop > frame {
                return Err(ExtractError::InvalidConfig(format!(
                    "hop for {label} must be in 1..={frame} (got {hop})"
                )));
            }
        }
        for (label, bands, frame) in [
            ("bands", self.bands, self.frame_size),
            ("light_bands", self.light_bands, self.light_frame_size),
        ] {
            if bands == 0 || bands * 2 > frame / 2 {
                return Err(ExtractError::InvalidConfig(format!(
                    "{label} must be in 1..={} (got {bands})",
                    frame / 4
                )));
            }
        }
        if self.chroma_window < 2 {
            return Err(ExtractError::InvalidConfig(format!(
                "chroma_window must be >= 2 (got {})",
                self.chroma_window
            )));
        }
        if self.peaks_per_frame == 0 || self.target_zone == 0 || self.max_pair_delta == 0 {
            return Err(ExtractError::InvalidConfig(
                "peaks_per_frame, target_zone and max_pair_delta must be >= 1".into(),
            ));
        }
        if self.peak_magnitude_floor < 0.0 {
            return Err(ExtractError::InvalidConfig(format!(
                "peak_magnitude_floor must be >= 0.0 (got {})",
                self.peak_magnitude_floor
            )));
        }
        Ok(())
    }
}
