//! sfp_extract: signature extraction for songprint.
//!
//! Turns mono PCM into one of four compact fingerprint representations.
//! Extraction is deterministic: identical samples, rate and configuration
//! yield an identical payload. Algorithm choice is a tagged variant on the
//! resulting [`Signature`]; the match engine never branches on it outside
//! its score computation.

use thiserror::Error;

mod chroma;
mod config;
mod peaks;
mod signature;
mod spectral;

pub use config::ExtractConfig;
pub use signature::{Landmark, Signature, SignatureAlgorithm, SignatureData};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    /// The input holds fewer samples than one analysis frame.
    #[error("input too short: {samples} samples, need at least {required}")]
    TooShort { samples: usize, required: usize },

    #[error("sample rate must be > 0")]
    InvalidSampleRate,

    #[error("invalid extract config: {0}")]
    InvalidConfig(String),
}

/// Extract a signature from mono PCM under the given algorithm.
///
/// The returned signature carries zeroed source-file stamps; callers that
/// extracted from a file on disk stamp it via [`Signature::with_source_meta`]
/// before handing it to the store.
pub fn extract(
    samples: &[f32],
    sample_rate: u32,
    algorithm: SignatureAlgorithm,
    cfg: &ExtractConfig,
) -> Result<Signature, ExtractError> {
    cfg.validate()?;
    if sample_rate == 0 {
        return Err(ExtractError::InvalidSampleRate);
    }

    let (frame_size, hop_size) = match algorithm {
        SignatureAlgorithm::Lightweight => (cfg.light_frame_size, cfg.light_hop_size),
        _ => (cfg.frame_size, cfg.hop_size),
    };
    if samples.len() < frame_size {
        return Err(ExtractError::TooShort {
            samples: samples.len(),
            required: frame_size,
        });
    }

    let data = match algorithm {
        SignatureAlgorithm::Spectral => {
            spectral::banded(samples, cfg.frame_size, cfg.hop_size, cfg.bands)
        }
        SignatureAlgorithm::Lightweight => spectral::banded(
            samples,
            cfg.light_frame_size,
            cfg.light_hop_size,
            cfg.light_bands,
        ),
        SignatureAlgorithm::Chroma => chroma::landmarks(samples, sample_rate, cfg),
        SignatureAlgorithm::PeakLandmarks => peaks::landmarks(samples, cfg),
    };

    let frame_rate = sample_rate as f32 / hop_size as f32;
    Ok(Signature::new(algorithm, data, frame_rate))
}

/// Average interleaved multi-channel PCM down to mono.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
