//! Audio decoding seam. The suite's host application brings its own
//! decoders; the coordinator only needs mono PCM plus a sample rate, so the
//! boundary is a small trait with a WAV-backed default implementation for
//! the practice-room recordings the suite is pointed at most often.

use std::path::{Path, PathBuf};

use thiserror::Error;

use sfp_extract::downmix_to_mono;

/// Decoded audio ready for extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono PCM in [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A decode failure is always per-file and non-fatal to a batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("failed to read samples from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("unsupported sample format in {path} ({bits} bit {format})")]
    UnsupportedFormat {
        path: PathBuf,
        bits: u16,
        format: &'static str,
    },

    #[error("{path} contains no audio channels")]
    NoChannels { path: PathBuf },
}

/// Decode collaborator consumed by the coordinator.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError>;
}

/// Default decoder for PCM WAV files.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError> {
        let mut reader = hound::WavReader::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(DecodeError::NoChannels {
                path: path.to_path_buf(),
            });
        }

        let read_err = |source| DecodeError::Read {
            path: path.to_path_buf(),
            source,
        };
        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(read_err)?,
            (hound::SampleFormat::Int, bits) if bits <= 32 => {
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(read_err)?
            }
            (format, bits) => {
                return Err(DecodeError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    bits,
                    format: match format {
                        hound::SampleFormat::Float => "float",
                        hound::SampleFormat::Int => "int",
                    },
                })
            }
        };

        Ok(DecodedAudio {
            samples: downmix_to_mono(&interleaved, spec.channels as usize),
            sample_rate: spec.sample_rate,
        })
    }
}
