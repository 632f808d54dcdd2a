//! Chroma landmarks: spectral frames folded into 12 pitch classes, the
//! dominant class per frame forming a symbol sequence whose overlapping
//! windows are hashed. Dominant-class symbols make the representation
//! invariant to recording level.

use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::ExtractConfig;
use crate::signature::{Landmark, SignatureData};
use crate::spectral::magnitude_spectrogram;

/// Bins below this frequency carry mostly rumble and DC leakage.
const MIN_PITCH_HZ: f32 = 55.0;
/// Above this the pitch-class mapping gets too dense to be meaningful.
const MAX_PITCH_HZ: f32 = 5000.0;

pub(crate) fn landmarks(samples: &[f32], sample_rate: u32, cfg: &ExtractConfig) -> SignatureData {
    let spectrogram = magnitude_spectrogram(samples, cfg.frame_size, cfg.hop_size);
    let classes = pitch_classes(cfg.frame_size, sample_rate);

    let symbols: Vec<u8> = spectrogram
        .iter()
        .map(|row| dominant_class(row, &classes))
        .collect();

    let window = cfg.chroma_window;
    let mut landmarks = Vec::new();
    if symbols.len() >= window {
        for start in 0..=symbols.len() - window {
            let hash = xxh3_64_with_seed(&symbols[start..start + window], cfg.seed) as u32;
            landmarks.push(Landmark {
                hash,
                frame: start as u32,
            });
        }
    }
    SignatureData::Landmarks { landmarks }
}

/// Pitch class per FFT bin; `None` for bins outside the pitched range.
fn pitch_classes(frame_size: usize, sample_rate: u32) -> Vec<Option<usize>> {
    let bin_hz = sample_rate as f32 / frame_size as f32;
    (0..frame_size / 2)
        .map(|bin| {
            let freq = bin as f32 * bin_hz;
            if !(MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&freq) {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            Some((midi.round() as i32).rem_euclid(12) as usize)
        })
        .collect()
}

/// Dominant pitch class of one magnitude frame; ties resolve to the lowest
/// class so the symbol sequence stays deterministic.
fn dominant_class(row: &[f32], classes: &[Option<usize>]) -> u8 {
    let mut chroma = [0.0f32; 12];
    for (bin, mag) in row.iter().enumerate() {
        if let Some(pc) = classes[bin] {
            chroma[pc] += mag * mag;
        }
    }
    let mut best = 0usize;
    for pc in 1..12 {
        if chroma[pc] > chroma[best] {
            best = pc;
        }
    }
    best as u8
}
