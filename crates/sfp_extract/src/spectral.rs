//! Windowed FFT analysis shared by every algorithm: magnitude spectrograms
//! and log-spaced band energies.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::signature::SignatureData;

/// Hann window coefficients for a frame of `len` samples.
pub(crate) fn hann_window(len: usize) -> Vec<f32> {
    let denom = len as f32;
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / denom;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Magnitude spectrogram: one row per frame, `frame_size / 2` bins per row.
/// Trailing samples that do not fill a whole frame are dropped.
pub(crate) fn magnitude_spectrogram(
    samples: &[f32],
    frame_size: usize,
    hop_size: usize,
) -> Vec<Vec<f32>> {
    let window = hann_window(frame_size);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);

    let bins = frame_size / 2;
    let mut frames = Vec::new();
    let mut buffer = vec![Complex { re: 0.0f32, im: 0.0f32 }; frame_size];

    let mut start = 0;
    while start + frame_size <= samples.len() {
        for (slot, (sample, coeff)) in buffer
            .iter_mut()
            .zip(samples[start..start + frame_size].iter().zip(window.iter()))
        {
            *slot = Complex {
                re: sample * coeff,
                im: 0.0,
            };
        }
        fft.process(&mut buffer);
        frames.push(buffer[..bins].iter().map(|c| c.norm()).collect());
        start += hop_size;
    }
    frames
}

/// Log-spaced band edges over the bin range `[1, bins]`, `bands + 1` entries.
/// Every band covers at least one bin.
pub(crate) fn log_band_edges(bins: usize, bands: usize) -> Vec<usize> {
    let hi = bins as f32;
    let mut edges = Vec::with_capacity(bands + 1);
    for b in 0..=bands {
        let edge = hi.powf(b as f32 / bands as f32).round() as usize;
        edges.push(edge.min(bins));
    }
    for i in 1..edges.len() {
        let floor = edges[i - 1] + 1;
        if edges[i] < floor {
            edges[i] = floor.min(bins);
        }
    }
    edges
}

/// Banded log-compressed frame energies over the whole signal.
pub(crate) fn banded(
    samples: &[f32],
    frame_size: usize,
    hop_size: usize,
    bands: usize,
) -> SignatureData {
    let spectrogram = magnitude_spectrogram(samples, frame_size, hop_size);
    let edges = log_band_edges(frame_size / 2, bands);

    let frames = spectrogram.len();
    let mut energies = Vec::with_capacity(frames * bands);
    for row in &spectrogram {
        for band in 0..bands {
            let (lo, hi) = (edges[band], edges[band + 1]);
            let energy: f32 = row[lo..hi].iter().map(|m| m * m).sum();
            energies.push((1.0 + energy).ln());
        }
    }

    SignatureData::Banded {
        bands,
        frames,
        energies,
    }
}
