//! Peak-pair landmarks: local maxima in the spectrogram paired within a
//! bounded target zone, each pair packed into a 32-bit hash. Peaks survive
//! noise and level changes, and pairing keeps a clip matchable against a
//! longer recording it was cut from.

use std::cmp::Ordering;

use crate::config::ExtractConfig;
use crate::signature::{Landmark, SignatureData};
use crate::spectral::magnitude_spectrogram;

/// Bits reserved for each peak's frequency bin in the packed hash.
const BIN_BITS: u32 = 10;
/// Bits reserved for the frame delta between the paired peaks.
const DELTA_BITS: u32 = 12;

#[derive(Debug, Clone, Copy)]
struct Peak {
    frame: u32,
    bin: u32,
}

pub(crate) fn landmarks(samples: &[f32], cfg: &ExtractConfig) -> SignatureData {
    let spectrogram = magnitude_spectrogram(samples, cfg.frame_size, cfg.hop_size);
    let peaks = pick_peaks(&spectrogram, cfg);

    let mut landmarks = Vec::new();
    for (i, anchor) in peaks.iter().enumerate() {
        for target in peaks.iter().skip(i + 1).take(cfg.target_zone) {
            let delta = target.frame - anchor.frame;
            if delta == 0 {
                // Same-frame pairs carry no time structure.
                continue;
            }
            if delta > cfg.max_pair_delta {
                break;
            }
            landmarks.push(Landmark {
                hash: pack_pair(anchor.bin, target.bin, delta),
                frame: anchor.frame,
            });
        }
    }
    SignatureData::Landmarks { landmarks }
}

/// Local maxima over a square time-frequency neighborhood, gated by a
/// per-frame magnitude floor and capped per frame. Output is ordered by
/// `(frame, bin)`.
fn pick_peaks(spectrogram: &[Vec<f32>], cfg: &ExtractConfig) -> Vec<Peak> {
    let reach = cfg.peak_neighborhood as i64;
    let rows = spectrogram.len() as i64;
    let mut peaks = Vec::new();

    for (t, row) in spectrogram.iter().enumerate() {
        let mean = row.iter().sum::<f32>() / row.len() as f32;
        let floor = mean * cfg.peak_magnitude_floor;

        let mut frame_peaks: Vec<(f32, u32)> = Vec::new();
        for (b, &mag) in row.iter().enumerate() {
            if mag <= floor {
                continue;
            }
            let mut is_max = true;
            'neighborhood: for dt in -reach..=reach {
                let tt = t as i64 + dt;
                if tt < 0 || tt >= rows {
                    continue;
                }
                let other = &spectrogram[tt as usize];
                for db in -reach..=reach {
                    let bb = b as i64 + db;
                    if bb < 0 || bb >= other.len() as i64 || (dt == 0 && db == 0) {
                        continue;
                    }
                    if other[bb as usize] > mag {
                        is_max = false;
                        break 'neighborhood;
                    }
                }
            }
            if is_max {
                frame_peaks.push((mag, b as u32));
            }
        }

        frame_peaks.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        frame_peaks.truncate(cfg.peaks_per_frame);
        frame_peaks.sort_by_key(|p| p.1);
        peaks.extend(frame_peaks.into_iter().map(|(_, bin)| Peak {
            frame: t as u32,
            bin,
        }));
    }
    peaks
}

fn pack_pair(anchor_bin: u32, target_bin: u32, delta: u32) -> u32 {
    let a = anchor_bin & ((1 << BIN_BITS) - 1);
    let t = target_bin & ((1 << BIN_BITS) - 1);
    let d = delta & ((1 << DELTA_BITS) - 1);
    (a << (BIN_BITS + DELTA_BITS)) | (t << DELTA_BITS) | d
}
