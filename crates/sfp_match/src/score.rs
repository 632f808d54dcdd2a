//! Similarity scoring. Scores are normalized to [0, 1] and only comparable
//! between signatures of the same algorithm.

use std::collections::HashMap;

use sfp_extract::{Landmark, Signature, SignatureData};

/// Minimum fraction of the shorter banded signature that must overlap at a
/// candidate shift for the correlation to count.
const MIN_OVERLAP_FRACTION: f32 = 0.5;

/// Score a query/candidate pair. Payload kinds that cannot be compared
/// (which only happens across algorithms) score zero.
pub fn score_pair(query: &Signature, candidate: &Signature, max_shift_secs: f32) -> f32 {
    match (&query.data, &candidate.data) {
        (
            SignatureData::Banded {
                bands: qb,
                frames: qf,
                energies: qe,
            },
            SignatureData::Banded {
                bands: cb,
                frames: cf,
                energies: ce,
            },
        ) => {
            if qb != cb {
                return 0.0;
            }
            let max_shift = (max_shift_secs * query.frame_rate).round() as i64;
            banded_score(*qb, *qf, qe, *cf, ce, max_shift)
        }
        (
            SignatureData::Landmarks { landmarks: q },
            SignatureData::Landmarks { landmarks: c },
        ) => landmark_score(q, c),
        _ => 0.0,
    }
}

/// Best-shift normalized cross-correlation of two banded-energy sequences.
///
/// For each shift in the window, the overlapping frames of both signals are
/// compared with a cosine over the flattened band energies; the best shift
/// wins. Energies are non-negative, so the cosine already lands in [0, 1].
fn banded_score(
    bands: usize,
    query_frames: usize,
    query: &[f32],
    cand_frames: usize,
    cand: &[f32],
    max_shift: i64,
) -> f32 {
    if query_frames == 0 || cand_frames == 0 {
        return 0.0;
    }
    let min_overlap =
        ((query_frames.min(cand_frames) as f32 * MIN_OVERLAP_FRACTION) as i64).max(1);

    let mut best = 0.0f32;
    for shift in -max_shift..=max_shift {
        // Query frame t aligns with candidate frame t + shift.
        let t0 = 0i64.max(-shift);
        let t1 = (query_frames as i64).min(cand_frames as i64 - shift);
        if t1 - t0 < min_overlap {
            continue;
        }

        let mut dot = 0.0f64;
        let mut query_norm = 0.0f64;
        let mut cand_norm = 0.0f64;
        for t in t0..t1 {
            let q_row = &query[t as usize * bands..(t as usize + 1) * bands];
            let c_start = (t + shift) as usize * bands;
            let c_row = &cand[c_start..c_start + bands];
            for (q, c) in q_row.iter().zip(c_row) {
                dot += (*q as f64) * (*c as f64);
                query_norm += (*q as f64) * (*q as f64);
                cand_norm += (*c as f64) * (*c as f64);
            }
        }
        if query_norm > 0.0 && cand_norm > 0.0 {
            let cosine = (dot / (query_norm.sqrt() * cand_norm.sqrt())) as f32;
            if cosine > best {
                best = cosine;
            }
        }
    }
    best.clamp(0.0, 1.0)
}

/// Landmark vote histogram: hash-join the two landmark sets, vote per
/// frame-offset, and normalize the dominant offset's votes by the landmark
/// count of the shorter signature. Tolerant of insertions and deletions in
/// a way direct correlation is not.
fn landmark_score(query: &[Landmark], candidate: &[Landmark]) -> f32 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    let mut by_hash: HashMap<u32, Vec<u32>> = HashMap::new();
    for lm in candidate {
        by_hash.entry(lm.hash).or_default().push(lm.frame);
    }

    let mut votes: HashMap<i64, u32> = HashMap::new();
    for lm in query {
        if let Some(frames) = by_hash.get(&lm.hash) {
            for &frame in frames {
                *votes.entry(frame as i64 - lm.frame as i64).or_insert(0) += 1;
            }
        }
    }

    let dominant = votes.values().copied().max().unwrap_or(0) as f32;
    let shorter = query.len().min(candidate.len()) as f32;
    (dominant / shorter).clamp(0.0, 1.0)
}
