//! Match queries and duplicate clustering over an in-memory corpus.

use std::cmp::Ordering;
use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use sfp_extract::Signature;

use crate::score::score_pair;
use crate::types::{Candidate, DuplicateCluster, MatchConfig, MatchError, MatchResult};

/// Rank matches for one query signature against a corpus.
///
/// Candidates under a different algorithm are skipped; scores are only
/// comparable within one algorithm. Results at or above the threshold are
/// ordered by `score * folder_weight` descending, then by path for a stable
/// order, and truncated to `max_results`. The raw score is what the
/// threshold applies to; folder weight only reorders.
pub fn find_matches(
    query_file: &Path,
    query: &Signature,
    corpus: &[Candidate],
    cfg: &MatchConfig,
) -> Result<Vec<MatchResult>, MatchError> {
    cfg.validate()?;

    let score_one = |candidate: &Candidate| -> Option<MatchResult> {
        if candidate.signature.algorithm != query.algorithm {
            return None;
        }
        let score = score_pair(query, &candidate.signature, cfg.max_shift_secs);
        if score < cfg.threshold {
            return None;
        }
        Some(MatchResult {
            query_file: query_file.to_path_buf(),
            candidate_file: candidate.file.clone(),
            algorithm: query.algorithm,
            score,
            folder_weight: candidate.folder_weight,
        })
    };

    let mut results: Vec<MatchResult> = if cfg.use_parallel {
        corpus.par_iter().filter_map(score_one).collect()
    } else {
        corpus.iter().filter_map(score_one).collect()
    };

    results.sort_by(|a, b| {
        let ka = a.score * a.folder_weight;
        let kb = b.score * b.folder_weight;
        kb.partial_cmp(&ka)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.candidate_file.cmp(&b.candidate_file))
    });
    results.truncate(cfg.max_results);

    debug!(
        query = %query_file.display(),
        candidates = corpus.len(),
        hits = results.len(),
        "match query complete"
    );
    Ok(results)
}

/// Find duplicate clusters across a corpus in one batched pairwise pass.
///
/// Signatures are already in memory; no per-pair reload happens. An edge
/// joins two files when their raw score reaches the threshold; clusters are
/// the connected components with at least two members, ordered by their
/// first file for determinism.
pub fn find_duplicates(
    corpus: &[Candidate],
    cfg: &MatchConfig,
) -> Result<Vec<DuplicateCluster>, MatchError> {
    cfg.validate()?;

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for i in 0..corpus.len() {
        for j in i + 1..corpus.len() {
            if corpus[i].signature.algorithm == corpus[j].signature.algorithm {
                pairs.push((i, j));
            }
        }
    }

    let score_edge = |&(i, j): &(usize, usize)| -> Option<(usize, usize)> {
        let score = score_pair(
            &corpus[i].signature,
            &corpus[j].signature,
            cfg.max_shift_secs,
        );
        (score >= cfg.threshold).then_some((i, j))
    };

    let edges: Vec<(usize, usize)> = if cfg.use_parallel {
        pairs.par_iter().filter_map(score_edge).collect()
    } else {
        pairs.iter().filter_map(score_edge).collect()
    };

    let mut dsu = UnionFind::new(corpus.len());
    for (i, j) in edges {
        dsu.union(i, j);
    }

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); corpus.len()];
    for i in 0..corpus.len() {
        members[dsu.find(i)].push(i);
    }

    let mut clusters: Vec<DuplicateCluster> = members
        .into_iter()
        .filter(|group| group.len() >= 2)
        .map(|group| {
            let mut files: Vec<_> = group.into_iter().map(|i| corpus[i].file.clone()).collect();
            files.sort();
            DuplicateCluster { files }
        })
        .collect();
    clusters.sort_by(|a, b| a.files[0].cmp(&b.files[0]));

    debug!(
        corpus = corpus.len(),
        clusters = clusters.len(),
        "duplicate pass complete"
    );
    Ok(clusters)
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> UnionFind {
        UnionFind {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            // Path halving keeps the forest shallow without recursion.
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}
