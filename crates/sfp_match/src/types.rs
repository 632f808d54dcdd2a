use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sfp_extract::{Signature, SignatureAlgorithm};

/// Configuration for match and duplicate queries.
///
/// Cheap to clone and serde-friendly so it can be embedded in higher-level
/// configs. Score constants are tunable, not contractual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum raw score for a candidate to count as a match.
    #[serde(default = "MatchConfig::default_threshold")]
    pub threshold: f32,
    /// Time-shift search window for banded correlation, in seconds each way.
    #[serde(default = "MatchConfig::default_max_shift_secs")]
    pub max_shift_secs: f32,
    /// Rank multiplier for candidates living in a reference folder.
    #[serde(default = "MatchConfig::default_reference_boost")]
    pub reference_boost: f32,
    /// Maximum number of results returned by a match query.
    #[serde(default = "MatchConfig::default_max_results")]
    pub max_results: usize,
    /// Score candidates on the rayon pool instead of inline.
    #[serde(default)]
    pub use_parallel: bool,
}

impl MatchConfig {
    pub(crate) fn default_threshold() -> f32 {
        0.7
    }

    pub(crate) fn default_max_shift_secs() -> f32 {
        2.0
    }

    pub(crate) fn default_reference_boost() -> f32 {
        1.5
    }

    pub(crate) fn default_max_results() -> usize {
        10
    }

    /// Validate the configuration for a single query.
    pub fn validate(&self) -> Result<(), MatchError> {
        if !(0.5..=0.95).contains(&self.threshold) {
            return Err(MatchError::InvalidConfig(format!(
                "threshold must be between 0.5 and 0.95 (got {})",
                self.threshold
            )));
        }
        if self.max_shift_secs < 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "max_shift_secs must be >= 0.0 (got {})",
                self.max_shift_secs
            )));
        }
        if self.reference_boost < 1.0 {
            return Err(MatchError::InvalidConfig(format!(
                "reference_boost must be >= 1.0 (got {})",
                self.reference_boost
            )));
        }
        if self.max_results == 0 {
            return Err(MatchError::InvalidConfig(
                "max_results must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
            max_shift_secs: Self::default_max_shift_secs(),
            reference_boost: Self::default_reference_boost(),
            max_results: Self::default_max_results(),
            use_parallel: false,
        }
    }
}

/// One corpus entry: a file, its signature, and the weight of the folder it
/// lives in (1.0 normally, boosted for reference folders; an ignored
/// folder's files never enter the corpus at all).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub file: PathBuf,
    pub signature: Signature,
    pub folder_weight: f32,
}

/// A single scored hit. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub query_file: PathBuf,
    pub candidate_file: PathBuf,
    pub algorithm: SignatureAlgorithm,
    /// Raw similarity in [0, 1]; independent of folder weighting.
    pub score: f32,
    pub folder_weight: f32,
}

/// A connected component of the pairwise-similarity graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCluster {
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = MatchConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.threshold, 0.7);
    }

    #[test]
    fn threshold_outside_band_rejected() {
        for threshold in [0.4, 0.96, -1.0] {
            let cfg = MatchConfig {
                threshold,
                ..MatchConfig::default()
            };
            let err = cfg.validate().expect_err("config should be invalid");
            assert!(err.to_string().contains("threshold"), "{err}");
        }
    }

    #[test]
    fn reference_boost_below_one_rejected() {
        let cfg = MatchConfig {
            reference_boost: 0.5,
            ..MatchConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_max_results_rejected() {
        let cfg = MatchConfig {
            max_results: 0,
            ..MatchConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
