//! sfp_match: similarity scoring and ranking over extracted signatures.
//!
//! Matching is read-only over an in-memory corpus. Banded signatures are
//! compared with best-shift normalized cross-correlation; landmark
//! signatures with an offset vote histogram. Raw scores live in [0, 1] and
//! are only comparable within one algorithm; folder weighting reorders the
//! ranking without touching the scores themselves.

mod engine;
mod score;
mod types;

pub use engine::{find_duplicates, find_matches};
pub use score::score_pair;
pub use types::{Candidate, DuplicateCluster, MatchConfig, MatchError, MatchResult};
