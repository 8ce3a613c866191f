//! Routing strategies: pick one candidate from a ranked shortlist.
//!
//! The selector hands every strategy a list already sorted by quality tier
//! descending. Both built-in strategies only consider the highest-tier group
//! (a prefix of the input) and never trade tier for availability; a caller
//! who asked for `best-large` gets a tier-3 answer or a failover, not a
//! quiet downgrade.

use crate::selection::{Candidate, RoutingContext, SelectionError};

/// Score difference below which two candidates count as tied.
pub const SCORE_EPSILON: f64 = 0.001;

/// Picks one candidate from a tier-sorted shortlist.
///
/// Implementations return an index into `candidates`. They may use the
/// quota snapshot, EMA latency and priority carried by each candidate;
/// additional strategies (weighted, latency-aware, cost-optimized) fit the
/// same signature.
pub trait RoutingStrategy: Send + Sync {
    /// Strategy name for logs and configuration.
    fn name(&self) -> &'static str;

    /// Choose a candidate, or explain why none is acceptable.
    fn select(
        &self,
        candidates: &[Candidate],
        ctx: &RoutingContext,
    ) -> std::result::Result<usize, SelectionError>;
}

/// Length of the highest-tier prefix of a tier-sorted candidate list.
fn top_tier_len(candidates: &[Candidate]) -> usize {
    let top = candidates[0].tier;
    candidates.iter().take_while(|c| c.tier == top).count()
}

// ============================================================================
// Priority
// ============================================================================

/// Among the highest-tier candidates, picks the lowest configured priority
/// number. Stable on ties: the first of equal-priority candidates wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityStrategy;

impl RoutingStrategy for PriorityStrategy {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn select(
        &self,
        candidates: &[Candidate],
        _ctx: &RoutingContext,
    ) -> std::result::Result<usize, SelectionError> {
        if candidates.is_empty() {
            return Err(SelectionError::Strategy("empty candidate list".to_string()));
        }

        let mut best = 0;
        for i in 1..top_tier_len(candidates) {
            if candidates[i].priority < candidates[best].priority {
                best = i;
            }
        }
        Ok(best)
    }
}

// ============================================================================
// Least-used
// ============================================================================

/// Among the highest-tier candidates, picks the one with the most headroom.
///
/// Each candidate's availability score is the minimum `remaining / limit`
/// ratio over its configured (metric, window) pairs (`1.0` when unlimited),
/// so a single near-exhausted window caps the score. Scores within
/// [`SCORE_EPSILON`] are ties, broken by ascending priority.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastUsedStrategy;

impl RoutingStrategy for LeastUsedStrategy {
    fn name(&self) -> &'static str {
        "least-used"
    }

    fn select(
        &self,
        candidates: &[Candidate],
        _ctx: &RoutingContext,
    ) -> std::result::Result<usize, SelectionError> {
        if candidates.is_empty() {
            return Err(SelectionError::Strategy("empty candidate list".to_string()));
        }

        let mut best = 0;
        let mut best_score = candidates[0].availability_score();

        for i in 1..top_tier_len(candidates) {
            let score = candidates[i].availability_score();
            if score > best_score + SCORE_EPSILON {
                best = i;
                best_score = score;
            } else if (score - best_score).abs() <= SCORE_EPSILON
                && candidates[i].priority < candidates[best].priority
            {
                best = i;
                best_score = score;
            }
        }
        Ok(best)
    }
}
