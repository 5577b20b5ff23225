use std::collections::HashSet;

use crate::entities::{Driver, Rider};
use crate::error::DispatchResult;

use super::types::ProposedMatch;

/// Trait for matching algorithms that pair riders with drivers.
///
/// Implementations are pure decision functions over the snapshot they are
/// given: they never mutate pools, so the caller must commit a proposal in the
/// same critical section that produced the snapshot.
pub trait MatchingAlgorithm: Send + Sync {
    /// Pick one driver for a single rider.
    ///
    /// `candidates` are Available drivers, usually pre-ranked by the geo index.
    /// Returns `Ok(None)` when no candidate is eligible; that is the normal
    /// "no driver available" outcome, not an error.
    fn propose(
        &self,
        rider: &Rider,
        candidates: &[Driver],
        now_ms: u64,
    ) -> DispatchResult<Option<ProposedMatch>>;

    /// Pair several riders at once. No driver appears in two proposals.
    ///
    /// The default walks `riders` in order and lets each take its best
    /// remaining driver. Algorithms can override this to optimize globally.
    fn propose_batch(
        &self,
        riders: &[Rider],
        candidates: &[Driver],
        now_ms: u64,
    ) -> DispatchResult<Vec<ProposedMatch>> {
        let mut used = HashSet::new();
        let mut proposals = Vec::new();
        for rider in riders {
            let remaining: Vec<Driver> = candidates
                .iter()
                .filter(|driver| !used.contains(&driver.id))
                .cloned()
                .collect();
            if remaining.is_empty() {
                break;
            }
            if let Some(proposal) = self.propose(rider, &remaining, now_ms)? {
                used.insert(proposal.driver_id);
                proposals.push(proposal);
            }
        }
        Ok(proposals)
    }
}
