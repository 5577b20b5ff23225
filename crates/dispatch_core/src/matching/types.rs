use serde::{Deserialize, Serialize};

use crate::entities::{DriverId, RiderId};

/// A scored rider/driver pairing considered by the matching engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    pub driver_id: DriverId,
    pub pickup_distance_km: f64,
    pub pickup_eta_ms: u64,
    /// Weighted cost; lower is better.
    pub cost: f64,
}

/// A match in the Proposed state: the engine's decision before the
/// dispatcher commits it and assigns a [`crate::entities::MatchId`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposedMatch {
    pub rider_id: RiderId,
    pub driver_id: DriverId,
    pub distance_km: f64,
    pub eta_ms: u64,
    pub score: f64,
    pub proposed_at_ms: u64,
}

impl ProposedMatch {
    pub fn from_candidate(rider_id: RiderId, candidate: MatchCandidate, now_ms: u64) -> Self {
        Self {
            rider_id,
            driver_id: candidate.driver_id,
            distance_km: candidate.pickup_distance_km,
            eta_ms: candidate.pickup_eta_ms,
            score: candidate.cost,
            proposed_at_ms: now_ms,
        }
    }
}
