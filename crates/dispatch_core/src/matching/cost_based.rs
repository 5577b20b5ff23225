use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::cost::{CostModel, HaversineCostModel};
use crate::entities::{Driver, DriverStatus, Rider};
use crate::error::DispatchResult;

use super::algorithm::MatchingAlgorithm;
use super::types::{MatchCandidate, ProposedMatch};

/// Cost-based matching: scores each candidate as
/// `distance_weight * pickup_km + eta_weight * pickup_secs` and picks the
/// cheapest, breaking ties on the lowest driver id.
#[derive(Clone)]
pub struct CostBasedMatching {
    cost_model: Arc<dyn CostModel>,
    pub distance_weight: f64,
    pub eta_weight: f64,
    /// Candidates farther than this are skipped.
    pub max_pickup_km: Option<f64>,
}

impl CostBasedMatching {
    pub fn new(cost_model: Arc<dyn CostModel>, distance_weight: f64, eta_weight: f64) -> Self {
        Self {
            cost_model,
            distance_weight,
            eta_weight,
            max_pickup_km: None,
        }
    }

    pub fn from_config(cost_model: Arc<dyn CostModel>, config: &DispatchConfig) -> Self {
        Self {
            max_pickup_km: config.max_pickup_km,
            ..Self::new(cost_model, config.distance_weight, config.eta_weight)
        }
    }

    pub fn with_max_pickup_km(mut self, km: f64) -> Self {
        self.max_pickup_km = Some(km);
        self
    }

    fn weighted_cost(&self, pickup_distance_km: f64, pickup_eta_ms: u64) -> f64 {
        self.distance_weight * pickup_distance_km
            + self.eta_weight * (pickup_eta_ms as f64 / 1000.0)
    }

    /// Score one pairing. `None` when the driver is not eligible, including
    /// pairs the cost model cannot price.
    pub fn candidate(&self, rider: &Rider, driver: &Driver) -> DispatchResult<Option<MatchCandidate>> {
        if driver.status != DriverStatus::Available {
            return Ok(None);
        }
        let estimate = match self.cost_model.estimate(&driver.location, &rider.origin) {
            Ok(estimate) => estimate,
            Err(err) => {
                tracing::debug!(
                    rider_id = %rider.id,
                    driver_id = %driver.id,
                    error = %err,
                    "pair has no cost, skipping"
                );
                return Ok(None);
            }
        };
        if self
            .max_pickup_km
            .is_some_and(|limit| estimate.distance_km > limit)
        {
            return Ok(None);
        }
        Ok(Some(MatchCandidate {
            driver_id: driver.id,
            pickup_distance_km: estimate.distance_km,
            pickup_eta_ms: estimate.eta_ms,
            cost: self.weighted_cost(estimate.distance_km, estimate.eta_ms),
        }))
    }
}

impl Default for CostBasedMatching {
    fn default() -> Self {
        Self::new(Arc::new(HaversineCostModel::default()), 1.0, 1.0)
    }
}

impl std::fmt::Debug for CostBasedMatching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostBasedMatching")
            .field("distance_weight", &self.distance_weight)
            .field("eta_weight", &self.eta_weight)
            .field("max_pickup_km", &self.max_pickup_km)
            .finish()
    }
}

/// Lower cost wins; equal costs go to the lower driver id.
pub(crate) fn better(a: &MatchCandidate, b: &MatchCandidate) -> bool {
    match a.cost.total_cmp(&b.cost) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => a.driver_id < b.driver_id,
    }
}

impl MatchingAlgorithm for CostBasedMatching {
    fn propose(
        &self,
        rider: &Rider,
        candidates: &[Driver],
        now_ms: u64,
    ) -> DispatchResult<Option<ProposedMatch>> {
        let mut best: Option<MatchCandidate> = None;

        for driver in candidates {
            let Some(candidate) = self.candidate(rider, driver)? else {
                continue;
            };
            match &best {
                Some(current) if !better(&candidate, current) => {}
                _ => best = Some(candidate),
            }
        }

        Ok(best.map(|candidate| ProposedMatch::from_candidate(rider.id, candidate, now_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{DriverId, RiderId};
    use crate::location::Location;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng).expect("valid location")
    }

    fn rider_at(location: Location) -> Rider {
        Rider::new(RiderId::new(1), location, loc(37.80, -122.40), 0)
    }

    fn available(id: u64, location: Location) -> Driver {
        let mut driver = Driver::new(DriverId::new(id), location, 0);
        driver.status = DriverStatus::Available;
        driver
    }

    #[test]
    fn selects_closer_driver() {
        let matcher = CostBasedMatching::default();
        let rider = rider_at(loc(37.7749, -122.4194));
        let far = available(2, loc(37.7949, -122.4194));
        let near = available(3, loc(37.7759, -122.4194));

        // Far driver first to make sure order does not decide.
        let proposal = matcher
            .propose(&rider, &[far, near], 0)
            .expect("propose")
            .expect("a match");
        assert_eq!(proposal.driver_id, DriverId::new(3));
        assert!(proposal.distance_km < 0.2);
    }

    #[test]
    fn empty_candidates_yield_none() {
        let matcher = CostBasedMatching::default();
        let rider = rider_at(loc(0.0, 0.0));
        assert_eq!(matcher.propose(&rider, &[], 0).expect("propose"), None);
    }

    #[test]
    fn equal_cost_goes_to_lowest_id() {
        let matcher = CostBasedMatching::default();
        let spot = loc(51.5074, -0.1278);
        let rider = rider_at(spot);
        let drivers = [available(9, spot), available(4, spot), available(6, spot)];
        let proposal = matcher
            .propose(&rider, &drivers, 0)
            .expect("propose")
            .expect("a match");
        assert_eq!(proposal.driver_id, DriverId::new(4));
    }

    #[test]
    fn skips_unavailable_and_out_of_range_drivers() {
        let matcher = CostBasedMatching::default().with_max_pickup_km(1.0);
        let rider = rider_at(loc(37.7749, -122.4194));
        let mut reserved = available(1, loc(37.7749, -122.4194));
        reserved.status = DriverStatus::Reserved;
        let too_far = available(2, loc(37.90, -122.4194));

        assert_eq!(
            matcher.propose(&rider, &[reserved, too_far], 0).expect("propose"),
            None
        );
    }

    #[test]
    fn proposals_are_deterministic() {
        let matcher = CostBasedMatching::default();
        let rider = rider_at(loc(37.7749, -122.4194));
        let drivers: Vec<Driver> = (0..20)
            .map(|i| available(i + 1, loc(37.77 + i as f64 * 0.001, -122.42)))
            .collect();
        let first = matcher.propose(&rider, &drivers, 42).expect("propose");
        for _ in 0..10 {
            assert_eq!(matcher.propose(&rider, &drivers, 42).expect("propose"), first);
        }
    }
}
