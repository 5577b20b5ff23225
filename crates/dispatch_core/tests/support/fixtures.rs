use dispatch_core::cost::{CostEstimate, CostModel, HaversineCostModel};
use dispatch_core::test_helpers::{
    offset_km, random_location_near, test_distant_location, test_location,
    test_neighbor_location, TEST_LAT,
};
use dispatch_core::{DispatchError, DispatchResult, Dispatcher, DriverId, Location, RiderId};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seeded geography so every test reuses the same points.
pub fn seeded_origin() -> Location {
    test_location()
}

/// A nearby point from the seeded geography.
pub fn seeded_neighbor() -> Location {
    test_neighbor_location()
}

/// A more distant point for dropoffs.
pub fn seeded_destination() -> Location {
    test_distant_location()
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Bring `count` drivers online at random points within `radius_km` of the
/// seeded origin.
pub fn online_drivers(
    dispatcher: &Dispatcher,
    rng: &mut StdRng,
    count: usize,
    radius_km: f64,
) -> Vec<DriverId> {
    (0..count)
        .map(|_| {
            let at = random_location_near(rng, seeded_origin(), radius_km);
            dispatcher.driver_online(at).expect("driver online")
        })
        .collect()
}

/// Submit `count` ride requests from random points near the seeded origin.
pub fn request_rides(
    dispatcher: &Dispatcher,
    rng: &mut StdRng,
    count: usize,
    radius_km: f64,
) -> Vec<RiderId> {
    (0..count)
        .map(|_| {
            let from = random_location_near(rng, seeded_origin(), radius_km);
            let to = random_location_near(rng, seeded_destination(), radius_km);
            dispatcher.request_ride(from, to).expect("request ride")
        })
        .collect()
}

/// Latitude splitting the seeded geography, about 5.5 km south of the origin.
pub const BOUNDARY_LAT: f64 = TEST_LAT - 0.05;

/// A point about 10 km south of the seeded origin, past [`BOUNDARY_LAT`].
pub fn seeded_south() -> Location {
    offset_km(seeded_origin(), -10.0, 0.0)
}

/// A dropoff south of [`BOUNDARY_LAT`].
pub fn seeded_south_destination() -> Location {
    offset_km(seeded_origin(), -12.0, 1.0)
}

fn refused(reason: &str) -> DispatchError {
    DispatchError::InvalidLocation {
        reason: reason.to_string(),
    }
}

/// Haversine pricing that refuses every location south of [`BOUNDARY_LAT`].
#[derive(Debug, Default)]
pub struct FencedCostModel {
    inner: HaversineCostModel,
}

impl CostModel for FencedCostModel {
    fn estimate(&self, from: &Location, to: &Location) -> DispatchResult<CostEstimate> {
        if from.lat() < BOUNDARY_LAT || to.lat() < BOUNDARY_LAT {
            return Err(refused("outside service area"));
        }
        self.inner.estimate(from, to)
    }
}

/// Haversine pricing that refuses any pair on opposite sides of
/// [`BOUNDARY_LAT`]; each side is served on its own.
#[derive(Debug, Default)]
pub struct RiverCostModel {
    inner: HaversineCostModel,
}

impl CostModel for RiverCostModel {
    fn estimate(&self, from: &Location, to: &Location) -> DispatchResult<CostEstimate> {
        if (from.lat() < BOUNDARY_LAT) != (to.lat() < BOUNDARY_LAT) {
            return Err(refused("no crossing between banks"));
        }
        self.inner.estimate(from, to)
    }
}
