//! Test helpers for common test setup and utilities.
//!
//! Shared by unit tests, the integration tests under `tests/`, benches and
//! examples.

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;

use crate::clock::ManualClock;
use crate::config::DispatchConfig;
use crate::cost::{CostModel, HaversineCostModel};
use crate::dispatcher::Dispatcher;
use crate::entities::{DriverStatus, MatchStatus, RiderStatus};
use crate::location::Location;

/// A standard test point in San Francisco (Market St).
pub const TEST_LAT: f64 = 37.7749;
pub const TEST_LNG: f64 = -122.4194;

/// Start time for manual clocks, well away from zero.
pub const TEST_START_MS: u64 = 1_700_000_000_000;

/// Roughly one kilometre of latitude, in degrees.
const DEG_PER_KM: f64 = 1.0 / 111.195;

pub fn location(lat: f64, lng: f64) -> Location {
    Location::new(lat, lng).expect("test coordinates must be valid")
}

pub fn test_location() -> Location {
    location(TEST_LAT, TEST_LNG)
}

/// About 300 m north of [`test_location`].
pub fn test_neighbor_location() -> Location {
    offset_km(test_location(), 0.3, 0.0)
}

/// About 5 km north-east of [`test_location`], used as a trip destination.
pub fn test_distant_location() -> Location {
    offset_km(test_location(), 3.5, 3.5)
}

/// Shift a location by approximate kilometre offsets.
pub fn offset_km(from: Location, north_km: f64, east_km: f64) -> Location {
    let lat = from.lat() + north_km * DEG_PER_KM;
    let lng = from.lng() + east_km * DEG_PER_KM / from.lat().to_radians().cos();
    location(lat, lng)
}

/// Uniform point in the square of half-side `radius_km` around `center`.
pub fn random_location_near<R: Rng + ?Sized>(rng: &mut R, center: Location, radius_km: f64) -> Location {
    let north = rng.gen_range(-radius_km..=radius_km);
    let east = rng.gen_range(-radius_km..=radius_km);
    offset_km(center, north, east)
}

/// Dispatcher on a manual clock with the given config.
pub fn dispatcher_with(config: DispatchConfig) -> (Dispatcher, Arc<ManualClock>) {
    let cost_model = HaversineCostModel::new(config.avg_speed_kmh).with_cache(1024);
    dispatcher_with_model(config, Arc::new(cost_model))
}

/// Dispatcher on a manual clock with a caller-supplied cost model.
pub fn dispatcher_with_model(
    config: DispatchConfig,
    cost_model: Arc<dyn CostModel>,
) -> (Dispatcher, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(TEST_START_MS));
    let dispatcher = Dispatcher::with_parts(config, cost_model, clock.clone())
        .expect("test config must be valid");
    (dispatcher, clock)
}

/// Dispatcher with the default config on a manual clock.
pub fn test_dispatcher() -> (Dispatcher, Arc<ManualClock>) {
    dispatcher_with(DispatchConfig::default())
}

/// Check the exclusivity and backlink invariants on a quiescent dispatcher.
///
/// # Panics
///
/// Panics with a description of the first violation found.
pub fn assert_dispatch_invariants(dispatcher: &Dispatcher) {
    let matches = dispatcher.match_history();
    let active: Vec<_> = matches.iter().filter(|m| m.status.is_active()).collect();

    let mut drivers_seen = HashSet::new();
    let mut riders_seen = HashSet::new();
    for m in &active {
        assert!(
            drivers_seen.insert(m.driver_id),
            "driver {} holds more than one active match",
            m.driver_id
        );
        assert!(
            riders_seen.insert(m.rider_id),
            "rider {} holds more than one active match",
            m.rider_id
        );
        assert_eq!(m.status, MatchStatus::Confirmed, "match {} left Proposed", m.id);

        let driver = dispatcher.driver(m.driver_id).expect("matched driver exists");
        assert!(
            matches!(driver.status, DriverStatus::Reserved | DriverStatus::OnTrip),
            "driver {} is {:?} with active match {}",
            driver.id,
            driver.status,
            m.id
        );
        assert_eq!(driver.current_match, Some(m.id));

        let rider = dispatcher.rider(m.rider_id).expect("matched rider exists");
        assert_eq!(rider.status, RiderStatus::Matched, "rider {} not Matched", rider.id);
        assert_eq!(rider.current_match, Some(m.id));
    }

    for status in [DriverStatus::Reserved, DriverStatus::OnTrip] {
        for driver in dispatcher.drivers_by_status(status) {
            assert!(
                drivers_seen.contains(&driver.id),
                "driver {} is {:?} without an active match",
                driver.id,
                driver.status
            );
        }
    }
    for rider in dispatcher.riders_by_status(RiderStatus::Matched) {
        assert!(
            riders_seen.contains(&rider.id),
            "rider {} is Matched without an active match",
            rider.id
        );
    }

    let waiting: HashSet<_> = dispatcher.waiting_riders().into_iter().collect();
    for rider in dispatcher.riders_by_status(RiderStatus::Waiting) {
        assert!(waiting.contains(&rider.id), "rider {} missing from queue", rider.id);
        assert_eq!(rider.current_match, None);
    }
    assert_eq!(
        waiting.len(),
        dispatcher.riders_by_status(RiderStatus::Waiting).len(),
        "queue holds riders that are not Waiting"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostModel, HaversineCostModel};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn neighbor_and_distant_are_where_they_claim() {
        let model = HaversineCostModel::default();
        let near = model
            .estimate(&test_location(), &test_neighbor_location())
            .expect("estimate");
        let far = model
            .estimate(&test_location(), &test_distant_location())
            .expect("estimate");
        assert!((near.distance_km - 0.3).abs() < 0.01, "{}", near.distance_km);
        assert!((far.distance_km - 4.95).abs() < 0.1, "{}", far.distance_km);
    }

    #[test]
    fn random_locations_stay_in_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = HaversineCostModel::default();
        for _ in 0..100 {
            let point = random_location_near(&mut rng, test_location(), 2.0);
            let d = model.estimate(&test_location(), &point).expect("estimate");
            // Corner of the square is 2 * sqrt(2) away.
            assert!(d.distance_km <= 2.9, "{}", d.distance_km);
        }
    }

    #[test]
    fn fresh_dispatcher_satisfies_invariants() {
        let (dispatcher, _clock) = test_dispatcher();
        assert_dispatch_invariants(&dispatcher);
    }
}
