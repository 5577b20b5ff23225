//! Cost model: distance and ETA between two locations.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};
use crate::location::Location;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default average speed for ETA estimation (km/h).
pub const DEFAULT_AVG_SPEED_KMH: f64 = 40.0;

/// Smallest ETA reported for a non-zero distance.
const MIN_ETA_MS: u64 = 1_000;

/// Output of a [`CostModel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub distance_km: f64,
    pub eta_ms: u64,
}

/// Maps an (origin, destination) pair to a distance and travel time.
///
/// Implementations must be pure and deterministic, symmetric in distance,
/// and produce an ETA that never decreases as distance grows. Distances must
/// not undercut the great-circle distance, which the geo index relies on to
/// stop its ring search early. Routing-backed
/// models are expected to be resolved ahead of time; `estimate` must not block
/// on I/O.
pub trait CostModel: Send + Sync {
    fn estimate(&self, from: &Location, to: &Location) -> DispatchResult<CostEstimate>;
}

/// Great-circle distance with a constant-speed ETA.
pub struct HaversineCostModel {
    avg_speed_kmh: f64,
    cache: Option<Mutex<LruCache<DistanceKey, f64>>>,
}

type DistanceKey = ((u64, u64), (u64, u64));

impl HaversineCostModel {
    pub fn new(avg_speed_kmh: f64) -> Self {
        Self {
            avg_speed_kmh,
            cache: None,
        }
    }

    /// Memoize up to `capacity` distances; `0` disables the cache.
    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        self
    }

    pub fn eta_ms_for_distance(&self, distance_km: f64) -> u64 {
        if distance_km <= 0.0 {
            return 0;
        }
        let eta_hours = distance_km / self.avg_speed_kmh;
        (eta_hours * 3_600_000.0).max(MIN_ETA_MS as f64) as u64
    }

    fn distance_km(&self, a: &Location, b: &Location) -> f64 {
        // Order endpoints so that (a, b) and (b, a) evaluate bit-identically.
        let (first, second) = if a.bits() <= b.bits() { (a, b) } else { (b, a) };
        let Some(cache) = &self.cache else {
            return haversine_km(first, second);
        };
        let mut cache = match cache.lock() {
            Ok(guard) => guard,
            Err(_) => return haversine_km(first, second),
        };
        *cache.get_or_insert((first.bits(), second.bits()), || haversine_km(first, second))
    }
}

impl Default for HaversineCostModel {
    fn default() -> Self {
        Self::new(DEFAULT_AVG_SPEED_KMH).with_cache(50_000)
    }
}

impl fmt::Debug for HaversineCostModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HaversineCostModel")
            .field("avg_speed_kmh", &self.avg_speed_kmh)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl CostModel for HaversineCostModel {
    fn estimate(&self, from: &Location, to: &Location) -> DispatchResult<CostEstimate> {
        let distance_km = self.distance_km(from, to);
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(DispatchError::invalid_location(format!(
                "no finite distance between {from} and {to}"
            )));
        }
        Ok(CostEstimate {
            distance_km,
            eta_ms: self.eta_ms_for_distance(distance_km),
        })
    }
}

fn haversine_km(a: &Location, b: &Location) -> f64 {
    let (lat1, lon1) = (a.lat().to_radians(), a.lng().to_radians());
    let (lat2, lon2) = (b.lat().to_radians(), b.lng().to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}
