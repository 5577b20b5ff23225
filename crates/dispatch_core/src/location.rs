//! Validated geographic coordinates.
//!
//! A [`Location`] can only be built through [`Location::new`], which rejects
//! non-finite and out-of-range values. Text input (`"lat,lng"`) and serde input
//! go through the same constructor.

use std::fmt;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

const LAT_LIMIT: f64 = 90.0;
const LNG_LIMIT: f64 = 180.0;

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLocation")]
pub struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct RawLocation {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawLocation> for Location {
    type Error = DispatchError;

    fn try_from(raw: RawLocation) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lng)
    }
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> DispatchResult<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(DispatchError::invalid_location(format!(
                "coordinates must be finite, got ({lat}, {lng})"
            )));
        }
        if !(-LAT_LIMIT..=LAT_LIMIT).contains(&lat) {
            return Err(DispatchError::invalid_location(format!(
                "latitude {lat} outside [-90, 90]"
            )));
        }
        if !(-LNG_LIMIT..=LNG_LIMIT).contains(&lng) {
            return Err(DispatchError::invalid_location(format!(
                "longitude {lng} outside [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// H3 cell containing this location at the given resolution.
    pub fn to_cell(&self, resolution: Resolution) -> DispatchResult<CellIndex> {
        LatLng::new(self.lat, self.lng)
            .map(|ll| ll.to_cell(resolution))
            .map_err(|err| DispatchError::invalid_location(err.to_string()))
    }

    /// Bit-exact key, used for hashing and symmetric cache lookups.
    pub(crate) fn bits(&self) -> (u64, u64) {
        (self.lat.to_bits(), self.lng.to_bits())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

impl FromStr for Location {
    type Err = DispatchError;

    /// Parses `"lat,lng"`; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| DispatchError::invalid_location(format!("expected `lat,lng`, got {s:?}")))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| DispatchError::invalid_location(format!("bad latitude {lat:?}")))?;
        let lng: f64 = lng
            .trim()
            .parse()
            .map_err(|_| DispatchError::invalid_location(format!("bad longitude {lng:?}")))?;
        Self::new(lat, lng)
    }
}
