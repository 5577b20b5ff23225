//! Ride-hailing dispatch core: rider and driver lifecycles, an H3 spatial
//! index over available drivers, pluggable matching, and a dispatcher that
//! commits matches atomically so no driver or rider is ever double-booked.

pub mod clock;
pub mod config;
pub mod cost;
pub mod dispatcher;
pub mod entities;
pub mod error;
pub mod location;
pub mod logging;
pub mod matching;
pub mod pool;
pub mod spatial;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{BatchAlgorithm, DispatchConfig};
pub use dispatcher::Dispatcher;
pub use entities::{
    ActiveMatch, Driver, DriverId, DriverStatus, Match, MatchId, MatchStatus, Rider, RiderId,
    RiderStatus,
};
pub use error::{ConfigError, DispatchError, DispatchResult};
pub use location::Location;
