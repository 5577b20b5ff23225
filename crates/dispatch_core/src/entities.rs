//! Riders, drivers and matches, with their lifecycle state machines.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::location::Location;
use crate::pool::{Lifecycle, PoolEntity};

macro_rules! entity_id {
    ($name:ident, $prefix:literal) => {
        #[repr(transparent)]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(RiderId, "R");
entity_id!(DriverId, "D");
entity_id!(MatchId, "M");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiderStatus {
    Waiting,
    Matched,
    Cancelled,
    Completed,
}

impl Lifecycle for RiderStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use RiderStatus::*;
        matches!(
            (self, next),
            (Waiting, Matched)
                | (Waiting, Cancelled)
                | (Matched, Completed)
                | (Matched, Cancelled)
                // Released back to the queue when the driver drops out.
                | (Matched, Waiting)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, RiderStatus::Cancelled | RiderStatus::Completed)
    }

    fn name(self) -> &'static str {
        match self {
            RiderStatus::Waiting => "Waiting",
            RiderStatus::Matched => "Matched",
            RiderStatus::Cancelled => "Cancelled",
            RiderStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverStatus {
    Offline,
    Available,
    Reserved,
    OnTrip,
}

impl Lifecycle for DriverStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use DriverStatus::*;
        matches!(
            (self, next),
            (Offline, Available)
                | (Available, Reserved)
                | (Reserved, OnTrip)
                | (OnTrip, Available)
                // Rider cancelled before pickup.
                | (Reserved, Available)
                | (Available, Offline)
                | (Reserved, Offline)
                | (OnTrip, Offline)
        )
    }

    fn is_terminal(self) -> bool {
        false
    }

    fn name(self) -> &'static str {
        match self {
            DriverStatus::Offline => "Offline",
            DriverStatus::Available => "Available",
            DriverStatus::Reserved => "Reserved",
            DriverStatus::OnTrip => "OnTrip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    Proposed,
    Confirmed,
    Cancelled,
    Completed,
}

impl MatchStatus {
    /// Proposed and Confirmed matches hold a reservation on both parties.
    pub fn is_active(self) -> bool {
        matches!(self, MatchStatus::Proposed | MatchStatus::Confirmed)
    }
}

impl Lifecycle for MatchStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use MatchStatus::*;
        matches!(
            (self, next),
            (Proposed, Confirmed)
                | (Proposed, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
        )
    }

    fn is_terminal(self) -> bool {
        !self.is_active()
    }

    fn name(self) -> &'static str {
        match self {
            MatchStatus::Proposed => "Proposed",
            MatchStatus::Confirmed => "Confirmed",
            MatchStatus::Cancelled => "Cancelled",
            MatchStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    pub id: RiderId,
    pub origin: Location,
    pub destination: Location,
    pub status: RiderStatus,
    pub requested_at_ms: u64,
    /// Backlink to the match currently holding this rider, if any.
    pub current_match: Option<MatchId>,
}

impl Rider {
    pub fn new(id: RiderId, origin: Location, destination: Location, requested_at_ms: u64) -> Self {
        Self {
            id,
            origin,
            destination,
            status: RiderStatus::Waiting,
            requested_at_ms,
            current_match: None,
        }
    }
}

impl PoolEntity for Rider {
    type Id = RiderId;
    type Status = RiderStatus;
    const KIND: &'static str = "rider";

    fn id(&self) -> RiderId {
        self.id
    }

    fn status(&self) -> RiderStatus {
        self.status
    }

    fn set_status(&mut self, status: RiderStatus, _now_ms: u64) {
        self.status = status;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub location: Location,
    pub status: DriverStatus,
    pub last_updated_ms: u64,
    pub current_match: Option<MatchId>,
}

impl Driver {
    /// New drivers start `Offline`; the dispatcher brings them online.
    pub fn new(id: DriverId, location: Location, now_ms: u64) -> Self {
        Self {
            id,
            location,
            status: DriverStatus::Offline,
            last_updated_ms: now_ms,
            current_match: None,
        }
    }
}

impl PoolEntity for Driver {
    type Id = DriverId;
    type Status = DriverStatus;
    const KIND: &'static str = "driver";

    fn id(&self) -> DriverId {
        self.id
    }

    fn status(&self) -> DriverStatus {
        self.status
    }

    fn set_status(&mut self, status: DriverStatus, now_ms: u64) {
        self.status = status;
        self.last_updated_ms = now_ms;
    }
}

/// A rider/driver pairing. Its existence is what reserves both parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub rider_id: RiderId,
    pub driver_id: DriverId,
    pub distance_km: f64,
    pub eta_ms: u64,
    /// Weighted cost that selected this driver.
    pub score: f64,
    pub created_at_ms: u64,
    pub status: MatchStatus,
}

impl Match {
    pub fn active_view(&self) -> ActiveMatch {
        ActiveMatch {
            rider_id: self.rider_id,
            driver_id: self.driver_id,
            distance_km: self.distance_km,
            eta_ms: self.eta_ms,
            created_at_ms: self.created_at_ms,
        }
    }
}

impl PoolEntity for Match {
    type Id = MatchId;
    type Status = MatchStatus;
    const KIND: &'static str = "match";

    fn id(&self) -> MatchId {
        self.id
    }

    fn status(&self) -> MatchStatus {
        self.status
    }

    fn set_status(&mut self, status: MatchStatus, _now_ms: u64) {
        self.status = status;
    }
}

/// Display row for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMatch {
    pub rider_id: RiderId,
    pub driver_id: DriverId,
    pub distance_km: f64,
    pub eta_ms: u64,
    pub created_at_ms: u64,
}
