//! Status histogram for display: how many riders, drivers and matches sit in
//! each lifecycle state.

use serde::{Deserialize, Serialize};

use crate::entities::{DriverStatus, MatchStatus, RiderStatus};

/// Aggregated counts at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub riders_waiting: usize,
    pub riders_matched: usize,
    pub riders_cancelled: usize,
    pub riders_completed: usize,
    pub drivers_offline: usize,
    pub drivers_available: usize,
    pub drivers_reserved: usize,
    pub drivers_on_trip: usize,
    pub matches_active: usize,
    pub matches_cancelled: usize,
    pub matches_completed: usize,
}

impl DispatchCounts {
    pub fn add_rider(&mut self, status: RiderStatus) {
        match status {
            RiderStatus::Waiting => self.riders_waiting += 1,
            RiderStatus::Matched => self.riders_matched += 1,
            RiderStatus::Cancelled => self.riders_cancelled += 1,
            RiderStatus::Completed => self.riders_completed += 1,
        }
    }

    pub fn add_driver(&mut self, status: DriverStatus) {
        match status {
            DriverStatus::Offline => self.drivers_offline += 1,
            DriverStatus::Available => self.drivers_available += 1,
            DriverStatus::Reserved => self.drivers_reserved += 1,
            DriverStatus::OnTrip => self.drivers_on_trip += 1,
        }
    }

    pub fn add_match(&mut self, status: MatchStatus) {
        match status {
            MatchStatus::Proposed | MatchStatus::Confirmed => self.matches_active += 1,
            MatchStatus::Cancelled => self.matches_cancelled += 1,
            MatchStatus::Completed => self.matches_completed += 1,
        }
    }

    /// Drivers holding a match: every one of them needs exactly one active match.
    pub fn drivers_engaged(&self) -> usize {
        self.drivers_reserved + self.drivers_on_trip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_each_status() {
        let mut counts = DispatchCounts::default();
        counts.add_rider(RiderStatus::Waiting);
        counts.add_rider(RiderStatus::Waiting);
        counts.add_driver(DriverStatus::Reserved);
        counts.add_driver(DriverStatus::OnTrip);
        counts.add_match(MatchStatus::Confirmed);
        counts.add_match(MatchStatus::Proposed);
        counts.add_match(MatchStatus::Completed);

        assert_eq!(counts.riders_waiting, 2);
        assert_eq!(counts.drivers_engaged(), 2);
        assert_eq!(counts.matches_active, 2);
        assert_eq!(counts.matches_completed, 1);
    }
}
