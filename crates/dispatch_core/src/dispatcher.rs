//! Dispatcher: owns the rider and driver pools plus the geo index, and
//! commits matches atomically.
//!
//! Every mutating operation runs under one commit lock spanning
//! "read candidates → decide → mutate both pools → mutate index". That lock
//! is what enforces exclusivity: a driver or rider is never referenced by two
//! active matches. Read views only take the pools' read locks and run
//! concurrently with commits.
//!
//! Within a commit, the match is written before the driver and the driver
//! before the rider, so a concurrent reader never sees a Reserved driver
//! without its match.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::{Clock, SystemClock};
use crate::config::{BatchAlgorithm, DispatchConfig};
use crate::cost::{CostEstimate, CostModel, HaversineCostModel};
use crate::entities::{
    ActiveMatch, Driver, DriverId, DriverStatus, Match, MatchId, MatchStatus, Rider, RiderId,
    RiderStatus,
};
use crate::error::{ConfigError, DispatchError, DispatchResult};
use crate::location::Location;
use crate::matching::{CostBasedMatching, HungarianMatching, MatchingAlgorithm, ProposedMatch};
use crate::pool::{EntityPool, Lifecycle};
use crate::spatial::GeoIndex;
use crate::telemetry::DispatchCounts;

/// A commit that loses a race is retried once against fresh state.
const MAX_COMMIT_ATTEMPTS: usize = 2;

/// State only touched while the commit lock is held.
struct CommitState {
    index: GeoIndex,
    /// Waiting riders, oldest request first.
    waiting: BTreeSet<(u64, RiderId)>,
}

pub struct Dispatcher {
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    cost_model: Arc<dyn CostModel>,
    riders: EntityPool<Rider>,
    drivers: EntityPool<Driver>,
    matches: EntityPool<Match>,
    engine: Box<dyn MatchingAlgorithm>,
    batch_engine: Box<dyn MatchingAlgorithm>,
    commit_lock: Mutex<CommitState>,
}

impl Dispatcher {
    /// Dispatcher with the haversine cost model and the wall clock.
    pub fn new(config: DispatchConfig) -> Result<Self, ConfigError> {
        let cost_model = HaversineCostModel::new(config.avg_speed_kmh)
            .with_cache(config.distance_cache_size);
        Self::with_parts(config, Arc::new(cost_model), Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: DispatchConfig,
        cost_model: Arc<dyn CostModel>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let index = GeoIndex::new(config.resolution()?, Arc::clone(&cost_model))
            .with_max_search_rings(config.max_search_rings);
        let greedy = CostBasedMatching::from_config(Arc::clone(&cost_model), &config);
        let batch_engine: Box<dyn MatchingAlgorithm> = match config.batch_algorithm {
            BatchAlgorithm::CostBased => Box::new(greedy.clone()),
            BatchAlgorithm::Hungarian => Box::new(HungarianMatching::new(greedy.clone())),
        };
        Ok(Self {
            config,
            clock,
            cost_model,
            riders: EntityPool::new(),
            drivers: EntityPool::new(),
            matches: EntityPool::new(),
            engine: Box::new(greedy),
            batch_engine,
            commit_lock: Mutex::new(CommitState {
                index,
                waiting: BTreeSet::new(),
            }),
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CommitState> {
        self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(&self, location: &Location) -> DispatchResult<()> {
        let resolution = self
            .config
            .resolution()
            .map_err(|err| DispatchError::invalid_location(err.to_string()))?;
        location.to_cell(resolution)?;
        // The cost model may refuse places the grid accepts.
        self.cost_model.estimate(location, location).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Rider operations
    // ------------------------------------------------------------------

    /// Create a Waiting rider and try to match it immediately.
    ///
    /// If no driver is available the rider stays Waiting and is served, oldest
    /// first, as drivers come online or free up.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn request_ride(&self, origin: Location, destination: Location) -> DispatchResult<RiderId> {
        self.validate(&origin)?;
        self.validate(&destination)?;
        self.cost_model.estimate(&origin, &destination)?;

        let mut state = self.lock();
        let now = self.clock.now_ms();
        let rider_id = self
            .riders
            .insert(|id| Rider::new(id, origin, destination, now));
        state.waiting.insert((now, rider_id));
        tracing::info!(rider_id = %rider_id, %origin, %destination, "ride requested");

        if self.config.batch_matching {
            tracing::debug!(rider_id = %rider_id, "queued for next batch pass");
            return Ok(rider_id);
        }
        match self.try_match_rider(&mut state, rider_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!(
                    rider_id = %rider_id,
                    queued = state.waiting.len(),
                    "no driver available, rider waiting"
                );
            }
            Err(err) => {
                // Nothing was committed for this rider; drop it again.
                state.waiting.remove(&(now, rider_id));
                self.riders.remove(rider_id);
                tracing::warn!(rider_id = %rider_id, error = %err, "ride request rolled back");
                return Err(err);
            }
        }
        Ok(rider_id)
    }

    /// Cancel a ride. A matched rider releases its driver back to Available.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn cancel_ride(&self, rider_id: RiderId) -> DispatchResult<()> {
        let mut state = self.lock();
        let now = self.clock.now_ms();
        let rider = self
            .riders
            .get(rider_id)
            .ok_or(DispatchError::UnknownRider(rider_id))?;

        match rider.status {
            RiderStatus::Waiting => {
                self.riders
                    .update_status(rider_id, RiderStatus::Cancelled, now)?;
                state.waiting.remove(&(rider.requested_at_ms, rider_id));
                tracing::info!(rider_id = %rider_id, "waiting ride cancelled");
            }
            RiderStatus::Matched => {
                let (active, driver) = self.active_match_of(&rider, RiderStatus::Cancelled.name())?;
                if driver.status != DriverStatus::Reserved {
                    // Already picked up: the trip can only complete.
                    return Err(DispatchError::InvalidTransition {
                        entity: "rider",
                        id: rider_id.raw(),
                        from: RiderStatus::Matched.name(),
                        to: RiderStatus::Cancelled.name(),
                    });
                }
                self.matches
                    .check_transition(active.id, MatchStatus::Cancelled)?;
                self.drivers
                    .check_transition(driver.id, DriverStatus::Available)?;
                self.riders
                    .check_transition(rider_id, RiderStatus::Cancelled)?;

                self.matches
                    .update_status(active.id, MatchStatus::Cancelled, now)?;
                self.drivers
                    .update_status(driver.id, DriverStatus::Available, now)?;
                self.drivers.update(driver.id, |d| d.current_match = None);
                state.index.insert(driver.id, driver.location)?;
                self.riders
                    .update_status(rider_id, RiderStatus::Cancelled, now)?;
                self.riders.update(rider_id, |r| r.current_match = None);
                tracing::info!(
                    rider_id = %rider_id,
                    driver_id = %driver.id,
                    match_id = %active.id,
                    "matched ride cancelled, driver released"
                );
                self.serve_waiting(&mut state);
            }
            RiderStatus::Cancelled | RiderStatus::Completed => {
                self.riders
                    .check_transition(rider_id, RiderStatus::Cancelled)?;
            }
        }
        Ok(())
    }

    /// Mark the pickup: the matched driver goes Reserved → OnTrip.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn start_trip(&self, rider_id: RiderId) -> DispatchResult<()> {
        let _state = self.lock();
        let now = self.clock.now_ms();
        let rider = self
            .riders
            .get(rider_id)
            .ok_or(DispatchError::UnknownRider(rider_id))?;
        let (active, driver) = self.active_match_of(&rider, "OnTrip")?;
        self.drivers
            .update_status(driver.id, DriverStatus::OnTrip, now)?;
        self.drivers.update(driver.id, |d| d.location = rider.origin);
        tracing::info!(rider_id = %rider_id, driver_id = %driver.id, match_id = %active.id, "trip started");
        Ok(())
    }

    /// Finish a trip. The driver is dropped at the rider's destination and
    /// becomes Available again; a Reserved driver is taken through OnTrip.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn complete_ride(&self, rider_id: RiderId) -> DispatchResult<()> {
        let mut state = self.lock();
        let now = self.clock.now_ms();
        let rider = self
            .riders
            .get(rider_id)
            .ok_or(DispatchError::UnknownRider(rider_id))?;
        self.riders
            .check_transition(rider_id, RiderStatus::Completed)?;
        let (active, driver) = self.active_match_of(&rider, RiderStatus::Completed.name())?;
        self.matches
            .check_transition(active.id, MatchStatus::Completed)?;

        if driver.status == DriverStatus::Reserved {
            self.drivers
                .update_status(driver.id, DriverStatus::OnTrip, now)?;
        }
        self.drivers
            .check_transition(driver.id, DriverStatus::Available)?;

        self.matches
            .update_status(active.id, MatchStatus::Completed, now)?;
        self.drivers
            .update_status(driver.id, DriverStatus::Available, now)?;
        self.drivers.update(driver.id, |d| {
            d.current_match = None;
            d.location = rider.destination;
        });
        state.index.insert(driver.id, rider.destination)?;
        self.riders
            .update_status(rider_id, RiderStatus::Completed, now)?;
        self.riders.update(rider_id, |r| r.current_match = None);
        tracing::info!(
            rider_id = %rider_id,
            driver_id = %driver.id,
            match_id = %active.id,
            "ride completed"
        );

        self.serve_waiting(&mut state);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Driver operations
    // ------------------------------------------------------------------

    /// Register a new driver as Available and serve the waiting queue.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn driver_online(&self, location: Location) -> DispatchResult<DriverId> {
        self.validate(&location)?;

        let mut state = self.lock();
        let now = self.clock.now_ms();
        let driver_id = self.drivers.insert(|id| Driver::new(id, location, now));
        self.drivers
            .update_status(driver_id, DriverStatus::Available, now)?;
        state.index.insert(driver_id, location)?;
        tracing::info!(driver_id = %driver_id, %location, "driver online");

        self.serve_waiting(&mut state);
        Ok(driver_id)
    }

    /// Bring a known Offline driver back online at `location`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn reconnect_driver(&self, driver_id: DriverId, location: Location) -> DispatchResult<()> {
        self.validate(&location)?;

        let mut state = self.lock();
        let now = self.clock.now_ms();
        let status = self
            .drivers
            .status_of(driver_id)
            .ok_or(DispatchError::UnknownDriver(driver_id))?;
        // Reserved -> Available is a release, not a reconnect.
        if status != DriverStatus::Offline {
            return Err(DispatchError::InvalidTransition {
                entity: "driver",
                id: driver_id.raw(),
                from: status.name(),
                to: DriverStatus::Available.name(),
            });
        }
        self.drivers.update(driver_id, |d| d.location = location);
        self.drivers
            .update_status(driver_id, DriverStatus::Available, now)?;
        state.index.insert(driver_id, location)?;
        tracing::info!(driver_id = %driver_id, %location, "driver reconnected");

        self.serve_waiting(&mut state);
        Ok(())
    }

    /// Take a driver offline. An active match is cancelled and its rider goes
    /// back to the waiting queue. Repeated calls are no-ops.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn driver_offline(&self, driver_id: DriverId) -> DispatchResult<()> {
        let mut state = self.lock();
        let now = self.clock.now_ms();
        let driver = self
            .drivers
            .get(driver_id)
            .ok_or(DispatchError::UnknownDriver(driver_id))?;
        if driver.status == DriverStatus::Offline {
            tracing::debug!(driver_id = %driver_id, "driver already offline");
            return Ok(());
        }

        let held = match driver.current_match {
            Some(match_id) => self
                .matches
                .get(match_id)
                .filter(|m| m.status.is_active()),
            None => None,
        };

        self.drivers
            .check_transition(driver_id, DriverStatus::Offline)?;
        if let Some(active) = &held {
            self.matches
                .check_transition(active.id, MatchStatus::Cancelled)?;
            self.riders
                .check_transition(active.rider_id, RiderStatus::Waiting)?;
        }

        if let Some(active) = &held {
            self.matches
                .update_status(active.id, MatchStatus::Cancelled, now)?;
        }
        self.drivers
            .update_status(driver_id, DriverStatus::Offline, now)?;
        self.drivers.update(driver_id, |d| d.current_match = None);
        state.index.remove(driver_id);

        if let Some(active) = held {
            let rider = self
                .riders
                .update_status(active.rider_id, RiderStatus::Waiting, now)?;
            self.riders.update(rider.id, |r| r.current_match = None);
            state.waiting.insert((rider.requested_at_ms, rider.id));
            tracing::info!(
                driver_id = %driver_id,
                rider_id = %rider.id,
                match_id = %active.id,
                "driver offline, match cancelled and rider requeued"
            );
            self.serve_waiting(&mut state);
        } else {
            tracing::info!(driver_id = %driver_id, "driver offline");
        }
        Ok(())
    }

    /// Report a new driver position.
    ///
    /// Available drivers move in the index; a Reserved driver's match gets its
    /// distance and ETA recomputed against the new position.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn update_driver_location(&self, driver_id: DriverId, location: Location) -> DispatchResult<()> {
        self.validate(&location)?;

        let mut state = self.lock();
        let now = self.clock.now_ms();
        let driver = self
            .drivers
            .get(driver_id)
            .ok_or(DispatchError::UnknownDriver(driver_id))?;
        let refreshed = match (driver.status, driver.current_match) {
            (DriverStatus::Reserved, Some(match_id)) => {
                self.refreshed_match_cost(match_id, &location)?
            }
            _ => None,
        };

        self.drivers.update(driver_id, |d| {
            d.location = location;
            d.last_updated_ms = now;
        });
        match driver.status {
            DriverStatus::Available => {
                state.index.update(driver_id, location)?;
                self.serve_waiting(&mut state);
            }
            DriverStatus::Reserved => {
                if let Some((match_id, estimate)) = refreshed {
                    self.apply_match_cost(match_id, estimate);
                }
            }
            DriverStatus::Offline | DriverStatus::OnTrip => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Matching and commit
    // ------------------------------------------------------------------

    /// Decide a match for a waiting rider without committing it.
    ///
    /// The snapshot is released before returning; pass the proposal to
    /// [`Dispatcher::commit`], which fails with `StaleEntity` if either party
    /// changed in between.
    pub fn propose_for(&self, rider_id: RiderId) -> DispatchResult<Option<ProposedMatch>> {
        let rider = self
            .riders
            .get(rider_id)
            .ok_or(DispatchError::UnknownRider(rider_id))?;
        if rider.status != RiderStatus::Waiting {
            return Ok(None);
        }
        let candidates = {
            let state = self.lock();
            self.candidates_for(&state.index, &rider)?
        };
        self.engine
            .propose(&rider, &candidates, self.clock.now_ms())
    }

    /// Commit a proposal made earlier against a possibly outdated snapshot.
    pub fn commit(&self, proposal: ProposedMatch) -> DispatchResult<Match> {
        let mut state = self.lock();
        self.commit_locked(&mut state, proposal)
    }

    /// Batch pass over all waiting riders using the configured batch algorithm.
    ///
    /// Meant for an external scheduler: in batch mode this is the only place
    /// riders get matched, otherwise it sweeps riders that stayed Waiting.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn match_waiting_riders(&self) -> DispatchResult<Vec<Match>> {
        let mut state = self.lock();
        if state.waiting.is_empty() || state.index.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.clock.now_ms();

        let riders: Vec<Rider> = state
            .waiting
            .iter()
            .filter_map(|&(_, id)| self.riders.get(id))
            .filter(|r| r.status == RiderStatus::Waiting)
            .collect();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for rider in &riders {
            for driver in self.candidates_for(&state.index, rider)? {
                if seen.insert(driver.id) {
                    candidates.push(driver);
                }
            }
        }
        candidates.sort_by_key(|d| d.id);

        let proposals = self.batch_engine.propose_batch(&riders, &candidates, now)?;
        let mut committed = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            match self.commit_locked(&mut state, proposal) {
                Ok(confirmed) => committed.push(confirmed),
                Err(err) => {
                    tracing::warn!(
                        rider_id = %proposal.rider_id,
                        driver_id = %proposal.driver_id,
                        error = %err,
                        retryable = err.is_retryable(),
                        "batch proposal not committed, skipping"
                    );
                }
            }
        }
        tracing::info!(
            waiting = riders.len(),
            candidates = seen.len(),
            committed = committed.len(),
            "batch matching pass"
        );
        Ok(committed)
    }

    /// Match waiting riders oldest first while drivers remain in the index.
    ///
    /// A rider that cannot be matched stays queued and does not hold up the
    /// riders behind it. In batch mode the queue is left for the next batch
    /// pass.
    fn serve_waiting(&self, state: &mut CommitState) -> usize {
        if self.config.batch_matching {
            return 0;
        }
        let queue: Vec<RiderId> = state.waiting.iter().map(|&(_, id)| id).collect();
        let mut committed = 0;
        for rider_id in queue {
            if state.index.is_empty() {
                break;
            }
            match self.try_match_rider(state, rider_id) {
                Ok(Some(_)) => committed += 1,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(rider_id = %rider_id, error = %err, "waiting rider skipped");
                }
            }
        }
        committed
    }

    fn try_match_rider(
        &self,
        state: &mut CommitState,
        rider_id: RiderId,
    ) -> DispatchResult<Option<Match>> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let rider = self
                .riders
                .get(rider_id)
                .ok_or(DispatchError::UnknownRider(rider_id))?;
            if rider.status != RiderStatus::Waiting {
                return Ok(None);
            }
            let candidates = self.candidates_for(&state.index, &rider)?;
            let Some(proposal) = self
                .engine
                .propose(&rider, &candidates, self.clock.now_ms())?
            else {
                return Ok(None);
            };
            match self.commit_locked(state, proposal) {
                Ok(confirmed) => return Ok(Some(confirmed)),
                Err(err) if err.is_retryable() && attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(rider_id = %rider_id, error = %err, "commit lost a race, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Nearest Available drivers for a rider, as full entities.
    fn candidates_for(&self, index: &GeoIndex, rider: &Rider) -> DispatchResult<Vec<Driver>> {
        let ids = index.nearest(&rider.origin, self.config.candidate_limit)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| self.drivers.get(id))
            .filter(|driver| {
                let available = driver.status == DriverStatus::Available;
                if !available {
                    tracing::warn!(driver_id = %driver.id, status = ?driver.status, "indexed driver not available");
                }
                available
            })
            .collect())
    }

    /// Validate both parties against current state, then write match, driver,
    /// rider and index together. Nothing is written unless every check passes.
    fn commit_locked(&self, state: &mut CommitState, proposal: ProposedMatch) -> DispatchResult<Match> {
        let now = self.clock.now_ms();
        let rider = self
            .riders
            .get(proposal.rider_id)
            .ok_or(DispatchError::UnknownRider(proposal.rider_id))?;
        let driver = self
            .drivers
            .get(proposal.driver_id)
            .ok_or(DispatchError::UnknownDriver(proposal.driver_id))?;

        if rider.status != RiderStatus::Waiting || rider.current_match.is_some() {
            return Err(DispatchError::StaleEntity(format!(
                "rider {} is {:?}",
                rider.id, rider.status
            )));
        }
        if driver.status != DriverStatus::Available
            || driver.current_match.is_some()
            || !state.index.contains(driver.id)
        {
            return Err(DispatchError::StaleEntity(format!(
                "driver {} is {:?}",
                driver.id, driver.status
            )));
        }

        // Positions may have moved since the proposal was scored.
        let estimate = self.cost_model.estimate(&driver.location, &rider.origin)?;
        if let Some(limit) = self
            .config
            .max_pickup_km
            .filter(|&limit| estimate.distance_km > limit)
        {
            return Err(DispatchError::StaleEntity(format!(
                "driver {} is {:.3} km from rider {}, over the {limit} km pickup limit",
                driver.id, estimate.distance_km, rider.id
            )));
        }
        let score = self.weighted_cost(estimate.distance_km, estimate.eta_ms);

        let match_id = self.matches.insert(|id| Match {
            id,
            rider_id: rider.id,
            driver_id: driver.id,
            distance_km: estimate.distance_km,
            eta_ms: estimate.eta_ms,
            score,
            created_at_ms: now,
            status: MatchStatus::Proposed,
        });
        let confirmed = self
            .matches
            .update_status(match_id, MatchStatus::Confirmed, now)?;
        self.drivers
            .update_status(driver.id, DriverStatus::Reserved, now)?;
        self.drivers
            .update(driver.id, |d| d.current_match = Some(match_id));
        state.index.remove(driver.id);
        self.riders
            .update_status(rider.id, RiderStatus::Matched, now)?;
        self.riders
            .update(rider.id, |r| r.current_match = Some(match_id));
        state.waiting.remove(&(rider.requested_at_ms, rider.id));

        tracing::info!(
            match_id = %match_id,
            rider_id = %rider.id,
            driver_id = %driver.id,
            distance_km = estimate.distance_km,
            eta_ms = estimate.eta_ms,
            "match confirmed"
        );
        Ok(confirmed)
    }

    fn weighted_cost(&self, distance_km: f64, eta_ms: u64) -> f64 {
        self.config.distance_weight * distance_km + self.config.eta_weight * (eta_ms as f64 / 1000.0)
    }

    /// Cost of an active match with its driver at `driver_location`.
    fn refreshed_match_cost(
        &self,
        match_id: MatchId,
        driver_location: &Location,
    ) -> DispatchResult<Option<(MatchId, CostEstimate)>> {
        let Some(active) = self.matches.get(match_id).filter(|m| m.status.is_active()) else {
            return Ok(None);
        };
        let Some(rider) = self.riders.get(active.rider_id) else {
            return Ok(None);
        };
        let estimate = self.cost_model.estimate(driver_location, &rider.origin)?;
        Ok(Some((match_id, estimate)))
    }

    fn apply_match_cost(&self, match_id: MatchId, estimate: CostEstimate) {
        let score = self.weighted_cost(estimate.distance_km, estimate.eta_ms);
        self.matches.update(match_id, |m| {
            m.distance_km = estimate.distance_km;
            m.eta_ms = estimate.eta_ms;
            m.score = score;
        });
        tracing::debug!(
            match_id = %match_id,
            distance_km = estimate.distance_km,
            eta_ms = estimate.eta_ms,
            "match cost refreshed"
        );
    }

    /// The active match holding `rider`, with its driver.
    fn active_match_of(&self, rider: &Rider, wanted: &'static str) -> DispatchResult<(Match, Driver)> {
        let not_matched = || DispatchError::InvalidTransition {
            entity: "rider",
            id: rider.id.raw(),
            from: rider.status.name(),
            to: wanted,
        };
        let active = rider
            .current_match
            .and_then(|id| self.matches.get(id))
            .filter(|m| m.status.is_active())
            .ok_or_else(not_matched)?;
        let driver = self
            .drivers
            .get(active.driver_id)
            .ok_or(DispatchError::UnknownDriver(active.driver_id))?;
        Ok((active, driver))
    }

    // ------------------------------------------------------------------
    // Read views
    // ------------------------------------------------------------------

    pub fn rider(&self, rider_id: RiderId) -> Option<Rider> {
        self.riders.get(rider_id)
    }

    pub fn driver(&self, driver_id: DriverId) -> Option<Driver> {
        self.drivers.get(driver_id)
    }

    pub fn get_match(&self, match_id: MatchId) -> Option<Match> {
        self.matches.get(match_id)
    }

    /// The rider's active match, if any.
    pub fn match_for_rider(&self, rider_id: RiderId) -> Option<Match> {
        self.riders
            .get(rider_id)?
            .current_match
            .and_then(|id| self.matches.get(id))
            .filter(|m| m.status.is_active())
    }

    /// Confirmed matches, most recent first.
    pub fn list_active_matches(&self) -> Vec<ActiveMatch> {
        let mut confirmed = self.matches.list_by_status(MatchStatus::Confirmed);
        confirmed.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        confirmed.iter().map(Match::active_view).collect()
    }

    /// Every match ever created, in id order.
    pub fn match_history(&self) -> Vec<Match> {
        self.matches.snapshot()
    }

    /// Waiting riders in the order they will be served.
    pub fn waiting_riders(&self) -> Vec<RiderId> {
        self.lock().waiting.iter().map(|&(_, id)| id).collect()
    }

    pub fn riders_by_status(&self, status: RiderStatus) -> Vec<Rider> {
        self.riders.list_by_status(status)
    }

    pub fn drivers_by_status(&self, status: DriverStatus) -> Vec<Driver> {
        self.drivers.list_by_status(status)
    }

    pub fn counts(&self) -> DispatchCounts {
        let mut counts = DispatchCounts::default();
        for rider in self.riders.snapshot() {
            counts.add_rider(rider.status);
        }
        for driver in self.drivers.snapshot() {
            counts.add_driver(driver.status);
        }
        for m in self.matches.snapshot() {
            counts.add_match(m.status);
        }
        counts
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("riders", &self.riders)
            .field("drivers", &self.drivers)
            .field("matches", &self.matches)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng).expect("valid location")
    }

    fn dispatcher() -> (Dispatcher, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let dispatcher = Dispatcher::with_parts(
            DispatchConfig::default(),
            Arc::new(HaversineCostModel::default()),
            clock.clone(),
        )
        .expect("valid config");
        (dispatcher, clock)
    }

    #[test]
    fn proposal_goes_stale_when_driver_is_taken() {
        let (dispatcher, clock) = dispatcher();
        let here = loc(37.7749, -122.4194);
        let there = loc(37.80, -122.41);

        // Two waiting riders, then a single driver shows up and serves R1.
        let r1 = dispatcher.request_ride(here, there).expect("r1");
        clock.advance(10);
        let r2 = dispatcher.request_ride(here, there).expect("r2");

        let d1 = dispatcher.driver_online(here).expect("d1");
        assert_eq!(dispatcher.match_for_rider(r1).map(|m| m.driver_id), Some(d1));

        // Releasing D1 hands it straight to the next rider in the queue.
        dispatcher.cancel_ride(r1).expect("cancel r1");
        assert_eq!(dispatcher.match_for_rider(r2).map(|m| m.driver_id), Some(d1));

        let r3 = dispatcher.request_ride(here, there).expect("r3");
        let d2 = dispatcher.driver_online(here).expect("d2");
        assert_eq!(dispatcher.match_for_rider(r3).map(|m| m.driver_id), Some(d2));

        // A hand-built proposal for a rider that is no longer waiting is stale.
        let stale = ProposedMatch {
            rider_id: r3,
            driver_id: d2,
            distance_km: 0.0,
            eta_ms: 0,
            score: 0.0,
            proposed_at_ms: clock.now_ms(),
        };
        let err = dispatcher.commit(stale).expect_err("stale");
        assert!(err.is_retryable(), "{err:?}");
    }

    #[test]
    fn reconnect_serves_waiting_rider() {
        let (dispatcher, _clock) = dispatcher();
        let here = loc(40.7128, -74.0060);
        let d1 = dispatcher.driver_online(here).expect("d1");
        dispatcher.driver_offline(d1).expect("offline");

        let r1 = dispatcher.request_ride(here, loc(40.73, -73.99)).expect("r1");
        assert_eq!(dispatcher.propose_for(r1).expect("propose"), None);

        dispatcher.reconnect_driver(d1, here).expect("reconnect");
        // Reconnecting served the queue already.
        let active = dispatcher.match_for_rider(r1).expect("matched");
        assert_eq!(active.driver_id, d1);
        assert_eq!(active.status, MatchStatus::Confirmed);
    }

    #[test]
    fn reserved_driver_move_refreshes_match_cost() {
        let (dispatcher, _clock) = dispatcher();
        let pickup = loc(37.7749, -122.4194);
        let d1 = dispatcher.driver_online(loc(37.7849, -122.4194)).expect("d1");
        let r1 = dispatcher.request_ride(pickup, loc(37.80, -122.40)).expect("r1");
        let before = dispatcher.match_for_rider(r1).expect("matched");

        dispatcher
            .update_driver_location(d1, loc(37.7750, -122.4194))
            .expect("move");
        let after = dispatcher.match_for_rider(r1).expect("still matched");
        assert_eq!(after.id, before.id);
        assert!(after.distance_km < before.distance_km);
        assert!(after.eta_ms <= before.eta_ms);
    }

    #[test]
    fn rider_on_trip_cannot_cancel() {
        let (dispatcher, _clock) = dispatcher();
        let here = loc(51.5074, -0.1278);
        dispatcher.driver_online(here).expect("d1");
        let r1 = dispatcher.request_ride(here, loc(51.52, -0.10)).expect("r1");
        dispatcher.start_trip(r1).expect("start");

        let err = dispatcher.cancel_ride(r1).expect_err("on trip");
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
        dispatcher.complete_ride(r1).expect("complete");
    }
}
