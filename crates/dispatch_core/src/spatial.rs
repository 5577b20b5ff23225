//! Spatial operations: H3-based index of available drivers.
//!
//! The [`GeoIndex`] buckets drivers by H3 cell so that nearest-candidate
//! queries only touch the cells around the rider instead of every driver.
//! Candidates gathered from the grid are ranked by the [`CostModel`].
//!
//! Default resolution is 9 (~240m cell size), suitable for city-scale dispatch.
//! The index is not synchronized itself; the dispatcher mutates it inside its
//! commit lock together with the driver pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use h3o::{CellIndex, Resolution};

use crate::cost::CostModel;
use crate::entities::DriverId;
use crate::error::DispatchResult;
use crate::location::Location;

/// Default number of grid rings searched before falling back to a full scan.
pub const DEFAULT_MAX_SEARCH_RINGS: u32 = 10;

pub struct GeoIndex {
    resolution: Resolution,
    max_search_rings: u32,
    cost_model: Arc<dyn CostModel>,
    /// Map from H3 cell to drivers in that cell
    drivers_by_cell: HashMap<CellIndex, Vec<DriverId>>,
    /// Reverse mapping: driver → (cell, exact location)
    driver_positions: HashMap<DriverId, (CellIndex, Location)>,
}

impl GeoIndex {
    pub fn new(resolution: Resolution, cost_model: Arc<dyn CostModel>) -> Self {
        Self {
            resolution,
            max_search_rings: DEFAULT_MAX_SEARCH_RINGS,
            cost_model,
            drivers_by_cell: HashMap::new(),
            driver_positions: HashMap::new(),
        }
    }

    pub fn with_max_search_rings(mut self, rings: u32) -> Self {
        self.max_search_rings = rings;
        self
    }

    pub fn len(&self) -> usize {
        self.driver_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.driver_positions.is_empty()
    }

    pub fn contains(&self, driver: DriverId) -> bool {
        self.driver_positions.contains_key(&driver)
    }

    /// Insert a driver at the given location. Re-inserting moves the driver.
    pub fn insert(&mut self, driver: DriverId, location: Location) -> DispatchResult<()> {
        let cell = location.to_cell(self.resolution)?;
        self.remove(driver);
        self.drivers_by_cell.entry(cell).or_default().push(driver);
        self.driver_positions.insert(driver, (cell, location));
        Ok(())
    }

    /// Remove a driver from the index. Returns whether it was present.
    pub fn remove(&mut self, driver: DriverId) -> bool {
        let Some((cell, _)) = self.driver_positions.remove(&driver) else {
            return false;
        };
        if let Some(drivers) = self.drivers_by_cell.get_mut(&cell) {
            drivers.retain(|&d| d != driver);
            if drivers.is_empty() {
                self.drivers_by_cell.remove(&cell);
            }
        }
        true
    }

    /// Move an indexed driver. Drivers not in the index are left out.
    pub fn update(&mut self, driver: DriverId, location: Location) -> DispatchResult<bool> {
        let Some((old_cell, _)) = self.driver_positions.get(&driver).copied() else {
            return Ok(false);
        };
        let new_cell = location.to_cell(self.resolution)?;
        if old_cell == new_cell {
            self.driver_positions.insert(driver, (new_cell, location));
            return Ok(true);
        }
        self.insert(driver, location)?;
        Ok(true)
    }

    /// Up to `k` indexed drivers closest to `origin`, closest first.
    ///
    /// Rings are scored as they are expanded. The search stops once the `k`-th
    /// best distance is no farther than the nearest point any unvisited ring
    /// could hold, so a driver two rings out still beats a farther one in the
    /// origin cell. If the ring budget runs out first, every driver is ranked.
    /// Pairs the cost model cannot price are left out.
    pub fn nearest(&self, origin: &Location, k: usize) -> DispatchResult<Vec<DriverId>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let origin_cell = origin.to_cell(self.resolution)?;
        let edge_km = min_edge_km(origin_cell);
        let mut visited: HashSet<CellIndex> = HashSet::new();
        let mut seen = 0;
        let mut scored: Vec<(f64, DriverId)> = Vec::new();
        let mut settled = false;

        for ring in 0..=self.max_search_rings {
            for cell in origin_cell.grid_disk::<Vec<_>>(ring) {
                if !visited.insert(cell) {
                    continue;
                }
                if let Some(drivers) = self.drivers_by_cell.get(&cell) {
                    seen += drivers.len();
                    scored.extend(drivers.iter().filter_map(|&d| self.score(origin, d)));
                }
            }
            if seen == self.len() {
                settled = true;
                break;
            }
            if scored.len() >= k {
                sort_scored(&mut scored);
                if scored[k - 1].0 <= ring_lower_bound_km(ring + 1, edge_km) {
                    settled = true;
                    break;
                }
            }
        }

        if !settled {
            tracing::debug!(
                found = scored.len(),
                indexed = self.len(),
                rings = self.max_search_rings,
                "ring search unsettled, ranking all indexed drivers"
            );
            scored = self
                .driver_positions
                .keys()
                .filter_map(|&d| self.score(origin, d))
                .collect();
        }

        sort_scored(&mut scored);
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, driver)| driver).collect())
    }

    fn score(&self, origin: &Location, driver: DriverId) -> Option<(f64, DriverId)> {
        let (_, location) = self.driver_positions.get(&driver)?;
        match self.cost_model.estimate(origin, location) {
            Ok(estimate) => Some((estimate.distance_km, driver)),
            Err(err) => {
                tracing::debug!(driver_id = %driver, error = %err, "driver has no cost, skipping");
                None
            }
        }
    }
}

fn sort_scored(scored: &mut [(f64, DriverId)]) {
    scored.sort_by(|(da, ia), (db, ib)| da.total_cmp(db).then_with(|| ia.cmp(ib)));
}

/// Shortest edge of `cell`, or 0 when H3 cannot tell (the bound then never
/// settles and the search falls back to ranking everything).
fn min_edge_km(cell: CellIndex) -> f64 {
    let shortest = cell
        .edges()
        .map(|edge| edge.length_km())
        .fold(f64::INFINITY, f64::min);
    if shortest.is_finite() {
        shortest
    } else {
        0.0
    }
}

/// Lower bound on the distance from any point of the origin cell to any point
/// of a cell `ring` steps away. Centres of ring `d` are at least `1.5 * d`
/// edges apart from the origin centre and each cell reaches one edge out from
/// its own; the 0.9 factor absorbs cell distortion.
fn ring_lower_bound_km(ring: u32, edge_km: f64) -> f64 {
    ((1.5 * ring as f64 - 2.0) * edge_km * 0.9).max(0.0)
}

impl std::fmt::Debug for GeoIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoIndex")
            .field("resolution", &self.resolution)
            .field("max_search_rings", &self.max_search_rings)
            .field("drivers", &self.driver_positions.len())
            .field("cells", &self.drivers_by_cell.len())
            .finish()
    }
}
