//! Hungarian (Kuhn-Munkres) assignment for batches of queued riders.
//!
//! Uses the same scoring as [`CostBasedMatching`] but minimizes the total
//! cost over every rider/driver pair in the batch. Single-rider proposals
//! delegate to the greedy rule.

use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};

use crate::entities::{Driver, Rider};
use crate::error::DispatchResult;

use super::algorithm::MatchingAlgorithm;
use super::types::ProposedMatch;
use super::CostBasedMatching;

/// Scale factor to convert f64 cost to i64 for the assignment algorithm
/// (thousandths of a cost unit).
const SCALE: f64 = 1_000.0;

/// Weight for ineligible pairs (never selected).
/// Must be worse than any feasible weight but not so extreme that negating and
/// summing inside pathfinding overflows i64.
const INFEASIBLE: i64 = -10_000_000_000_000_i64; // -1e13

/// Lowest weight a feasible pair can get. Costs up to 1e9 rank exactly; an
/// antipodal pickup at default weights costs about 1.8e6.
const FEASIBLE_FLOOR: i64 = INFEASIBLE / 10;

/// Row-major matrix implementing pathfinding's Weights for i64.
struct I64Weights(Vec<Vec<i64>>);

impl Weights<i64> for I64Weights {
    fn rows(&self) -> usize {
        self.0.len()
    }

    fn columns(&self) -> usize {
        self.0.first().map_or(0, |r| r.len())
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.0[row][col]
    }

    fn neg(&self) -> Self {
        I64Weights(
            self.0
                .iter()
                .map(|r| r.iter().map(|&x| x.saturating_neg()).collect())
                .collect(),
        )
    }
}

/// Global batch optimizer: minimizes the summed matching cost of a batch.
#[derive(Debug, Clone)]
pub struct HungarianMatching {
    greedy: CostBasedMatching,
}

impl HungarianMatching {
    pub fn new(greedy: CostBasedMatching) -> Self {
        Self { greedy }
    }

    /// Convert a cost to a maximization weight, clamped to
    /// [`FEASIBLE_FLOOR`] so it always beats [`INFEASIBLE`].
    fn cost_to_weight(cost: f64) -> i64 {
        let w = (-cost * SCALE).round();
        if w <= FEASIBLE_FLOOR as f64 {
            FEASIBLE_FLOOR
        } else {
            w as i64
        }
    }
}

impl Default for HungarianMatching {
    fn default() -> Self {
        Self::new(CostBasedMatching::default())
    }
}

impl MatchingAlgorithm for HungarianMatching {
    fn propose(
        &self,
        rider: &Rider,
        candidates: &[Driver],
        now_ms: u64,
    ) -> DispatchResult<Option<ProposedMatch>> {
        self.greedy.propose(rider, candidates, now_ms)
    }

    fn propose_batch(
        &self,
        riders: &[Rider],
        candidates: &[Driver],
        now_ms: u64,
    ) -> DispatchResult<Vec<ProposedMatch>> {
        if riders.is_empty() || candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Score every pair once; cells stay None for ineligible pairs.
        let mut scored = vec![vec![None; candidates.len()]; riders.len()];
        let mut any_feasible = false;
        for (i, rider) in riders.iter().enumerate() {
            for (j, driver) in candidates.iter().enumerate() {
                let candidate = self.greedy.candidate(rider, driver)?;
                any_feasible |= candidate.is_some();
                scored[i][j] = candidate;
            }
        }
        if !any_feasible {
            return Ok(Vec::new());
        }

        // Kuhn-Munkres requires rows <= columns, so the smaller side is rows.
        let riders_are_rows = riders.len() <= candidates.len();
        let (rows, cols) = if riders_are_rows {
            (riders.len(), candidates.len())
        } else {
            (candidates.len(), riders.len())
        };
        let mut matrix = vec![vec![INFEASIBLE; cols]; rows];
        for (i, row) in scored.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                if let Some(candidate) = cell {
                    let weight = Self::cost_to_weight(candidate.cost);
                    if riders_are_rows {
                        matrix[i][j] = weight;
                    } else {
                        matrix[j][i] = weight;
                    }
                }
            }
        }

        let weights = I64Weights(matrix);
        let (_total, assignments) = kuhn_munkres(&weights);

        let mut proposals = Vec::new();
        for (row, &col) in assignments.iter().enumerate() {
            if weights.at(row, col) <= INFEASIBLE {
                continue;
            }
            let (rider_idx, driver_idx) = if riders_are_rows { (row, col) } else { (col, row) };
            if let Some(candidate) = scored[rider_idx][driver_idx] {
                proposals.push(ProposedMatch::from_candidate(
                    riders[rider_idx].id,
                    candidate,
                    now_ms,
                ));
            }
        }
        // Keep the caller's rider order (oldest first).
        proposals.sort_by_key(|p| {
            riders
                .iter()
                .position(|r| r.id == p.rider_id)
                .unwrap_or(usize::MAX)
        });
        Ok(proposals)
    }
}
