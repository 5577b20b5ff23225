//! Dispatcher configuration.

use h3o::Resolution;
use serde::{Deserialize, Serialize};

use crate::cost::DEFAULT_AVG_SPEED_KMH;
use crate::error::ConfigError;
use crate::spatial::DEFAULT_MAX_SEARCH_RINGS;

/// Algorithm used by the batch pass over queued riders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchAlgorithm {
    /// Sequential greedy pass, oldest rider first.
    CostBased,
    /// Global min-cost assignment (Kuhn-Munkres).
    #[default]
    Hungarian,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Weight on pickup distance (per km) in the matching cost.
    pub distance_weight: f64,
    /// Weight on pickup ETA (per second) in the matching cost.
    pub eta_weight: f64,
    /// Average speed used for ETA estimation.
    pub avg_speed_kmh: f64,
    /// H3 resolution of the driver index (0-15).
    pub h3_resolution: u8,
    /// Number of nearest drivers handed to the matching engine.
    pub candidate_limit: usize,
    /// Grid rings searched before falling back to a full scan.
    pub max_search_rings: u32,
    /// Drivers farther than this are never proposed.
    pub max_pickup_km: Option<f64>,
    pub batch_algorithm: BatchAlgorithm,
    /// Defer matching to [`crate::Dispatcher::match_waiting_riders`] instead
    /// of pairing on every arrival.
    pub batch_matching: bool,
    /// Capacity of the distance memo; 0 disables it.
    pub distance_cache_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            distance_weight: 1.0,
            eta_weight: 1.0,
            avg_speed_kmh: DEFAULT_AVG_SPEED_KMH,
            h3_resolution: 9,
            candidate_limit: 16,
            max_search_rings: DEFAULT_MAX_SEARCH_RINGS,
            max_pickup_km: None,
            batch_algorithm: BatchAlgorithm::default(),
            batch_matching: false,
            distance_cache_size: 50_000,
        }
    }
}

impl DispatchConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_weights(mut self, distance_weight: f64, eta_weight: f64) -> Self {
        self.distance_weight = distance_weight;
        self.eta_weight = eta_weight;
        self
    }

    pub fn with_avg_speed_kmh(mut self, kmh: f64) -> Self {
        self.avg_speed_kmh = kmh;
        self
    }

    pub fn with_h3_resolution(mut self, resolution: u8) -> Self {
        self.h3_resolution = resolution;
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn with_max_search_rings(mut self, rings: u32) -> Self {
        self.max_search_rings = rings;
        self
    }

    pub fn with_max_pickup_km(mut self, km: f64) -> Self {
        self.max_pickup_km = Some(km);
        self
    }

    pub fn with_batch_algorithm(mut self, algorithm: BatchAlgorithm) -> Self {
        self.batch_algorithm = algorithm;
        self
    }

    pub fn with_batch_matching(mut self, enabled: bool) -> Self {
        self.batch_matching = enabled;
        self
    }

    pub fn with_distance_cache_size(mut self, size: usize) -> Self {
        self.distance_cache_size = size;
        self
    }

    pub fn resolution(&self) -> Result<Resolution, ConfigError> {
        Resolution::try_from(self.h3_resolution).map_err(|err| ConfigError::Invalid {
            field: "h3_resolution",
            reason: err.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, weight) in [
            ("distance_weight", self.distance_weight),
            ("eta_weight", self.eta_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be finite and non-negative, got {weight}"),
                });
            }
        }
        if !self.avg_speed_kmh.is_finite() || self.avg_speed_kmh <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "avg_speed_kmh",
                reason: format!("must be positive, got {}", self.avg_speed_kmh),
            });
        }
        if self.candidate_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "candidate_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(km) = self.max_pickup_km {
            if !km.is_finite() || km < 0.0 {
                return Err(ConfigError::Invalid {
                    field: "max_pickup_km",
                    reason: format!("must be finite and non-negative, got {km}"),
                });
            }
        }
        self.resolution()?;
        Ok(())
    }
}
