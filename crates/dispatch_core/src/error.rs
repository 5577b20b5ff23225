use thiserror::Error;

use crate::entities::{DriverId, RiderId};

/// Errors surfaced by the dispatch core to its callers.
///
/// There is no "no match" variant: a rider that cannot be
/// matched stays `Waiting`, which is a normal outcome rather than a failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("invalid location: {reason}")]
    InvalidLocation { reason: String },
    #[error("invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: u64,
        from: &'static str,
        to: &'static str,
    },
    #[error("unknown driver {0}")]
    UnknownDriver(DriverId),
    #[error("unknown rider {0}")]
    UnknownRider(RiderId),
    #[error("stale entity: {0}")]
    StaleEntity(String),
}

impl DispatchError {
    pub(crate) fn invalid_location(reason: impl Into<String>) -> Self {
        Self::InvalidLocation {
            reason: reason.into(),
        }
    }

    /// True when retrying the whole operation against fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleEntity(_))
    }
}

/// Errors raised while loading or validating a [`crate::config::DispatchConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
