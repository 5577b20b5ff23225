pub mod algorithm;
pub mod cost_based;
pub mod hungarian;
pub mod types;

pub use algorithm::MatchingAlgorithm;
pub use cost_based::CostBasedMatching;
pub use hungarian::HungarianMatching;
pub use types::{MatchCandidate, ProposedMatch};
