//! Rating algorithms over seat-race comparison histories
//!
//! Elo gives incremental, order-sensitive ratings; Bradley-Terry gives a
//! batch maximum likelihood fit with pairwise win probabilities. Both
//! produce complete per-scope rating maps through [`RatingAlgorithm`].

pub mod bradley_terry;
pub mod calculator;
pub mod confidence;
pub mod elo;
pub mod graph;
pub mod storage;

// Re-export commonly used types
pub use bradley_terry::{BradleyTerryEstimator, BradleyTerryFit, BradleyTerryModel, ComponentFit};
pub use calculator::{RatingAlgorithm, RatingComputation};
pub use confidence::{ConfidenceModel, FitEvidence};
pub use elo::{EloRatingCalculator, EloUpdate, IncrementalUpdate};
pub use graph::ComparisonGraph;
pub use storage::{InMemoryRatingStore, RatingStore};
