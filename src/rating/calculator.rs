//! Rating algorithm trait
//!
//! Both rating algorithms turn an ordered comparison history for one scope
//! into a complete replacement set of rating rows.

use crate::rating::bradley_terry::BradleyTerryModel;
use crate::types::{Comparison, RatingMap, RatingType, ScopeSide};
use chrono::{DateTime, Utc};

/// Result of a full recompute for one scope
#[derive(Debug, Clone)]
pub struct RatingComputation {
    /// Complete replacement rating set for the scope
    pub ratings: RatingMap,
    /// Comparisons that fed the computation
    pub comparisons_used: usize,
    /// False when an iterative fit hit its cap before meeting tolerance
    pub converged: bool,
    /// Fitted pairwise model, for algorithms that produce one
    pub model: Option<BradleyTerryModel>,
}

/// Trait for rating algorithms that can rebuild a scope from its history
pub trait RatingAlgorithm: Send + Sync {
    /// Rating type this algorithm produces
    fn rating_type(&self) -> RatingType;

    /// Rebuild every rating in the scope from the comparison history
    ///
    /// # Arguments
    /// * `side` - Scope side the history was filtered to
    /// * `history` - Comparisons for the scope, in any order
    /// * `calculated_at` - Timestamp stamped on every produced row
    fn recompute(
        &self,
        side: ScopeSide,
        history: &[Comparison],
        calculated_at: DateTime<Utc>,
    ) -> crate::error::Result<RatingComputation>;

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;

    /// Update configuration from JSON
    fn update_config(&mut self, config: serde_json::Value) -> crate::error::Result<()>;
}
