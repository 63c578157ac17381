//! Comparison extraction and ordering
//!
//! Sessions are reduced to atomic athlete-vs-athlete comparisons here; the
//! rating algorithms only ever see the ordered comparison stream.

pub mod extractor;
pub mod ordering;

pub use extractor::{ComparisonExtractor, ExcludedPair, ExclusionReason, Extraction};
pub use ordering::{races_per_athlete, replay_order, scoped_history, sort_chronologically};
