//! Seat Race Engine - rowing seat-race ratings
//!
//! This crate turns seat-racing sessions into head-to-head athlete
//! comparisons and rates athletes from them with an incremental Elo model and
//! a Bradley-Terry maximum likelihood fit, per side and for the whole squad.

pub mod comparison;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{EngineError, Result};
pub use types::*;

// Re-export key components
pub use comparison::ComparisonExtractor;
pub use rating::{InMemoryRatingStore, RatingStore};
pub use service::RatingEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
