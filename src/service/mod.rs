//! Service layer for the seat-race engine
//!
//! The engine ties extraction, rating algorithms and the host's store
//! together behind the recalculate and query entry points.

pub mod engine;

pub use engine::{EngineStats, RatingEngine, SessionRecord};
