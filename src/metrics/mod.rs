//! Metrics for the seat-racing rating engine

pub mod collector;

pub use collector::{
    ExtractionMetrics, MetricsCollector, MetricsTimer, QueryMetrics, RatingMetrics,
};
