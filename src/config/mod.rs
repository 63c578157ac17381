//! Configuration management for the seat-race engine
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values for every engine constant.

pub mod app;
pub mod rating;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings};
pub use rating::{
    BradleyTerryConfig, ConfidenceConfig, EloConfig, EngineSettings, ExtractionConfig,
    KFactorTier,
};
