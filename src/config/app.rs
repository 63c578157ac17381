//! Main application configuration
//!
//! This module defines the top-level configuration for the seat-race engine
//! host, including environment variable loading, TOML files and validation.

use crate::config::rating::EngineSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub engine: EngineSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "seat-race-engine".to_string(),
            log_level: "info".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", key, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still override
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SEAT_RACE_SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("SEAT_RACE_LOG_LEVEL") {
            self.service.log_level = log_level;
        }

        // Elo settings
        if let Some(baseline) = parse_env("ELO_BASELINE")? {
            self.engine.elo.baseline_rating = baseline;
        }

        // Bradley-Terry settings
        if let Some(tolerance) = parse_env("BT_TOLERANCE")? {
            self.engine.bradley_terry.tolerance = tolerance;
        }
        if let Some(max_iterations) = parse_env("BT_MAX_ITERATIONS")? {
            self.engine.bradley_terry.max_iterations = max_iterations;
        }
        if let Some(prior_draws) = parse_env("BT_PRIOR_DRAWS")? {
            self.engine.bradley_terry.prior_draws = prior_draws;
        }

        // Confidence settings
        if let Some(tau) = parse_env("ELO_CONFIDENCE_TAU")? {
            self.engine.confidence.elo_tau = tau;
        }
        if let Some(tau) = parse_env("BT_CONFIDENCE_TAU")? {
            self.engine.confidence.bradley_terry_tau = tau;
        }

        // Extraction settings
        if let Some(dead_heat) = parse_env("DEAD_HEAT_SECONDS")? {
            self.engine.extraction.dead_heat_seconds = dead_heat;
        }
        if let Some(meters) = parse_env("NORMALIZE_TO_METERS")? {
            self.engine.extraction.normalize_to_meters = Some(meters);
        }

        Ok(())
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.name.is_empty() {
        return Err(anyhow!("Service name cannot be empty"));
    }

    config.engine.validate()?;

    Ok(())
}
