//! Rating engine configuration
//!
//! Every constant that shapes ratings or confidence lives here so a host can
//! tune it without touching the algorithms.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// One step of the K-factor schedule: applies once an athlete has at least
/// `min_races` comparisons
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KFactorTier {
    pub min_races: u32,
    pub k: f64,
}

/// Elo parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EloConfig {
    /// Rating assigned before an athlete's first comparison
    pub baseline_rating: f64,
    /// K-factor schedule, sorted by `min_races` ascending
    pub k_schedule: Vec<KFactorTier>,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            baseline_rating: 1000.0,
            k_schedule: vec![
                KFactorTier { min_races: 0, k: 32.0 },
                KFactorTier { min_races: 10, k: 16.0 },
                KFactorTier { min_races: 30, k: 8.0 },
            ],
        }
    }
}

impl EloConfig {
    /// K-factor for an athlete who has already raced `races_count` comparisons
    pub fn k_factor(&self, races_count: u32) -> f64 {
        self.k_schedule
            .iter()
            .rev()
            .find(|tier| races_count >= tier.min_races)
            .or_else(|| self.k_schedule.first())
            .map(|tier| tier.k)
            .unwrap_or(32.0)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.baseline_rating.is_finite() {
            return Err(EngineError::ConfigurationError {
                message: "Elo baseline rating must be finite".to_string(),
            }
            .into());
        }

        if self.k_schedule.is_empty() {
            return Err(EngineError::ConfigurationError {
                message: "K-factor schedule cannot be empty".to_string(),
            }
            .into());
        }

        if self.k_schedule[0].min_races != 0 {
            return Err(EngineError::ConfigurationError {
                message: "First K-factor tier must start at 0 races".to_string(),
            }
            .into());
        }

        for window in self.k_schedule.windows(2) {
            if window[1].min_races <= window[0].min_races {
                return Err(EngineError::ConfigurationError {
                    message: "K-factor tiers must be sorted by min_races".to_string(),
                }
                .into());
            }
        }

        if self.k_schedule.iter().any(|tier| !is_positive(tier.k)) {
            return Err(EngineError::ConfigurationError {
                message: "K-factors must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Bradley-Terry fitting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BradleyTerryConfig {
    /// Stop once the largest relative strength change falls below this
    pub tolerance: f64,
    /// Iteration cap; a capped fit is returned flagged as not converged
    pub max_iterations: usize,
    /// Draws each athlete is credited against a virtual average opponent
    pub prior_draws: f64,
    /// Display rating of the component-average athlete
    pub display_center: f64,
    /// Display points per unit of natural-log strength
    pub display_scale: f64,
}

impl Default for BradleyTerryConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 200,
            prior_draws: 1.0,
            display_center: 1000.0,
            // Puts display differences on the Elo scale
            display_scale: 400.0 / std::f64::consts::LN_10,
        }
    }
}

impl BradleyTerryConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_positive(self.tolerance) {
            return Err(EngineError::ConfigurationError {
                message: "Bradley-Terry tolerance must be positive".to_string(),
            }
            .into());
        }

        if self.max_iterations == 0 {
            return Err(EngineError::ConfigurationError {
                message: "Bradley-Terry iteration cap must be greater than 0".to_string(),
            }
            .into());
        }

        if !is_positive(self.prior_draws) {
            return Err(EngineError::ConfigurationError {
                message: "Bradley-Terry prior draws must be positive".to_string(),
            }
            .into());
        }

        if !is_positive(self.display_scale) {
            return Err(EngineError::ConfigurationError {
                message: "Display scale must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Confidence model constants. Tunable, not load-bearing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Comparisons needed for Elo confidence to reach ~63%
    pub elo_tau: f64,
    /// Same, for Bradley-Terry evidence
    pub bradley_terry_tau: f64,
    /// Component growth scale for the connectivity factor
    pub component_tau: f64,
    /// Multiplier for athletes with only wins or only losses
    pub separation_penalty: f64,
    /// Multiplier for components without any redundant comparison
    pub acyclic_penalty: f64,
    /// Multiplier for fits that hit the iteration cap
    pub non_converged_penalty: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            elo_tau: 10.0,
            bradley_terry_tau: 10.0,
            component_tau: 3.0,
            separation_penalty: 0.8,
            acyclic_penalty: 0.9,
            non_converged_penalty: 0.5,
        }
    }
}

impl ConfidenceConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, tau) in [
            ("elo_tau", self.elo_tau),
            ("bradley_terry_tau", self.bradley_terry_tau),
            ("component_tau", self.component_tau),
        ] {
            if !is_positive(tau) {
                return Err(EngineError::ConfigurationError {
                    message: format!("{} must be positive", name),
                }
                .into());
            }
        }

        for (name, penalty) in [
            ("separation_penalty", self.separation_penalty),
            ("acyclic_penalty", self.acyclic_penalty),
            ("non_converged_penalty", self.non_converged_penalty),
        ] {
            if !(0.0..=1.0).contains(&penalty) {
                return Err(EngineError::ConfigurationError {
                    message: format!("{} must be within [0, 1]", name),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Comparison extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Swings at or below this many seconds are dead heats
    pub dead_heat_seconds: f64,
    /// When set, piece margins are scaled to this distance before the swing
    /// is taken (only for pieces that record their distance)
    pub normalize_to_meters: Option<f64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dead_heat_seconds: 0.1,
            normalize_to_meters: None,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dead_heat_seconds < 0.0 || !self.dead_heat_seconds.is_finite() {
            return Err(EngineError::ConfigurationError {
                message: "Dead heat threshold must be non-negative".to_string(),
            }
            .into());
        }

        if let Some(meters) = self.normalize_to_meters {
            if !is_positive(meters) {
                return Err(EngineError::ConfigurationError {
                    message: "Normalization distance must be positive".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Finite and strictly positive; rejects NaN
fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// All engine parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub elo: EloConfig,
    pub bradley_terry: BradleyTerryConfig,
    pub confidence: ConfidenceConfig,
    pub extraction: ExtractionConfig,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        self.elo.validate()?;
        self.bradley_terry.validate()?;
        self.confidence.validate()?;
        self.extraction.validate()?;
        Ok(())
    }
}
