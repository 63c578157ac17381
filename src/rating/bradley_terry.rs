//! Bradley-Terry maximum likelihood estimation
//!
//! Fits one latent strength per athlete so that
//! `P(i beats j) = s_i / (s_i + s_j)`, using the classical MM fixed-point
//! iteration:
//!
//! ```text
//! s_i <- W_i / sum_j n_ij / (s_i + s_j)
//! ```
//!
//! Each athlete also carries `prior_draws` draws against a virtual opponent
//! of fixed strength 1, which keeps perfect-record athletes finite and pins
//! the scale of every component. Components of the comparison graph are fit
//! independently; strengths are never compared across them.

use crate::config::BradleyTerryConfig;
use crate::error::EngineError;
use crate::rating::calculator::{RatingAlgorithm, RatingComputation};
use crate::rating::confidence::{ConfidenceModel, FitEvidence};
use crate::rating::graph::ComparisonGraph;
use crate::types::{
    AthleteId, AthleteRating, Comparison, RatingDetails, RatingMap, RatingType, ScopeSide,
    WinProbability,
};
use crate::utils::relative_change;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Strength of the virtual average opponent
const VIRTUAL_OPPONENT_STRENGTH: f64 = 1.0;

/// Fit statistics for one connected component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentFit {
    pub size: usize,
    pub iterations: usize,
    pub converged: bool,
    /// Largest relative strength change in the final iteration
    pub final_change: f64,
}

/// Fitted strengths for one scope, queried by win probability consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BradleyTerryModel {
    side: ScopeSide,
    strengths: BTreeMap<AthleteId, f64>,
    components: BTreeMap<AthleteId, usize>,
    component_fits: Vec<ComponentFit>,
    fitted_at: DateTime<Utc>,
}

impl BradleyTerryModel {
    pub fn side(&self) -> ScopeSide {
        self.side
    }

    /// Raw strength on the fitted scale
    pub fn strength(&self, athlete_id: &str) -> Option<f64> {
        self.strengths.get(athlete_id).copied()
    }

    pub fn component_of(&self, athlete_id: &str) -> Option<usize> {
        self.components.get(athlete_id).copied()
    }

    pub fn component_fits(&self) -> &[ComponentFit] {
        &self.component_fits
    }

    /// Whether every component met tolerance
    pub fn converged(&self) -> bool {
        self.component_fits.iter().all(|fit| fit.converged)
    }

    pub fn athletes(&self) -> impl Iterator<Item = &AthleteId> {
        self.strengths.keys()
    }

    /// `P(a beats b)`, or insufficient data when the athletes are unknown or
    /// sit in different components
    pub fn win_probability(&self, athlete_a: &str, athlete_b: &str) -> WinProbability {
        let (Some(component_a), Some(component_b)) =
            (self.component_of(athlete_a), self.component_of(athlete_b))
        else {
            return WinProbability::InsufficientData;
        };
        if component_a != component_b {
            return WinProbability::InsufficientData;
        }

        match (self.strength(athlete_a), self.strength(athlete_b)) {
            (Some(s_a), Some(s_b)) => WinProbability::Estimate(s_a / (s_a + s_b)),
            _ => WinProbability::InsufficientData,
        }
    }

    /// Row `i`, column `j` holds `P(athletes[i] beats athletes[j])`
    pub fn probability_matrix(&self, athletes: &[AthleteId]) -> Vec<Vec<WinProbability>> {
        athletes
            .iter()
            .map(|a| athletes.iter().map(|b| self.win_probability(a, b)).collect())
            .collect()
    }

    /// Same model with every strength multiplied by `factor`
    pub fn with_scaled_strengths(&self, factor: f64) -> Self {
        let mut scaled = self.clone();
        for strength in scaled.strengths.values_mut() {
            *strength *= factor;
        }
        scaled
    }
}

/// Per-athlete tallies collected from the history
#[derive(Debug, Clone, Default)]
struct Tally {
    wins: u32,
    losses: u32,
    draws: u32,
    /// Comparisons against each opponent node
    games: BTreeMap<usize, f64>,
}

impl Tally {
    fn races(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    fn score(&self) -> f64 {
        self.wins as f64 + 0.5 * self.draws as f64
    }
}

/// Complete output of one fit
#[derive(Debug, Clone)]
pub struct BradleyTerryFit {
    pub model: BradleyTerryModel,
    pub ratings: RatingMap,
}

/// Bradley-Terry estimator
#[derive(Debug, Clone)]
pub struct BradleyTerryEstimator {
    config: BradleyTerryConfig,
    confidence: ConfidenceModel,
}

impl BradleyTerryEstimator {
    pub fn new(
        config: BradleyTerryConfig,
        confidence: ConfidenceModel,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self { config, confidence })
    }

    /// Fit every component of the scope's comparison graph
    pub fn fit(
        &self,
        side: ScopeSide,
        history: &[Comparison],
        calculated_at: DateTime<Utc>,
    ) -> BradleyTerryFit {
        let graph = ComparisonGraph::from_comparisons(history);
        let tallies = tally(&graph, history);

        let mut strengths = vec![VIRTUAL_OPPONENT_STRENGTH; graph.node_count()];
        let mut component_fits = Vec::with_capacity(graph.component_count());
        for component in 0..graph.component_count() {
            let members = graph.component_members(component);
            let fit = self.fit_component(members, &tallies, &mut strengths);
            if !fit.converged {
                warn!(
                    "Bradley-Terry fit for {} side component {} ({} athletes) hit the {} iteration cap, max relative change {:.3e}",
                    side, component, fit.size, self.config.max_iterations, fit.final_change
                );
            }
            component_fits.push(fit);
        }

        let mut ratings = RatingMap::new();
        let mut model_strengths = BTreeMap::new();
        let mut model_components = BTreeMap::new();

        for component in 0..graph.component_count() {
            let members = graph.component_members(component);
            let fit = component_fits[component];
            let mean_log = members.iter().map(|&i| strengths[i].ln()).sum::<f64>()
                / members.len() as f64;

            for &node in members {
                let athlete_id = graph.athlete(node).clone();
                let tally = &tallies[node];
                let log_strength = strengths[node].ln() - mean_log;

                let evidence = FitEvidence {
                    races_count: tally.races(),
                    wins: tally.wins,
                    losses: tally.losses,
                    draws: tally.draws,
                    component_size: fit.size,
                    redundant_pairs: graph.redundant_pairs(component),
                    converged: fit.converged,
                };

                ratings.insert(
                    athlete_id.clone(),
                    AthleteRating {
                        athlete_id: athlete_id.clone(),
                        side,
                        rating_value: self.config.display_center
                            + self.config.display_scale * log_strength,
                        confidence_score: self.confidence.bradley_terry_confidence(&evidence),
                        races_count: tally.races(),
                        last_calculated_at: calculated_at,
                        details: RatingDetails::BradleyTerry {
                            log_strength,
                            component,
                            component_size: fit.size,
                            converged: fit.converged,
                            iterations: fit.iterations,
                        },
                    },
                );
                model_strengths.insert(athlete_id.clone(), strengths[node]);
                model_components.insert(athlete_id, component);
            }
        }

        debug!(
            "Bradley-Terry fit for {} side: {} comparisons, {} athletes, {} components",
            side,
            history.len(),
            graph.node_count(),
            graph.component_count()
        );

        BradleyTerryFit {
            model: BradleyTerryModel {
                side,
                strengths: model_strengths,
                components: model_components,
                component_fits,
                fitted_at: calculated_at,
            },
            ratings,
        }
    }

    /// MM iteration restricted to one component. Updates are Jacobi-style:
    /// every new strength is computed from the previous iterate.
    fn fit_component(
        &self,
        members: &[usize],
        tallies: &[Tally],
        strengths: &mut [f64],
    ) -> ComponentFit {
        let prior = self.config.prior_draws;
        let mut iterations = 0;
        let mut final_change = f64::INFINITY;
        let mut converged = false;
        let mut next = vec![0.0; members.len()];

        while iterations < self.config.max_iterations {
            for (slot, &i) in members.iter().enumerate() {
                let s_i = strengths[i];
                let mut denominator = prior / (s_i + VIRTUAL_OPPONENT_STRENGTH);
                for (&j, &n_ij) in &tallies[i].games {
                    denominator += n_ij / (s_i + strengths[j]);
                }
                let numerator = tallies[i].score() + 0.5 * prior;
                next[slot] = numerator / denominator;
            }

            final_change = members
                .iter()
                .zip(&next)
                .map(|(&i, &new)| relative_change(strengths[i], new))
                .fold(0.0_f64, f64::max);
            for (&i, &new) in members.iter().zip(&next) {
                strengths[i] = new;
            }
            iterations += 1;

            if final_change < self.config.tolerance {
                converged = true;
                break;
            }
        }

        ComponentFit {
            size: members.len(),
            iterations,
            converged,
            final_change,
        }
    }
}

fn tally(graph: &ComparisonGraph, history: &[Comparison]) -> Vec<Tally> {
    let mut tallies = vec![Tally::default(); graph.node_count()];

    for comparison in history {
        let (Some(a), Some(b)) = (
            graph.index_of(&comparison.athlete_a),
            graph.index_of(&comparison.athlete_b),
        ) else {
            continue;
        };

        *tallies[a].games.entry(b).or_insert(0.0) += 1.0;
        *tallies[b].games.entry(a).or_insert(0.0) += 1.0;

        match &comparison.winner_id {
            Some(winner) if *winner == comparison.athlete_a => {
                tallies[a].wins += 1;
                tallies[b].losses += 1;
            }
            Some(_) => {
                tallies[b].wins += 1;
                tallies[a].losses += 1;
            }
            None => {
                tallies[a].draws += 1;
                tallies[b].draws += 1;
            }
        }
    }

    tallies
}

impl RatingAlgorithm for BradleyTerryEstimator {
    fn rating_type(&self) -> RatingType {
        RatingType::BradleyTerry
    }

    fn recompute(
        &self,
        side: ScopeSide,
        history: &[Comparison],
        calculated_at: DateTime<Utc>,
    ) -> crate::error::Result<RatingComputation> {
        let fit = self.fit(side, history, calculated_at);
        Ok(RatingComputation {
            converged: fit.model.converged(),
            ratings: fit.ratings,
            comparisons_used: history.len(),
            model: Some(fit.model),
        })
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    fn update_config(&mut self, config: serde_json::Value) -> crate::error::Result<()> {
        let new_config: BradleyTerryConfig = serde_json::from_value(config).map_err(|e| {
            EngineError::ConfigurationError {
                message: format!("Invalid Bradley-Terry configuration: {}", e),
            }
        })?;

        new_config.validate()?;
        self.config = new_config;
        Ok(())
    }
}
