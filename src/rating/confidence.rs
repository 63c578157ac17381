//! Confidence scoring
//!
//! Confidence measures how much comparison evidence backs a rating, never how
//! good the athlete is. Always in [0, 1] and always recomputed together with
//! the rating it qualifies.

use crate::config::ConfidenceConfig;
use crate::utils::clamp_unit;

/// Evidence behind one athlete's Bradley-Terry fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitEvidence {
    pub races_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// Athletes in the athlete's connected component
    pub component_size: usize,
    /// Distinct opponent pairs beyond a spanning tree of the component
    pub redundant_pairs: usize,
    pub converged: bool,
}

impl FitEvidence {
    /// Every result went the same way, so the fit leans on the prior alone
    pub fn is_separated(&self) -> bool {
        self.draws == 0 && (self.wins == 0 || self.losses == 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceModel {
    config: ConfidenceConfig,
}

impl ConfidenceModel {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// `1 - exp(-n / tau)`: monotone in the number of comparisons
    pub fn elo_confidence(&self, races_count: u32) -> f64 {
        saturating_evidence(races_count as f64, self.config.elo_tau)
    }

    pub fn bradley_terry_confidence(&self, evidence: &FitEvidence) -> f64 {
        let base = saturating_evidence(evidence.races_count as f64, self.config.bradley_terry_tau);

        let growth = saturating_evidence(
            evidence.component_size.saturating_sub(1) as f64,
            self.config.component_tau,
        );
        let connectivity = 0.5 + 0.5 * growth;

        let mut conditioning = 1.0;
        if evidence.is_separated() {
            conditioning *= self.config.separation_penalty;
        }
        if evidence.component_size > 2 && evidence.redundant_pairs == 0 {
            conditioning *= self.config.acyclic_penalty;
        }
        if !evidence.converged {
            conditioning *= self.config.non_converged_penalty;
        }

        clamp_unit(base * connectivity * conditioning)
    }
}

fn saturating_evidence(count: f64, tau: f64) -> f64 {
    clamp_unit(1.0 - (-count / tau).exp())
}
