//! Seat race Elo
//!
//! Logistic Elo replayed over the chronological comparison history. Ratings
//! can be advanced one comparison at a time, so a new session updates the
//! materialized ratings without a global refit; a full replay from the
//! baseline must land on exactly the same numbers.

use crate::comparison::ordering::sort_chronologically;
use crate::config::EloConfig;
use crate::error::EngineError;
use crate::rating::calculator::{RatingAlgorithm, RatingComputation};
use crate::rating::confidence::ConfidenceModel;
use crate::types::{
    AthleteRating, Comparison, ComparisonKey, RatingDetails, RatingMap, RatingType, ScopeSide,
};
use chrono::{DateTime, Utc};
use skillratings::elo::{expected_score, EloRating};
use skillratings::Outcomes;
use tracing::debug;

/// Rating movement produced by one comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EloUpdate {
    /// Expected score of athlete A before the comparison
    pub expected_a: f64,
    /// K-factor applied to both athletes
    pub k: f64,
    pub delta_a: f64,
    pub delta_b: f64,
}

/// Outcome of an incremental update attempt
#[derive(Debug, Clone)]
pub enum IncrementalUpdate {
    Applied(RatingMap),
    /// A new comparison orders at or before one the ratings already reflect;
    /// only a full replay gives the right answer
    OutOfOrder {
        latest_applied: ComparisonKey,
        first_new: ComparisonKey,
    },
}

/// Elo rating calculator for seat race comparisons
#[derive(Debug, Clone)]
pub struct EloRatingCalculator {
    config: EloConfig,
    confidence: ConfidenceModel,
}

impl EloRatingCalculator {
    /// Create a new Elo calculator
    pub fn new(config: EloConfig, confidence: ConfidenceModel) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self { config, confidence })
    }

    /// Rating row for an athlete with no comparisons yet
    pub fn baseline_rating(
        &self,
        athlete_id: &str,
        side: ScopeSide,
        calculated_at: DateTime<Utc>,
    ) -> AthleteRating {
        AthleteRating {
            athlete_id: athlete_id.to_string(),
            side,
            rating_value: self.config.baseline_rating,
            confidence_score: self.confidence.elo_confidence(0),
            races_count: 0,
            last_calculated_at: calculated_at,
            details: RatingDetails::SeatRaceElo {
                wins: 0,
                losses: 0,
                draws: 0,
                delta_sum: 0.0,
                delta_sum_squared: 0.0,
                last_comparison: None,
            },
        }
    }

    /// `1 / (1 + 10^((R_b - R_a) / 400))`
    pub fn expected_score(&self, rating_a: f64, rating_b: f64) -> f64 {
        let (expected_a, _) = expected_score(
            &EloRating { rating: rating_a },
            &EloRating { rating: rating_b },
        );
        expected_a
    }

    /// Rating movement for one comparison. The K-factor is the mean of both
    /// athletes' scheduled values, so the deltas are exactly opposite.
    pub fn update_for(
        &self,
        rating_a: f64,
        races_a: u32,
        rating_b: f64,
        races_b: u32,
        outcome_a: Outcomes,
    ) -> EloUpdate {
        let expected_a = self.expected_score(rating_a, rating_b);
        let k = (self.config.k_factor(races_a) + self.config.k_factor(races_b)) / 2.0;
        let delta_a = k * (outcome_a.to_chess_points() - expected_a);

        EloUpdate {
            expected_a,
            k,
            delta_a,
            delta_b: -delta_a,
        }
    }

    /// Apply one comparison on top of `ratings`, creating baseline rows for
    /// athletes seen for the first time
    pub fn apply_comparison(
        &self,
        ratings: &mut RatingMap,
        comparison: &Comparison,
        side: ScopeSide,
        calculated_at: DateTime<Utc>,
    ) -> crate::error::Result<EloUpdate> {
        for athlete_id in [&comparison.athlete_a, &comparison.athlete_b] {
            if !ratings.contains_key(athlete_id) {
                ratings.insert(
                    athlete_id.clone(),
                    self.baseline_rating(athlete_id, side, calculated_at),
                );
            }
        }

        let (rating_a, races_a) = current(ratings, &comparison.athlete_a)?;
        let (rating_b, races_b) = current(ratings, &comparison.athlete_b)?;

        let outcome_a = outcome_for_a(comparison);
        let update = self.update_for(rating_a, races_a, rating_b, races_b, outcome_a);
        let key = comparison.key();

        if let Some(row) = ratings.get_mut(&comparison.athlete_a) {
            self.record(row, update.delta_a, outcome_a, &key, calculated_at)?;
        }
        let outcome_b = match outcome_a {
            Outcomes::WIN => Outcomes::LOSS,
            Outcomes::LOSS => Outcomes::WIN,
            Outcomes::DRAW => Outcomes::DRAW,
        };
        if let Some(row) = ratings.get_mut(&comparison.athlete_b) {
            self.record(row, update.delta_b, outcome_b, &key, calculated_at)?;
        }

        Ok(update)
    }

    /// Full recompute: discard everything and replay the history from the
    /// baseline in replay order
    pub fn replay(
        &self,
        side: ScopeSide,
        history: &[Comparison],
        calculated_at: DateTime<Utc>,
    ) -> crate::error::Result<RatingMap> {
        let mut ordered = history.to_vec();
        sort_chronologically(&mut ordered);

        let mut ratings = RatingMap::new();
        for comparison in &ordered {
            self.apply_comparison(&mut ratings, comparison, side, calculated_at)?;
        }

        debug!(
            "Elo replay for {} side: {} comparisons, {} athletes",
            side,
            ordered.len(),
            ratings.len()
        );

        Ok(ratings)
    }

    /// Advance materialized ratings by comparisons they do not yet reflect
    pub fn apply_incremental(
        &self,
        current_ratings: &RatingMap,
        side: ScopeSide,
        new_comparisons: &[Comparison],
        calculated_at: DateTime<Utc>,
    ) -> crate::error::Result<IncrementalUpdate> {
        let mut latest_applied: Option<&ComparisonKey> = None;
        for rating in current_ratings.values() {
            match &rating.details {
                RatingDetails::SeatRaceElo {
                    last_comparison, ..
                } => {
                    if let Some(key) = last_comparison {
                        if latest_applied.map_or(true, |latest| key > latest) {
                            latest_applied = Some(key);
                        }
                    }
                }
                RatingDetails::BradleyTerry { .. } => {
                    return Err(EngineError::InvalidScope {
                        reason: format!(
                            "rating row for {} is not a seat race Elo rating",
                            rating.athlete_id
                        ),
                    }
                    .into());
                }
            }
        }

        let mut ordered = new_comparisons.to_vec();
        sort_chronologically(&mut ordered);

        if let (Some(latest), Some(first)) = (latest_applied, ordered.first()) {
            let first_new = first.key();
            if first_new <= *latest {
                return Ok(IncrementalUpdate::OutOfOrder {
                    latest_applied: latest.clone(),
                    first_new,
                });
            }
        }

        let mut ratings = current_ratings.clone();
        for rating in ratings.values_mut() {
            rating.last_calculated_at = calculated_at;
        }
        for comparison in &ordered {
            self.apply_comparison(&mut ratings, comparison, side, calculated_at)?;
        }

        Ok(IncrementalUpdate::Applied(ratings))
    }

    fn record(
        &self,
        row: &mut AthleteRating,
        delta: f64,
        outcome: Outcomes,
        key: &ComparisonKey,
        calculated_at: DateTime<Utc>,
    ) -> crate::error::Result<()> {
        let RatingDetails::SeatRaceElo {
            wins,
            losses,
            draws,
            delta_sum,
            delta_sum_squared,
            last_comparison,
        } = &mut row.details
        else {
            return Err(EngineError::InvalidScope {
                reason: format!(
                    "rating row for {} is not a seat race Elo rating",
                    row.athlete_id
                ),
            }
            .into());
        };

        match outcome {
            Outcomes::WIN => *wins += 1,
            Outcomes::LOSS => *losses += 1,
            Outcomes::DRAW => *draws += 1,
        }
        *delta_sum += delta;
        *delta_sum_squared += delta * delta;
        *last_comparison = Some(key.clone());

        row.rating_value += delta;
        row.races_count += 1;
        row.confidence_score = self.confidence.elo_confidence(row.races_count);
        row.last_calculated_at = calculated_at;

        Ok(())
    }
}

impl RatingAlgorithm for EloRatingCalculator {
    fn rating_type(&self) -> RatingType {
        RatingType::SeatRaceElo
    }

    fn recompute(
        &self,
        side: ScopeSide,
        history: &[Comparison],
        calculated_at: DateTime<Utc>,
    ) -> crate::error::Result<RatingComputation> {
        let ratings = self.replay(side, history, calculated_at)?;
        Ok(RatingComputation {
            ratings,
            comparisons_used: history.len(),
            converged: true,
            model: None,
        })
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    fn update_config(&mut self, config: serde_json::Value) -> crate::error::Result<()> {
        let new_config: EloConfig = serde_json::from_value(config).map_err(|e| {
            EngineError::ConfigurationError {
                message: format!("Invalid Elo configuration: {}", e),
            }
        })?;

        new_config.validate()?;
        self.config = new_config;
        Ok(())
    }
}

fn outcome_for_a(comparison: &Comparison) -> Outcomes {
    match &comparison.winner_id {
        Some(winner) if *winner == comparison.athlete_a => Outcomes::WIN,
        Some(_) => Outcomes::LOSS,
        None => Outcomes::DRAW,
    }
}

fn current(ratings: &RatingMap, athlete_id: &str) -> crate::error::Result<(f64, u32)> {
    ratings
        .get(athlete_id)
        .map(|row| (row.rating_value, row.races_count))
        .ok_or_else(|| {
            EngineError::InternalError {
                message: format!("missing rating row for {}", athlete_id),
            }
            .into()
        })
}
