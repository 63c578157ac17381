//! Rating engine
//!
//! Coordinates extraction, both rating algorithms and the host's rating
//! store. Every recompute produces a complete replacement map for its scope
//! and hands it to the store in one call. The host serializes recomputes of
//! the same scope; different scopes may run concurrently on clones of the
//! engine.

use crate::comparison::{ComparisonExtractor, Extraction};
use crate::config::EngineSettings;
use crate::error::{EngineError, Result};
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::rating::{
    BradleyTerryEstimator, BradleyTerryModel, ConfidenceModel, EloRatingCalculator,
    IncrementalUpdate, RatingAlgorithm, RatingStore,
};
use crate::types::{
    rank_ratings, Algorithm, AthleteId, AthleteRating, AthleteSide, Comparison, RankedAthlete,
    RatingMap, RatingScope, RatingType, ScopeSide, SeatRaceSession, SessionId, WinProbability,
};
use crate::utils::current_timestamp;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Statistics about engine operations
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Full recomputes, any algorithm
    pub full_recalculations: u64,
    /// Incremental Elo updates applied without a replay
    pub incremental_updates: u64,
    /// Incremental updates that had to fall back to a full replay
    pub incremental_fallbacks: u64,
    /// Sessions recorded through `record_session`
    pub sessions_recorded: u64,
    /// Bradley-Terry fits that hit the iteration cap
    pub convergence_warnings: u64,
}

/// Outcome of recording one session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub extraction: Extraction,
    /// Comparisons the session held before this recording
    pub replaced_comparisons: usize,
    /// Scopes whose ratings were rebuilt or updated
    pub updated_scopes: Vec<RatingScope>,
}

/// The seat racing rating engine
#[derive(Clone)]
pub struct RatingEngine {
    store: Arc<dyn RatingStore>,
    extractor: ComparisonExtractor,
    elo: Arc<EloRatingCalculator>,
    bradley_terry: Arc<BradleyTerryEstimator>,
    /// Last fitted Bradley-Terry model per scope
    models: Arc<RwLock<HashMap<RatingScope, Arc<BradleyTerryModel>>>>,
    /// Scopes whose stored ratings no longer match the comparison log
    stale_scopes: Arc<RwLock<HashSet<RatingScope>>>,
    stats: Arc<RwLock<EngineStats>>,
    metrics_collector: Option<Arc<MetricsCollector>>,
}

impl RatingEngine {
    /// Create a new engine over the host's store
    pub fn new(settings: EngineSettings, store: Arc<dyn RatingStore>) -> Result<Self> {
        settings.validate()?;

        let confidence = ConfidenceModel::new(settings.confidence.clone());
        let elo = EloRatingCalculator::new(settings.elo.clone(), confidence.clone())?;
        let bradley_terry =
            BradleyTerryEstimator::new(settings.bradley_terry.clone(), confidence)?;

        Ok(Self {
            extractor: ComparisonExtractor::new(settings.extraction.clone()),
            store,
            elo: Arc::new(elo),
            bradley_terry: Arc::new(bradley_terry),
            models: Arc::new(RwLock::new(HashMap::new())),
            stale_scopes: Arc::new(RwLock::new(HashSet::new())),
            stats: Arc::new(RwLock::new(EngineStats::default())),
            metrics_collector: None,
        })
    }

    /// Create a new engine that records Prometheus metrics
    pub fn with_metrics(
        settings: EngineSettings,
        store: Arc<dyn RatingStore>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let mut engine = Self::new(settings, store)?;
        engine.metrics_collector = Some(metrics_collector);
        Ok(engine)
    }

    fn algorithm(&self, algorithm: Algorithm) -> &dyn RatingAlgorithm {
        match algorithm {
            Algorithm::Elo => &*self.elo,
            Algorithm::BradleyTerry => &*self.bradley_terry,
        }
    }

    /// Full recompute of one scope from its comparison log
    ///
    /// Discards the scope's current ratings, rebuilds them from the complete
    /// history and saves the replacement map through the store.
    pub fn recalculate(&self, scope: &RatingScope, algorithm: Algorithm) -> Result<RatingMap> {
        if scope.rating_type != algorithm.rating_type() {
            return Err(EngineError::InvalidScope {
                reason: format!(
                    "scope {} cannot be computed with {:?}",
                    scope, algorithm
                ),
            }
            .into());
        }

        let timer = MetricsTimer::start();
        let history = self.store.load_comparisons(scope)?;
        let calculated_at = current_timestamp();

        let computation = self
            .algorithm(algorithm)
            .recompute(scope.side, &history, calculated_at)?;

        if let Some(model) = computation.model {
            if !computation.converged {
                warn!(
                    "Scope {} saved with a non-converged Bradley-Terry fit",
                    scope
                );
                self.update_stats(|stats| stats.convergence_warnings += 1);
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_convergence_warning(scope.side);
                }
            }
            self.cache_model(*scope, model)?;
        }

        let ratings = computation.ratings;
        self.store.save_ratings(scope, ratings.clone())?;
        self.mark_fresh(scope)?;

        let elapsed = timer.stop();
        self.update_stats(|stats| stats.full_recalculations += 1);
        if let Some(metrics) = &self.metrics_collector {
            metrics.record_recalculation(algorithm, scope, false, ratings.len(), elapsed);
        }

        info!(
            "Recalculated {}: {} comparisons, {} athletes in {:?}",
            scope,
            computation.comparisons_used,
            ratings.len(),
            elapsed
        );

        Ok(ratings)
    }

    /// Full recompute of a scope with the algorithm its rating type implies
    pub fn recalculate_scope(&self, scope: &RatingScope) -> Result<RatingMap> {
        self.recalculate(scope, Algorithm::from(scope.rating_type))
    }

    /// Full recompute of every (rating type, side) scope
    pub fn recalculate_all(&self) -> Result<BTreeMap<RatingScope, RatingMap>> {
        let mut results = BTreeMap::new();
        for scope in RatingScope::all_scopes() {
            let ratings = self.recalculate_scope(&scope)?;
            results.insert(scope, ratings);
        }
        Ok(results)
    }

    /// Apply comparisons that were just appended to the log
    ///
    /// Elo scopes are updated incrementally on top of their current ratings.
    /// When the current ratings do not cover exactly the earlier part of the
    /// log, or a new comparison orders before one already applied, the scope
    /// is replayed in full instead. Bradley-Terry scopes always refit.
    pub fn apply_new_comparisons(
        &self,
        scope: &RatingScope,
        new_comparisons: &[Comparison],
    ) -> Result<RatingMap> {
        if scope.rating_type == RatingType::BradleyTerry {
            return self.recalculate(scope, Algorithm::BradleyTerry);
        }

        let timer = MetricsTimer::start();
        let new_in_scope: Vec<Comparison> = new_comparisons
            .iter()
            .filter(|c| scope.side.includes(c.side))
            .cloned()
            .collect();
        if self.is_stale(scope)? {
            warn!(
                "Ratings for {} predate a session import or correction, replaying",
                scope
            );
            return self.fall_back_to_replay(scope);
        }
        if new_in_scope.is_empty() {
            debug!("No new comparisons for {}", scope);
            return self.store.load_current_ratings(scope);
        }

        let current = self.store.load_current_ratings(scope)?;
        let logged = self.store.load_comparisons(scope)?.len();
        let applied: u64 = current.values().map(|r| u64::from(r.races_count)).sum();
        let expected = 2 * logged.saturating_sub(new_in_scope.len()) as u64;
        if applied != expected {
            warn!(
                "Ratings for {} reflect {} athlete-races but the log implies {}, replaying",
                scope, applied, expected
            );
            return self.fall_back_to_replay(scope);
        }

        let calculated_at = current_timestamp();
        match self
            .elo
            .apply_incremental(&current, scope.side, &new_in_scope, calculated_at)?
        {
            IncrementalUpdate::Applied(ratings) => {
                self.store.save_ratings(scope, ratings.clone())?;

                let elapsed = timer.stop();
                self.update_stats(|stats| stats.incremental_updates += 1);
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_recalculation(Algorithm::Elo, scope, true, ratings.len(), elapsed);
                }
                info!(
                    "Applied {} new comparisons to {} incrementally",
                    new_in_scope.len(),
                    scope
                );
                Ok(ratings)
            }
            IncrementalUpdate::OutOfOrder {
                latest_applied,
                first_new,
            } => {
                warn!(
                    "New comparison at {} (session {}) orders before applied comparison at {} (session {}) in {}, replaying",
                    first_new.timestamp,
                    first_new.session_id,
                    latest_applied.timestamp,
                    latest_applied.session_id,
                    scope
                );
                self.fall_back_to_replay(scope)
            }
        }
    }

    fn fall_back_to_replay(&self, scope: &RatingScope) -> Result<RatingMap> {
        self.update_stats(|stats| stats.incremental_fallbacks += 1);
        if let Some(metrics) = &self.metrics_collector {
            metrics.record_incremental_fallback();
        }
        self.recalculate(scope, Algorithm::Elo)
    }

    /// Extract a session and store its comparisons in place of any previous
    /// version of the session, without touching ratings
    ///
    /// For bulk imports followed by one recompute per scope. Every scope the
    /// session touches is marked stale until it is next recomputed in full.
    pub fn import_session(&self, session: &SeatRaceSession) -> Result<Extraction> {
        let (extraction, previous) = self.store_session(session)?;

        let touched = touched_sides(&previous, &extraction.comparisons);
        let mut stale = self
            .stale_scopes
            .write()
            .map_err(|_| EngineError::InternalError {
                message: "Failed to acquire stale scopes write lock".to_string(),
            })?;
        stale.extend(
            RatingScope::all_scopes()
                .into_iter()
                .filter(|scope| scope_touched(scope, &touched)),
        );

        Ok(extraction)
    }

    fn is_stale(&self, scope: &RatingScope) -> Result<bool> {
        let stale = self
            .stale_scopes
            .read()
            .map_err(|_| EngineError::InternalError {
                message: "Failed to acquire stale scopes read lock".to_string(),
            })?;
        Ok(stale.contains(scope))
    }

    fn mark_fresh(&self, scope: &RatingScope) -> Result<()> {
        let mut stale = self
            .stale_scopes
            .write()
            .map_err(|_| EngineError::InternalError {
                message: "Failed to acquire stale scopes write lock".to_string(),
            })?;
        stale.remove(scope);
        Ok(())
    }

    fn store_session(&self, session: &SeatRaceSession) -> Result<(Extraction, Vec<Comparison>)> {
        let extraction = self.extractor.extract(session);
        if let Some(metrics) = &self.metrics_collector {
            metrics.record_extraction(
                extraction.comparisons.iter().map(|c| c.side),
                extraction.excluded.iter().map(|e| &e.reason),
            );
        }

        let previous = self
            .store
            .replace_session_comparisons(session.id, extraction.comparisons.clone())?;
        Ok((extraction, previous))
    }

    /// Extract a session's comparisons, store them in place of any previous
    /// version of the session, and update every scope the change touches
    ///
    /// A first recording updates Elo incrementally; a correction of an
    /// already recorded session replays every touched scope.
    pub fn record_session(&self, session: &SeatRaceSession) -> Result<SessionRecord> {
        let (extraction, previous) = self.store_session(session)?;
        let correction = !previous.is_empty();

        let touched = touched_sides(&previous, &extraction.comparisons);

        let mut updated_scopes = Vec::new();
        if !touched.is_empty() {
            for scope in RatingScope::all_scopes() {
                if !scope_touched(&scope, &touched) {
                    continue;
                }

                if correction {
                    self.recalculate_scope(&scope)?;
                } else {
                    self.apply_new_comparisons(&scope, &extraction.comparisons)?;
                }
                updated_scopes.push(scope);
            }
        }

        self.update_stats(|stats| stats.sessions_recorded += 1);
        info!(
            "Recorded session {} ({}): {} comparisons, {} scopes updated",
            session.id,
            session.name,
            extraction.comparisons.len(),
            updated_scopes.len()
        );

        Ok(SessionRecord {
            session_id: session.id,
            extraction,
            replaced_comparisons: previous.len(),
            updated_scopes,
        })
    }

    /// Last fitted Bradley-Terry model for a scope
    pub fn model(&self, scope: &RatingScope) -> Result<Option<Arc<BradleyTerryModel>>> {
        let models = self
            .models
            .read()
            .map_err(|_| EngineError::InternalError {
                message: "Failed to acquire models read lock".to_string(),
            })?;
        Ok(models.get(scope).cloned())
    }

    fn cache_model(&self, scope: RatingScope, model: BradleyTerryModel) -> Result<()> {
        let mut models = self
            .models
            .write()
            .map_err(|_| EngineError::InternalError {
                message: "Failed to acquire models write lock".to_string(),
            })?;
        models.insert(scope, Arc::new(model));
        Ok(())
    }

    fn fitted_model(&self, scope: &RatingScope) -> Result<Option<Arc<BradleyTerryModel>>> {
        if scope.rating_type != RatingType::BradleyTerry {
            return Err(EngineError::InvalidScope {
                reason: format!("win probabilities need a Bradley-Terry scope, got {}", scope),
            }
            .into());
        }
        self.model(scope)
    }

    /// `P(athlete_a beats athlete_b)` from the scope's last fitted model
    pub fn pairwise_win_probability(
        &self,
        athlete_a: &str,
        athlete_b: &str,
        scope: &RatingScope,
    ) -> Result<WinProbability> {
        let answer = match self.fitted_model(scope)? {
            Some(model) => model.win_probability(athlete_a, athlete_b),
            None => {
                debug!("No fitted model for {}", scope);
                WinProbability::InsufficientData
            }
        };

        if let Some(metrics) = &self.metrics_collector {
            metrics.record_win_probability_query(&answer);
        }
        Ok(answer)
    }

    /// Heatmap rows: entry `[i][j]` is `P(athletes[i] beats athletes[j])`
    pub fn win_probability_matrix(
        &self,
        athletes: &[AthleteId],
        scope: &RatingScope,
    ) -> Result<Vec<Vec<WinProbability>>> {
        let matrix = match self.fitted_model(scope)? {
            Some(model) => model.probability_matrix(athletes),
            None => vec![vec![WinProbability::InsufficientData; athletes.len()]; athletes.len()],
        };
        Ok(matrix)
    }

    /// Current ratings of a scope ordered for display
    pub fn rankings(&self, scope: &RatingScope) -> Result<Vec<RankedAthlete>> {
        let ratings = self.store.load_current_ratings(scope)?;
        Ok(rank_ratings(&ratings))
    }

    /// Every stored rating of one athlete across the scopes their side
    /// normally rows in, Elo scopes first
    pub fn athlete_ratings(
        &self,
        athlete_id: &str,
        athlete_side: AthleteSide,
    ) -> Result<Vec<AthleteRating>> {
        let mut rows = Vec::new();
        for rating_type in [RatingType::SeatRaceElo, RatingType::BradleyTerry] {
            for side in athlete_side.scope_sides() {
                let scope = RatingScope::new(rating_type, side);
                if let Some(rating) = self.store.load_current_ratings(&scope)?.remove(athlete_id) {
                    rows.push(rating);
                }
            }
        }
        Ok(rows)
    }

    /// Get engine statistics
    pub fn stats(&self) -> Result<EngineStats> {
        let stats = self.stats.read().map_err(|_| EngineError::InternalError {
            message: "Failed to acquire stats read lock".to_string(),
        })?;
        Ok(stats.clone())
    }

    fn update_stats(&self, update: impl FnOnce(&mut EngineStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

/// Sides holding any of the given comparisons
fn touched_sides(previous: &[Comparison], current: &[Comparison]) -> BTreeSet<ScopeSide> {
    previous
        .iter()
        .chain(current)
        .map(|c| ScopeSide::from(c.side))
        .collect()
}

/// `All` is touched by any comparison, a side scope only by its own
fn scope_touched(scope: &RatingScope, touched: &BTreeSet<ScopeSide>) -> bool {
    !touched.is_empty() && (scope.side == ScopeSide::All || touched.contains(&scope.side))
}
