//! Rating store interface and in-memory implementation
//!
//! The comparison log is the source of truth; rating rows are a materialized
//! view that is replaced wholesale per scope.

use crate::comparison::ordering::scoped_history;
use crate::error::EngineError;
use crate::types::{Comparison, RatingMap, RatingScope, SessionId};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Trait for the persistence the host provides to the engine
pub trait RatingStore: Send + Sync {
    /// Comparisons belonging to the scope's side, in replay order
    fn load_comparisons(&self, scope: &RatingScope) -> crate::error::Result<Vec<Comparison>>;

    /// Current materialized ratings for the scope (empty if never computed)
    fn load_current_ratings(&self, scope: &RatingScope) -> crate::error::Result<RatingMap>;

    /// Atomically replace every rating row in the scope
    fn save_ratings(&self, scope: &RatingScope, ratings: RatingMap) -> crate::error::Result<()>;

    /// Replace a session's comparisons, returning the ones previously stored
    fn replace_session_comparisons(
        &self,
        session_id: SessionId,
        comparisons: Vec<Comparison>,
    ) -> crate::error::Result<Vec<Comparison>>;
}

/// Reject rows that do not belong to the scope they are being written to
pub fn validate_rows(scope: &RatingScope, ratings: &RatingMap) -> crate::error::Result<()> {
    for (athlete_id, rating) in ratings {
        if *athlete_id != rating.athlete_id {
            return Err(EngineError::InvalidScope {
                reason: format!(
                    "row keyed {} holds rating for {}",
                    athlete_id, rating.athlete_id
                ),
            }
            .into());
        }

        if rating.scope() != *scope {
            return Err(EngineError::InvalidScope {
                reason: format!(
                    "rating for {} belongs to {}, not {}",
                    athlete_id,
                    rating.scope(),
                    scope
                ),
            }
            .into());
        }
    }

    Ok(())
}

fn lock_poisoned(what: &str) -> anyhow::Error {
    EngineError::StorageError {
        message: format!("Failed to acquire {} lock", what),
    }
    .into()
}

/// In-memory rating store implementation
#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    comparisons: RwLock<BTreeMap<SessionId, Vec<Comparison>>>,
    ratings: RwLock<HashMap<RatingScope, RatingMap>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total comparisons across all sessions
    pub fn comparison_count(&self) -> crate::error::Result<usize> {
        let comparisons = self
            .comparisons
            .read()
            .map_err(|_| lock_poisoned("comparisons read"))?;
        Ok(comparisons.values().map(Vec::len).sum())
    }

    /// Scopes that currently hold rating rows
    pub fn rated_scopes(&self) -> crate::error::Result<Vec<RatingScope>> {
        let ratings = self.ratings.read().map_err(|_| lock_poisoned("ratings read"))?;
        let mut scopes: Vec<RatingScope> = ratings
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(scope, _)| *scope)
            .collect();
        scopes.sort();
        Ok(scopes)
    }
}

impl RatingStore for InMemoryRatingStore {
    fn load_comparisons(&self, scope: &RatingScope) -> crate::error::Result<Vec<Comparison>> {
        let comparisons = self
            .comparisons
            .read()
            .map_err(|_| lock_poisoned("comparisons read"))?;

        Ok(scoped_history(
            comparisons.values().flatten().cloned(),
            scope.side,
        ))
    }

    fn load_current_ratings(&self, scope: &RatingScope) -> crate::error::Result<RatingMap> {
        let ratings = self.ratings.read().map_err(|_| lock_poisoned("ratings read"))?;
        Ok(ratings.get(scope).cloned().unwrap_or_default())
    }

    fn save_ratings(&self, scope: &RatingScope, ratings: RatingMap) -> crate::error::Result<()> {
        validate_rows(scope, &ratings)?;

        let mut stored = self
            .ratings
            .write()
            .map_err(|_| lock_poisoned("ratings write"))?;
        stored.insert(*scope, ratings);
        Ok(())
    }

    fn replace_session_comparisons(
        &self,
        session_id: SessionId,
        comparisons: Vec<Comparison>,
    ) -> crate::error::Result<Vec<Comparison>> {
        if let Some(foreign) = comparisons.iter().find(|c| c.session_id != session_id) {
            return Err(EngineError::InvalidSession {
                session_id: session_id.to_string(),
                reason: format!("comparison from session {} in replacement set", foreign.session_id),
            }
            .into());
        }

        let mut stored = self
            .comparisons
            .write()
            .map_err(|_| lock_poisoned("comparisons write"))?;

        let previous = if comparisons.is_empty() {
            stored.remove(&session_id)
        } else {
            stored.insert(session_id, comparisons)
        };
        Ok(previous.unwrap_or_default())
    }
}
