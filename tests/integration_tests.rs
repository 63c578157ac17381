//! Integration tests for the seat-race rating engine
//!
//! These tests drive the engine end to end, from raw sessions through
//! extraction, both rating algorithms and the rating store:
//! - Worked Elo, Bradley-Terry and ambiguous-swap scenarios
//! - Session corrections and incremental updates
//! - Store interactions against a mock store
//! - Independent scopes recomputed in parallel

mod fixtures;

use fixtures::{comparison, double_swap_session, pair_swap, MockStore};
use mockall::predicate::eq;
use seat_race_engine::comparison::{ComparisonExtractor, ExclusionReason};
use seat_race_engine::config::EngineSettings;
use seat_race_engine::metrics::MetricsCollector;
use seat_race_engine::rating::{InMemoryRatingStore, RatingStore};
use seat_race_engine::types::{
    Algorithm, RatingDetails, RatingScope, RatingType, ScopeSide, Side, WinProbability,
};
use seat_race_engine::RatingEngine;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Engine over a fresh in-memory store
fn create_test_engine() -> (RatingEngine, Arc<InMemoryRatingStore>) {
    let store = Arc::new(InMemoryRatingStore::new());
    let engine = RatingEngine::new(EngineSettings::default(), store.clone()).unwrap();
    (engine, store)
}

#[test]
fn test_single_win_moves_both_athletes_sixteen_points() {
    let (engine, store) = create_test_engine();

    let record = engine
        .record_session(&pair_swap(1, 0, "alice", "beth", Side::Port))
        .unwrap();
    assert_eq!(record.extraction.comparisons.len(), 1);

    for side in [ScopeSide::All, ScopeSide::Port] {
        let ratings = store.load_current_ratings(&RatingScope::elo(side)).unwrap();
        assert_eq!(ratings["alice"].rating_value, 1016.0);
        assert_eq!(ratings["beth"].rating_value, 984.0);
        assert_eq!(ratings["alice"].races_count, 1);
    }

    // Nothing raced on starboard
    assert!(store
        .load_current_ratings(&RatingScope::elo(ScopeSide::Starboard))
        .unwrap()
        .is_empty());
    assert!(!record
        .updated_scopes
        .contains(&RatingScope::elo(ScopeSide::Starboard)));
}

#[test]
fn test_transitive_results_rank_a_over_b_over_c() {
    let (engine, _) = create_test_engine();

    engine.record_session(&pair_swap(1, 0, "a", "b", Side::Starboard)).unwrap();
    engine.record_session(&pair_swap(2, 1, "b", "c", Side::Starboard)).unwrap();
    engine.record_session(&pair_swap(3, 2, "a", "c", Side::Starboard)).unwrap();

    let scope = RatingScope::bradley_terry(ScopeSide::Starboard);
    let rankings = engine.rankings(&scope).unwrap();
    let order: Vec<&str> = rankings.iter().map(|r| r.athlete_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);

    let p = |x: &str, y: &str| {
        engine
            .pairwise_win_probability(x, y, &scope)
            .unwrap()
            .value()
            .unwrap()
    };
    let (p_ab, p_bc, p_ac) = (p("a", "b"), p("b", "c"), p("a", "c"));
    assert!(p_ac > p_ab);
    assert!(p_ac > p_bc);
}

#[test]
fn test_double_seat_change_yields_no_comparison() {
    let (engine, store) = create_test_engine();

    let record = engine.record_session(&double_swap_session(9)).unwrap();

    assert!(record.extraction.comparisons.is_empty());
    assert_eq!(record.extraction.excluded.len(), 1);
    assert_eq!(
        record.extraction.excluded[0].reason,
        ExclusionReason::MultipleSeatChanges
    );
    assert!(record.updated_scopes.is_empty());
    assert!(store.rated_scopes().unwrap().is_empty());
}

#[test]
fn test_extraction_is_deterministic() {
    let extractor = ComparisonExtractor::default();
    let session = pair_swap(4, 3, "kim", "lee", Side::Port);

    let first = extractor.extract(&session);
    let second = extractor.extract(&session);
    assert_eq!(first.comparisons, second.comparisons);
    assert_eq!(first.excluded, second.excluded);
}

#[test]
fn test_session_correction_replays_from_scratch() {
    let (engine, store) = create_test_engine();
    engine.record_session(&pair_swap(1, 0, "x", "y", Side::Port)).unwrap();

    // The coach swaps the finish order after review
    let corrected = pair_swap(1, 0, "y", "x", Side::Port);
    let record = engine.record_session(&corrected).unwrap();
    assert_eq!(record.replaced_comparisons, 1);

    let ratings = store
        .load_current_ratings(&RatingScope::elo(ScopeSide::Port))
        .unwrap();
    assert_eq!(ratings["y"].rating_value, 1016.0);
    assert_eq!(ratings["x"].rating_value, 984.0);
    assert_eq!(ratings["x"].races_count, 1);
    assert!(engine.stats().unwrap().full_recalculations > 0);
}

#[test]
fn test_new_sessions_update_elo_incrementally() {
    let (engine, _) = create_test_engine();

    engine.record_session(&pair_swap(1, 0, "a", "b", Side::Port)).unwrap();
    engine.record_session(&pair_swap(2, 1, "b", "c", Side::Port)).unwrap();
    engine.record_session(&pair_swap(3, 2, "c", "a", Side::Port)).unwrap();

    let scope = RatingScope::elo(ScopeSide::Port);
    let incremental: BTreeMap<_, _> = engine
        .rankings(&scope)
        .unwrap()
        .into_iter()
        .map(|r| (r.athlete_id, r.rating_value))
        .collect();

    let full = engine.recalculate(&scope, Algorithm::Elo).unwrap();
    for (id, rating) in &full {
        assert_eq!(incremental[id], rating.rating_value);
    }

    let stats = engine.stats().unwrap();
    assert!(stats.incremental_updates >= 3);
    assert_eq!(stats.incremental_fallbacks, 0);
}

#[test]
fn test_late_recorded_session_falls_back_to_replay() {
    let (engine, store) = create_test_engine();

    engine.record_session(&pair_swap(1, 5, "a", "b", Side::Port)).unwrap();
    // Raced earlier than the session already applied
    engine.record_session(&pair_swap(2, 1, "b", "a", Side::Port)).unwrap();

    assert!(engine.stats().unwrap().incremental_fallbacks > 0);

    let scope = RatingScope::elo(ScopeSide::Port);
    let stored = store.load_current_ratings(&scope).unwrap();
    let replayed = engine.recalculate(&scope, Algorithm::Elo).unwrap();
    assert_eq!(stored["a"].rating_value, replayed["a"].rating_value);
    assert_eq!(stored["a"].races_count, 2);
}

#[test]
fn test_imported_correction_forces_replay_on_next_session() {
    let (engine, store) = create_test_engine();
    let scope = RatingScope::elo(ScopeSide::Port);

    engine.record_session(&pair_swap(1, 0, "x", "y", Side::Port)).unwrap();
    // Corrected result stored without a recompute
    engine.import_session(&pair_swap(1, 0, "y", "x", Side::Port)).unwrap();
    engine.record_session(&pair_swap(2, 1, "x", "z", Side::Port)).unwrap();

    let stored = store.load_current_ratings(&scope).unwrap();
    let replayed = engine.recalculate(&scope, Algorithm::Elo).unwrap();
    for (id, rating) in &replayed {
        assert_eq!(stored[id].rating_value, rating.rating_value);
        assert_eq!(stored[id].races_count, rating.races_count);
    }
    assert!(stored["y"].rating_value > 1000.0);
    assert!(engine.stats().unwrap().incremental_fallbacks > 0);

    // Once replayed, later sessions go back to the incremental path
    let before = engine.stats().unwrap();
    engine.record_session(&pair_swap(3, 2, "z", "y", Side::Port)).unwrap();
    let after = engine.stats().unwrap();
    assert_eq!(after.incremental_fallbacks, before.incremental_fallbacks);
    assert!(after.incremental_updates > before.incremental_updates);
}

#[test]
fn test_coxswain_swap_rates_cox_and_whole_squad_only() {
    let (engine, store) = create_test_engine();

    let record = engine
        .record_session(&pair_swap(1, 0, "cora", "dana", Side::Coxswain))
        .unwrap();
    assert_eq!(record.extraction.comparisons[0].side, Side::Coxswain);

    for side in [ScopeSide::Coxswain, ScopeSide::All] {
        let ratings = store.load_current_ratings(&RatingScope::elo(side)).unwrap();
        assert_eq!(ratings["cora"].rating_value, 1016.0);
        assert_eq!(ratings["dana"].rating_value, 984.0);
    }
    for side in [ScopeSide::Port, ScopeSide::Starboard] {
        assert!(store
            .load_current_ratings(&RatingScope::elo(side))
            .unwrap()
            .is_empty());
    }
    assert!(!record.updated_scopes.contains(&RatingScope::elo(ScopeSide::Port)));
}

#[test]
fn test_disconnected_groups_report_insufficient_data() {
    let (engine, _) = create_test_engine();

    engine.record_session(&pair_swap(1, 0, "a", "b", Side::Port)).unwrap();
    engine.record_session(&pair_swap(2, 1, "x", "y", Side::Port)).unwrap();

    let scope = RatingScope::bradley_terry(ScopeSide::Port);
    assert_eq!(
        engine.pairwise_win_probability("a", "x", &scope).unwrap(),
        WinProbability::InsufficientData
    );
    assert!(!engine
        .pairwise_win_probability("a", "b", &scope)
        .unwrap()
        .is_insufficient());

    let ratings = engine.recalculate_scope(&scope).unwrap();
    match (&ratings["a"].details, &ratings["x"].details) {
        (
            RatingDetails::BradleyTerry { component: ca, .. },
            RatingDetails::BradleyTerry { component: cx, .. },
        ) => assert_ne!(ca, cx),
        _ => panic!("expected Bradley-Terry rows"),
    }
}

#[test]
fn test_metrics_follow_engine_activity() {
    let store = Arc::new(InMemoryRatingStore::new());
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let engine =
        RatingEngine::with_metrics(EngineSettings::default(), store, metrics.clone()).unwrap();

    engine.record_session(&pair_swap(1, 0, "a", "b", Side::Port)).unwrap();
    engine.record_session(&double_swap_session(2)).unwrap();
    engine
        .pairwise_win_probability("a", "zed", &RatingScope::bradley_terry(ScopeSide::Port))
        .unwrap();

    let extraction = metrics.extraction();
    assert_eq!(extraction.sessions_processed_total.get(), 2);
    assert_eq!(
        extraction
            .excluded_pairs_total
            .with_label_values(&["multiple_seat_changes"])
            .get(),
        1
    );
    assert!(metrics.render().unwrap().contains("seat_race_recalculations_total"));
}

#[test]
fn test_recalculate_reads_and_replaces_scope_through_store() {
    let scope = RatingScope::elo(ScopeSide::Port);
    let history = vec![
        comparison("a", "b", Some("a"), 0),
        comparison("b", "c", None, 5),
    ];

    let mut store = MockStore::new();
    store
        .expect_load_comparisons()
        .with(eq(scope))
        .times(1)
        .returning(move |_| Ok(history.clone()));
    store
        .expect_save_ratings()
        .withf(move |saved_scope, ratings| {
            *saved_scope == scope
                && ratings.len() == 3
                && ratings.values().all(|r| r.scope() == scope)
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let engine = RatingEngine::new(EngineSettings::default(), Arc::new(store)).unwrap();
    let ratings = engine.recalculate(&scope, Algorithm::Elo).unwrap();
    assert_eq!(ratings["b"].races_count, 2);
}

#[test]
fn test_store_failure_propagates() {
    let scope = RatingScope::bradley_terry(ScopeSide::All);

    let mut store = MockStore::new();
    store
        .expect_load_comparisons()
        .returning(|_| Ok(vec![comparison("a", "b", Some("b"), 0)]));
    store
        .expect_save_ratings()
        .returning(|_, _| Err(anyhow::anyhow!("disk full")));

    let engine = RatingEngine::new(EngineSettings::default(), Arc::new(store)).unwrap();
    let result = engine.recalculate(&scope, Algorithm::BradleyTerry);
    assert!(result.is_err());
}

#[test]
fn test_mismatched_algorithm_never_touches_store() {
    // No expectations: any store call would panic
    let store = MockStore::new();
    let engine = RatingEngine::new(EngineSettings::default(), Arc::new(store)).unwrap();

    let result = engine.recalculate(&RatingScope::bradley_terry(ScopeSide::Port), Algorithm::Elo);
    assert!(result.is_err());
}

#[test]
fn test_unknown_rating_type_is_rejected() {
    assert!("".parse::<RatingType>().is_err());
    assert!("glicko".parse::<RatingType>().is_err());
}

#[tokio::test]
async fn test_independent_scopes_recalculate_in_parallel() {
    let (engine, store) = create_test_engine();

    for (id, (winner, loser, side)) in [
        ("a", "b", Side::Port),
        ("b", "c", Side::Port),
        ("s", "t", Side::Starboard),
        ("t", "u", Side::Starboard),
        ("c", "a", Side::Port),
    ]
    .into_iter()
    .enumerate()
    {
        engine
            .import_session(&pair_swap(id as u128 + 1, id as i64, winner, loser, side))
            .unwrap();
    }

    let handles: Vec<_> = RatingScope::all_scopes()
        .into_iter()
        .map(|scope| {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || (scope, engine.recalculate_scope(&scope).unwrap()))
        })
        .collect();

    let mut parallel = BTreeMap::new();
    for handle in handles {
        let (scope, ratings) = handle.await.unwrap();
        parallel.insert(scope, ratings);
    }

    for (scope, ratings) in &parallel {
        assert_eq!(&store.load_current_ratings(scope).unwrap(), ratings);

        let sequential = engine.recalculate_scope(scope).unwrap();
        for (id, rating) in ratings {
            assert_eq!(rating.rating_value, sequential[id].rating_value);
            assert_eq!(rating.confidence_score, sequential[id].confidence_score);
        }
    }

    assert_eq!(parallel[&RatingScope::elo(ScopeSide::Port)].len(), 3);
    assert_eq!(parallel[&RatingScope::elo(ScopeSide::Starboard)].len(), 3);
    assert_eq!(parallel[&RatingScope::elo(ScopeSide::All)].len(), 6);
}
