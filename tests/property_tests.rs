//! Property tests for the rating algorithms

mod fixtures;

use chrono::Duration;
use fixtures::day;
use proptest::prelude::*;
use seat_race_engine::comparison::{races_per_athlete, sort_chronologically};
use seat_race_engine::config::{BradleyTerryConfig, EloConfig};
use seat_race_engine::rating::{
    BradleyTerryEstimator, ConfidenceModel, EloRatingCalculator, IncrementalUpdate,
};
use seat_race_engine::types::{Comparison, ScopeSide, Side};
use skillratings::Outcomes;
use uuid::Uuid;

const POOL: [&str; 6] = ["ana", "ben", "cai", "dov", "eli", "fay"];

fn elo() -> EloRatingCalculator {
    EloRatingCalculator::new(EloConfig::default(), ConfidenceModel::default()).unwrap()
}

fn bradley_terry() -> BradleyTerryEstimator {
    BradleyTerryEstimator::new(BradleyTerryConfig::default(), ConfidenceModel::default()).unwrap()
}

fn comparison_from(
    pool: &[&str],
    (i, offset, outcome, minute, session, piece): (usize, usize, u8, i64, u128, u32),
) -> Comparison {
    let first = pool[i % pool.len()];
    let second = pool[(i + 1 + offset % (pool.len() - 1)) % pool.len()];
    let (a, b) = if first < second { (first, second) } else { (second, first) };

    Comparison {
        athlete_a: a.to_string(),
        athlete_b: b.to_string(),
        winner_id: match outcome {
            0 => Some(a.to_string()),
            1 => Some(b.to_string()),
            _ => None,
        },
        margin_seconds: if outcome < 2 { 1.0 } else { 0.0 },
        side: if piece % 2 == 0 { Side::Port } else { Side::Starboard },
        session_id: Uuid::from_u128(session),
        piece_index: piece,
        reference_piece_index: 0,
        timestamp: day(0) + Duration::minutes(minute),
    }
}

fn raw_comparison() -> impl Strategy<Value = (usize, usize, u8, i64, u128, u32)> {
    (0usize..6, 0usize..5, 0u8..3, 0i64..600, 0u128..4, 1u32..5)
}

/// Comparisons over the whole pool, in replay order with unique keys
fn history(max_len: usize) -> impl Strategy<Value = Vec<Comparison>> {
    prop::collection::vec(raw_comparison(), 1..max_len).prop_map(|raw| {
        let mut comparisons: Vec<Comparison> =
            raw.into_iter().map(|r| comparison_from(&POOL, r)).collect();
        sort_chronologically(&mut comparisons);
        comparisons.dedup_by_key(|c| c.key());
        comparisons
    })
}

fn outcome() -> impl Strategy<Value = Outcomes> {
    prop_oneof![Just(Outcomes::WIN), Just(Outcomes::LOSS), Just(Outcomes::DRAW)]
}

proptest! {
    #[test]
    fn prop_elo_replay_is_deterministic(history in history(40)) {
        let at = day(30);
        let mut shuffled = history.clone();
        shuffled.reverse();

        let first = elo().replay(ScopeSide::All, &history, at).unwrap();
        let second = elo().replay(ScopeSide::All, &shuffled, at).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_incremental_matches_full_replay(history in history(40), split in 0usize..40) {
        let at = day(30);
        let split = split.min(history.len());
        let calculator = elo();

        let full = calculator.replay(ScopeSide::All, &history, at).unwrap();
        let earlier = calculator.replay(ScopeSide::All, &history[..split], at).unwrap();

        match calculator
            .apply_incremental(&earlier, ScopeSide::All, &history[split..], at)
            .unwrap()
        {
            IncrementalUpdate::Applied(incremental) => prop_assert_eq!(incremental, full),
            IncrementalUpdate::OutOfOrder { .. } => prop_assert!(false, "ordered input rejected"),
        }
    }

    #[test]
    fn prop_single_elo_update_is_zero_sum(
        rating_a in 600.0f64..1400.0,
        rating_b in 600.0f64..1400.0,
        races_a in 0u32..60,
        races_b in 0u32..60,
        outcome_a in outcome(),
    ) {
        let update = elo().update_for(rating_a, races_a, rating_b, races_b, outcome_a);
        prop_assert_eq!(update.delta_a, -update.delta_b);
    }

    #[test]
    fn prop_elo_confidence_is_monotonic(n in 0u32..500, extra in 0u32..500) {
        let model = ConfidenceModel::default();
        let fewer = model.elo_confidence(n);
        let more = model.elo_confidence(n + extra);
        prop_assert!(fewer <= more);
        prop_assert!((0.0..=1.0).contains(&more));
    }

    #[test]
    fn prop_races_count_matches_history(history in history(40)) {
        let at = day(30);
        let counts = races_per_athlete(&history);

        let elo_ratings = elo().replay(ScopeSide::All, &history, at).unwrap();
        let bt_ratings = bradley_terry().fit(ScopeSide::All, &history, at).ratings;

        prop_assert_eq!(elo_ratings.len(), counts.len());
        prop_assert_eq!(bt_ratings.len(), counts.len());
        for (id, count) in &counts {
            prop_assert_eq!(elo_ratings[id].races_count, *count);
            prop_assert_eq!(bt_ratings[id].races_count, *count);
            prop_assert!((0.0..=1.0).contains(&bt_ratings[id].confidence_score));
            prop_assert!(bt_ratings[id].rating_value.is_finite());
        }
    }

    #[test]
    fn prop_bradley_terry_is_scale_invariant(history in history(30), factor in 0.01f64..100.0) {
        let fit = bradley_terry().fit(ScopeSide::All, &history, day(30));
        let scaled = fit.model.with_scaled_strengths(factor);

        for a in POOL {
            for b in POOL {
                match (fit.model.win_probability(a, b).value(), scaled.win_probability(a, b).value()) {
                    (Some(p), Some(q)) => prop_assert!((p - q).abs() < 1e-9),
                    (None, None) => {}
                    _ => prop_assert!(false, "availability changed under scaling"),
                }
            }
        }
    }

    #[test]
    fn prop_disconnected_groups_never_get_a_number(
        left in prop::collection::vec(raw_comparison(), 1..15),
        right in prop::collection::vec(raw_comparison(), 1..15),
    ) {
        let left_pool = ["ana", "ben", "cai"];
        let right_pool = ["xia", "yan", "zoe"];
        let history: Vec<Comparison> = left
            .into_iter()
            .map(|r| comparison_from(&left_pool, r))
            .chain(right.into_iter().map(|r| comparison_from(&right_pool, r)))
            .collect();

        let fit = bradley_terry().fit(ScopeSide::All, &history, day(30));
        for a in left_pool {
            for b in right_pool {
                prop_assert!(fit.model.win_probability(a, b).is_insufficient());
                prop_assert!(fit.model.win_probability(b, a).is_insufficient());
            }
        }
    }
}
