//! Replay ordering and scope filtering for comparison histories

use crate::types::{AthleteId, Comparison, ScopeSide};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Total replay order: timestamp, then `(session_id, piece_index)`, then the
/// remaining key fields so equal instants never depend on input order
pub fn replay_order(a: &Comparison, b: &Comparison) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.session_id.cmp(&b.session_id))
        .then_with(|| a.piece_index.cmp(&b.piece_index))
        .then_with(|| a.reference_piece_index.cmp(&b.reference_piece_index))
        .then_with(|| a.athlete_a.cmp(&b.athlete_a))
        .then_with(|| a.athlete_b.cmp(&b.athlete_b))
}

/// Sort comparisons into replay order in place
pub fn sort_chronologically(comparisons: &mut [Comparison]) {
    comparisons.sort_by(replay_order);
}

/// Comparisons belonging to a scope side, in replay order
pub fn scoped_history<I>(comparisons: I, side: ScopeSide) -> Vec<Comparison>
where
    I: IntoIterator<Item = Comparison>,
{
    let mut history: Vec<Comparison> = comparisons
        .into_iter()
        .filter(|comparison| side.includes(comparison.side))
        .collect();
    sort_chronologically(&mut history);
    history
}

/// Number of comparisons each athlete appears in
pub fn races_per_athlete(comparisons: &[Comparison]) -> BTreeMap<AthleteId, u32> {
    let mut counts = BTreeMap::new();
    for comparison in comparisons {
        *counts.entry(comparison.athlete_a.clone()).or_insert(0) += 1;
        *counts.entry(comparison.athlete_b.clone()).or_insert(0) += 1;
    }
    counts
}
