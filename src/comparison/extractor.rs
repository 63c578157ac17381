//! Seat swap detection
//!
//! Turns a recorded seat racing session into atomic pairwise comparisons.
//! Two pieces yield a comparison only when exactly two boats changed, each
//! in the same single seat, with the two occupants exchanged. Anything
//! noisier is excluded and reported rather than guessed at.

use crate::config::ExtractionConfig;
use crate::types::{
    AthleteId, BoatEntry, Comparison, Piece, SeatRaceSession, SeatRole, SessionId,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Why a pair of pieces produced no comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// More than one seat changed between the pieces
    MultipleSeatChanges,
    /// The pieces raced a different number of boats
    BoatCountMismatch,
    /// A swapped boat has no usable time or place in one of the pieces
    MissingResult,
    /// An athlete was seated twice or a seat role repeated within a boat
    MalformedPiece,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::MultipleSeatChanges => "multiple_seat_changes",
            ExclusionReason::BoatCountMismatch => "boat_count_mismatch",
            ExclusionReason::MissingResult => "missing_result",
            ExclusionReason::MalformedPiece => "malformed_piece",
        }
    }
}

/// A pair of pieces that was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedPair {
    pub session_id: SessionId,
    pub reference_piece: u32,
    pub piece: u32,
    pub reason: ExclusionReason,
}

/// Output of extracting one or more sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub comparisons: Vec<Comparison>,
    pub excluded: Vec<ExcludedPair>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }
}

/// A boat's seats keyed by role, borrowed from the session
struct Lineup<'a> {
    boat: &'a BoatEntry,
    seats: BTreeMap<SeatRole, &'a str>,
}

/// A clean swap: `moved_out` sat at `role` in boat 1 during the reference
/// piece and in boat 2 during the later piece; `moved_in` the reverse
struct Swap<'a> {
    role: SeatRole,
    moved_out: &'a str,
    moved_in: &'a str,
    reference: (&'a BoatEntry, &'a BoatEntry),
    later: (&'a BoatEntry, &'a BoatEntry),
}

impl Swap<'_> {
    fn keeps_boat_names(&self) -> bool {
        self.reference.0.name == self.later.0.name && self.reference.1.name == self.later.1.name
    }
}

enum PairOutcome {
    NoChange,
    Swap(SwapOutcome),
}

struct SwapOutcome {
    athlete_a: AthleteId,
    athlete_b: AthleteId,
    winner_id: Option<AthleteId>,
    margin_seconds: f64,
    role: SeatRole,
}

/// Extracts comparisons from seat race sessions
#[derive(Debug, Clone, Default)]
pub struct ComparisonExtractor {
    config: ExtractionConfig,
}

impl ComparisonExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract every clean swap comparison from one session. Pure function of
    /// the session's content.
    pub fn extract(&self, session: &SeatRaceSession) -> Extraction {
        let mut extraction = Extraction::default();

        if session.pieces.len() < 2 {
            debug!(
                "Session {} has {} piece(s), nothing to compare",
                session.id,
                session.pieces.len()
            );
            return extraction;
        }

        let mut pieces: Vec<&Piece> = session.pieces.iter().collect();
        pieces.sort_by_key(|piece| piece.index);

        let lineups: Vec<Option<Vec<Lineup>>> =
            pieces.iter().map(|&p| build_lineups(p)).collect();

        for i in 0..pieces.len() {
            for j in (i + 1)..pieces.len() {
                let (reference, later) = (pieces[i], pieces[j]);

                let outcome = match (&lineups[i], &lineups[j]) {
                    (Some(ref_lineups), Some(later_lineups)) => {
                        self.compare_pieces(reference, later, ref_lineups, later_lineups)
                    }
                    _ => Err(ExclusionReason::MalformedPiece),
                };

                match outcome {
                    Ok(PairOutcome::NoChange) => {
                        debug!(
                            "Session {} pieces {} and {} have identical lineups",
                            session.id, reference.index, later.index
                        );
                    }
                    Ok(PairOutcome::Swap(swap)) => {
                        debug!(
                            "Session {} pieces {} -> {}: {} vs {} at seat {} ({}), winner {:?}",
                            session.id,
                            reference.index,
                            later.index,
                            swap.athlete_a,
                            swap.athlete_b,
                            swap.role.seat,
                            swap.role.side,
                            swap.winner_id
                        );
                        extraction.comparisons.push(Comparison {
                            athlete_a: swap.athlete_a,
                            athlete_b: swap.athlete_b,
                            winner_id: swap.winner_id,
                            margin_seconds: swap.margin_seconds,
                            side: swap.role.side,
                            session_id: session.id,
                            piece_index: later.index,
                            reference_piece_index: reference.index,
                            timestamp: later.started_at.unwrap_or(session.raced_at),
                        });
                    }
                    Err(reason) => {
                        warn!(
                            "Session {} pieces {} and {} excluded: {}",
                            session.id,
                            reference.index,
                            later.index,
                            reason.as_str()
                        );
                        extraction.excluded.push(ExcludedPair {
                            session_id: session.id,
                            reference_piece: reference.index,
                            piece: later.index,
                            reason,
                        });
                    }
                }
            }
        }

        if extraction.comparisons.is_empty() {
            warn!(
                "Session {} produced no clean seat swaps ({} piece pairs excluded)",
                session.id,
                extraction.excluded.len()
            );
        } else {
            info!(
                "Session {}: {} comparisons extracted, {} piece pairs excluded",
                session.id,
                extraction.comparisons.len(),
                extraction.excluded.len()
            );
        }

        extraction
    }

    fn compare_pieces(
        &self,
        reference: &Piece,
        later: &Piece,
        ref_lineups: &[Lineup],
        later_lineups: &[Lineup],
    ) -> Result<PairOutcome, ExclusionReason> {
        if ref_lineups.len() != later_lineups.len() {
            return Err(ExclusionReason::BoatCountMismatch);
        }

        // Unchanged boats are controls; set them aside
        let mut later_used = vec![false; later_lineups.len()];
        let mut changed_ref = Vec::new();
        for lineup in ref_lineups {
            let twin = later_lineups
                .iter()
                .enumerate()
                .find(|(k, other)| !later_used[*k] && other.seats == lineup.seats)
                .map(|(k, _)| k);
            match twin {
                Some(k) => later_used[k] = true,
                None => changed_ref.push(lineup),
            }
        }
        let changed_later: Vec<&Lineup> = later_lineups
            .iter()
            .enumerate()
            .filter(|(k, _)| !later_used[*k])
            .map(|(_, lineup)| lineup)
            .collect();

        if changed_ref.is_empty() && changed_later.is_empty() {
            return Ok(PairOutcome::NoChange);
        }

        if changed_ref.len() != 2 || changed_later.len() != 2 {
            return Err(ExclusionReason::MultipleSeatChanges);
        }

        let candidates = [
            detect_swap(
                changed_ref[0],
                changed_ref[1],
                changed_later[0],
                changed_later[1],
            ),
            detect_swap(
                changed_ref[0],
                changed_ref[1],
                changed_later[1],
                changed_later[0],
            ),
        ];

        let mut swaps: Vec<Swap> = candidates.into_iter().flatten().collect();
        if swaps.len() == 2 {
            // Two-seat boats read as a swap under either boat pairing; only
            // the boat names can tell them apart
            swaps.retain(|swap| swap.keeps_boat_names());
        }
        let swap = match swaps.len() {
            1 => swaps.remove(0),
            _ => return Err(ExclusionReason::MultipleSeatChanges),
        };

        self.score_swap(reference, later, swap).map(PairOutcome::Swap)
    }

    fn score_swap(
        &self,
        reference: &Piece,
        later: &Piece,
        swap: Swap,
    ) -> Result<SwapOutcome, ExclusionReason> {
        let (ref_one, ref_two) = swap.reference;
        let (later_one, later_two) = swap.later;

        let (ref_scale, later_scale) = self.distance_factor(reference, later);

        // Positive means `moved_out` was worth more than `moved_in`
        let (swing, margin) = match (
            ref_one.finish_seconds,
            ref_two.finish_seconds,
            later_one.finish_seconds,
            later_two.finish_seconds,
        ) {
            (Some(r1), Some(r2), Some(l1), Some(l2)) => {
                let ref_margin = (r2 - r1) * ref_scale;
                let later_margin = (l2 - l1) * later_scale;
                let swing = ref_margin - later_margin;
                if swing.abs() <= self.config.dead_heat_seconds {
                    (Ordering::Equal, swing.abs())
                } else if swing > 0.0 {
                    (Ordering::Greater, swing.abs())
                } else {
                    (Ordering::Less, swing.abs())
                }
            }
            _ => match (ref_one.place, ref_two.place, later_one.place, later_two.place) {
                (Some(r1), Some(r2), Some(l1), Some(l2)) => {
                    // Boat one held `moved_out` in the reference piece, boat two
                    // held them in the later piece
                    let first = r2.cmp(&r1);
                    let second = l1.cmp(&l2);
                    let swing = if first == second {
                        first
                    } else {
                        Ordering::Equal
                    };
                    (swing, 0.0)
                }
                _ => return Err(ExclusionReason::MissingResult),
            },
        };

        let winner_id = match swing {
            Ordering::Greater => Some(swap.moved_out.to_string()),
            Ordering::Less => Some(swap.moved_in.to_string()),
            Ordering::Equal => None,
        };

        let (athlete_a, athlete_b) = if swap.moved_out <= swap.moved_in {
            (swap.moved_out, swap.moved_in)
        } else {
            (swap.moved_in, swap.moved_out)
        };

        Ok(SwapOutcome {
            athlete_a: athlete_a.to_string(),
            athlete_b: athlete_b.to_string(),
            winner_id,
            margin_seconds: margin,
            role: swap.role,
        })
    }

    /// Scale factors that bring each piece's margin to the normalization
    /// distance. Identity unless configured and both distances are known.
    fn distance_factor(&self, reference: &Piece, later: &Piece) -> (f64, f64) {
        match (
            self.config.normalize_to_meters,
            reference.distance_meters,
            later.distance_meters,
        ) {
            (Some(target), Some(ref_dist), Some(later_dist))
                if ref_dist > 0.0 && later_dist > 0.0 =>
            {
                (target / ref_dist, target / later_dist)
            }
            _ => (1.0, 1.0),
        }
    }
}

/// Build lineups for a piece; `None` if the piece is malformed
fn build_lineups(piece: &Piece) -> Option<Vec<Lineup<'_>>> {
    let mut seen_athletes: HashSet<&str> = HashSet::new();
    let mut lineups = Vec::with_capacity(piece.boats.len());

    for boat in &piece.boats {
        let mut seats = BTreeMap::new();
        for assignment in &boat.seats {
            if !seen_athletes.insert(assignment.athlete_id.as_str()) {
                warn!(
                    "Piece {} seats athlete {} more than once",
                    piece.index, assignment.athlete_id
                );
                return None;
            }
            if seats
                .insert(assignment.role, assignment.athlete_id.as_str())
                .is_some()
            {
                warn!(
                    "Piece {} boat '{}' repeats seat {} ({})",
                    piece.index, boat.name, assignment.role.seat, assignment.role.side
                );
                return None;
            }
        }
        lineups.push(Lineup { boat, seats });
    }

    Some(lineups)
}

/// Check whether `ref_one -> later_one` and `ref_two -> later_two` is a clean
/// single-seat exchange
fn detect_swap<'a>(
    ref_one: &Lineup<'a>,
    ref_two: &Lineup<'a>,
    later_one: &Lineup<'a>,
    later_two: &Lineup<'a>,
) -> Option<Swap<'a>> {
    let role = single_changed_seat(ref_one, later_one)?;
    if single_changed_seat(ref_two, later_two)? != role {
        return None;
    }

    let moved_out = *ref_one.seats.get(&role)?;
    let moved_in = *ref_two.seats.get(&role)?;
    if moved_out == moved_in
        || later_one.seats.get(&role) != Some(&moved_in)
        || later_two.seats.get(&role) != Some(&moved_out)
    {
        return None;
    }

    Some(Swap {
        role,
        moved_out,
        moved_in,
        reference: (ref_one.boat, ref_two.boat),
        later: (later_one.boat, later_two.boat),
    })
}

/// The one seat whose occupant differs, if the two lineups share every seat
/// role and differ in exactly one
fn single_changed_seat(before: &Lineup, after: &Lineup) -> Option<SeatRole> {
    if before.seats.len() != after.seats.len()
        || !before.seats.keys().eq(after.seats.keys())
    {
        return None;
    }

    let mut changed = before
        .seats
        .iter()
        .filter(|(role, athlete)| after.seats.get(*role) != Some(*athlete))
        .map(|(role, _)| *role);

    match (changed.next(), changed.next()) {
        (Some(role), None) => Some(role),
        _ => None,
    }
}
