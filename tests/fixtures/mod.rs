//! Test fixtures: session builders and a mock rating store
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use mockall::mock;
use seat_race_engine::error::Result;
use seat_race_engine::rating::RatingStore;
use seat_race_engine::types::{
    BoatEntry, Comparison, Piece, RatingMap, RatingScope, SeatAssignment, SeatRaceSession,
    SeatRole, SessionId, Side,
};
use uuid::Uuid;

mock! {
    pub Store {}

    impl RatingStore for Store {
        fn load_comparisons(&self, scope: &RatingScope) -> Result<Vec<Comparison>>;
        fn load_current_ratings(&self, scope: &RatingScope) -> Result<RatingMap>;
        fn save_ratings(&self, scope: &RatingScope, ratings: RatingMap) -> Result<()>;
        fn replace_session_comparisons(
            &self,
            session_id: SessionId,
            comparisons: Vec<Comparison>,
        ) -> Result<Vec<Comparison>>;
    }
}

/// Fixed reference instant; fixtures offset from it in days or minutes
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap() + Duration::days(n)
}

/// Boat with seats numbered from 1 in the order given
pub fn boat(name: &str, athletes: &[(&str, Side)], finish: Option<f64>) -> BoatEntry {
    BoatEntry {
        name: name.to_string(),
        finish_seconds: finish,
        place: None,
        seats: athletes
            .iter()
            .enumerate()
            .map(|(i, (id, side))| SeatAssignment {
                role: SeatRole {
                    seat: (i + 1) as u8,
                    side: *side,
                },
                athlete_id: id.to_string(),
            })
            .collect(),
    }
}

pub fn piece(index: u32, boats: Vec<BoatEntry>) -> Piece {
    Piece {
        index,
        started_at: None,
        distance_meters: None,
        boats,
    }
}

pub fn session(id: u128, raced_on: i64, pieces: Vec<Piece>) -> SeatRaceSession {
    SeatRaceSession {
        id: Uuid::from_u128(id),
        name: format!("seat race {}", id),
        raced_at: day(raced_on),
        pieces,
    }
}

/// Two pairs, `winner` and `loser` swapped through the same seat of `side`.
/// The winner's boat is 3 seconds better off with the winner aboard.
pub fn pair_swap(id: u128, raced_on: i64, winner: &str, loser: &str, side: Side) -> SeatRaceSession {
    let other = match side {
        Side::Port => Side::Starboard,
        _ => Side::Port,
    };
    let (stroke_one, stroke_two) = (format!("anchor-{}-1", id), format!("anchor-{}-2", id));

    session(
        id,
        raced_on,
        vec![
            piece(
                0,
                vec![
                    boat("one", &[(&stroke_one, other), (winner, side)], Some(100.0)),
                    boat("two", &[(&stroke_two, other), (loser, side)], Some(102.0)),
                ],
            ),
            piece(
                1,
                vec![
                    boat("one", &[(&stroke_one, other), (loser, side)], Some(101.0)),
                    boat("two", &[(&stroke_two, other), (winner, side)], Some(100.0)),
                ],
            ),
        ],
    )
}

/// Four-seat boats where two seats change occupants between the pieces
pub fn double_swap_session(id: u128) -> SeatRaceSession {
    const P: Side = Side::Port;
    const S: Side = Side::Starboard;

    session(
        id,
        0,
        vec![
            piece(
                0,
                vec![
                    boat("one", &[("a", S), ("x", P), ("m", S), ("p", P)], Some(300.0)),
                    boat("two", &[("b", S), ("y", P), ("n", S), ("q", P)], Some(301.0)),
                ],
            ),
            piece(
                1,
                vec![
                    boat("one", &[("b", S), ("y", P), ("m", S), ("p", P)], Some(302.0)),
                    boat("two", &[("a", S), ("x", P), ("n", S), ("q", P)], Some(300.0)),
                ],
            ),
        ],
    )
}

/// Comparison `minute` minutes after the reference instant
pub fn comparison(a: &str, b: &str, winner: Option<&str>, minute: i64) -> Comparison {
    let (athlete_a, athlete_b) = if a <= b { (a, b) } else { (b, a) };
    Comparison {
        athlete_a: athlete_a.to_string(),
        athlete_b: athlete_b.to_string(),
        winner_id: winner.map(str::to_string),
        margin_seconds: if winner.is_some() { 2.0 } else { 0.0 },
        side: Side::Port,
        session_id: Uuid::from_u128(1),
        piece_index: 1,
        reference_piece_index: 0,
        timestamp: day(0) + Duration::minutes(minute),
    }
}
