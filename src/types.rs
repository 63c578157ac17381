//! Common types used throughout the rating engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier for an athlete, owned by the host application
pub type AthleteId = String;

/// Unique identifier for seat race sessions
pub type SessionId = Uuid;

/// Ratings for one scope, keyed by athlete. Ordered so that every consumer
/// iterates athletes in the same sequence.
pub type RatingMap = BTreeMap<AthleteId, AthleteRating>;

/// Side designation of a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Port,
    Starboard,
    Coxswain,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Port => write!(f, "port"),
            Side::Starboard => write!(f, "starboard"),
            Side::Coxswain => write!(f, "coxswain"),
        }
    }
}

/// Side attribute of an athlete. Informational for the engine; ratings are
/// scoped by the side of the seat actually raced, not this preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AthleteSide {
    Port,
    Starboard,
    BothSides,
    Coxswain,
}

impl AthleteSide {
    /// Scope sides where an athlete of this side normally holds ratings
    pub fn scope_sides(&self) -> Vec<ScopeSide> {
        match self {
            AthleteSide::Port => vec![ScopeSide::All, ScopeSide::Port],
            AthleteSide::Starboard => vec![ScopeSide::All, ScopeSide::Starboard],
            AthleteSide::BothSides => vec![ScopeSide::All, ScopeSide::Port, ScopeSide::Starboard],
            AthleteSide::Coxswain => vec![ScopeSide::All, ScopeSide::Coxswain],
        }
    }
}

/// Side component of a rating scope: one concrete side or the "all" pseudo-side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSide {
    All,
    Port,
    Starboard,
    Coxswain,
}

impl ScopeSide {
    /// Every scope side, "all" first
    pub const EVERY: [ScopeSide; 4] = [
        ScopeSide::All,
        ScopeSide::Port,
        ScopeSide::Starboard,
        ScopeSide::Coxswain,
    ];

    /// Whether a comparison raced on `side` belongs to this scope
    pub fn includes(&self, side: Side) -> bool {
        match self {
            ScopeSide::All => true,
            ScopeSide::Port => side == Side::Port,
            ScopeSide::Starboard => side == Side::Starboard,
            ScopeSide::Coxswain => side == Side::Coxswain,
        }
    }
}

impl From<Side> for ScopeSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Port => ScopeSide::Port,
            Side::Starboard => ScopeSide::Starboard,
            Side::Coxswain => ScopeSide::Coxswain,
        }
    }
}

impl std::fmt::Display for ScopeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeSide::All => write!(f, "all"),
            ScopeSide::Port => write!(f, "port"),
            ScopeSide::Starboard => write!(f, "starboard"),
            ScopeSide::Coxswain => write!(f, "coxswain"),
        }
    }
}

impl FromStr for ScopeSide {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ScopeSide::All),
            "port" => Ok(ScopeSide::Port),
            "starboard" => Ok(ScopeSide::Starboard),
            "coxswain" | "cox" => Ok(ScopeSide::Coxswain),
            other => Err(crate::error::EngineError::InvalidScope {
                reason: format!("unknown side '{}'", other),
            }),
        }
    }
}

/// Kind of rating row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingType {
    SeatRaceElo,
    BradleyTerry,
}

impl RatingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingType::SeatRaceElo => "seat_race_elo",
            RatingType::BradleyTerry => "bradley_terry",
        }
    }
}

impl std::fmt::Display for RatingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RatingType {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "seat_race_elo" | "elo" => Ok(RatingType::SeatRaceElo),
            "bradley_terry" | "bradley-terry" => Ok(RatingType::BradleyTerry),
            "" => Err(crate::error::EngineError::InvalidScope {
                reason: "empty rating type".to_string(),
            }),
            other => Err(crate::error::EngineError::InvalidScope {
                reason: format!("unknown rating type '{}'", other),
            }),
        }
    }
}

/// Algorithm requested through `recalculate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Elo,
    BradleyTerry,
}

impl Algorithm {
    pub fn rating_type(&self) -> RatingType {
        match self {
            Algorithm::Elo => RatingType::SeatRaceElo,
            Algorithm::BradleyTerry => RatingType::BradleyTerry,
        }
    }
}

impl From<RatingType> for Algorithm {
    fn from(rating_type: RatingType) -> Self {
        match rating_type {
            RatingType::SeatRaceElo => Algorithm::Elo,
            RatingType::BradleyTerry => Algorithm::BradleyTerry,
        }
    }
}

/// Unit of rating computation and persistence: one (rating type, side) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RatingScope {
    pub rating_type: RatingType,
    pub side: ScopeSide,
}

impl RatingScope {
    pub fn new(rating_type: RatingType, side: ScopeSide) -> Self {
        Self { rating_type, side }
    }

    pub fn elo(side: ScopeSide) -> Self {
        Self::new(RatingType::SeatRaceElo, side)
    }

    pub fn bradley_terry(side: ScopeSide) -> Self {
        Self::new(RatingType::BradleyTerry, side)
    }

    /// Every scope the engine maintains
    pub fn all_scopes() -> Vec<RatingScope> {
        [RatingType::SeatRaceElo, RatingType::BradleyTerry]
            .into_iter()
            .flat_map(|rating_type| {
                ScopeSide::EVERY
                    .into_iter()
                    .map(move |side| RatingScope::new(rating_type, side))
            })
            .collect()
    }
}

impl std::fmt::Display for RatingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.rating_type, self.side)
    }
}

/// Seat position within a boat. Comparisons match seats by role, never by
/// boat identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatRole {
    /// Seat number counted from the bow; coxswain seats use 0
    pub seat: u8,
    pub side: Side,
}

/// One athlete occupying one seat for a piece
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub role: SeatRole,
    pub athlete_id: AthleteId,
}

/// A boat's lineup and result for one piece
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoatEntry {
    pub name: String,
    /// Elapsed time in seconds, if the piece was timed
    #[serde(default)]
    pub finish_seconds: Option<f64>,
    /// Finishing place (1 = first), if recorded
    #[serde(default)]
    pub place: Option<u32>,
    pub seats: Vec<SeatAssignment>,
}

/// One timed or placed race within a session. All boats in a piece race
/// concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Piece {
    pub index: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub distance_meters: Option<f64>,
    pub boats: Vec<BoatEntry>,
}

/// Immutable record of one seat racing event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatRaceSession {
    pub id: SessionId,
    #[serde(default)]
    pub name: String,
    pub raced_at: DateTime<Utc>,
    pub pieces: Vec<Piece>,
}

/// Atomic head-to-head result between two athletes swapped through the same seat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Lexicographically smaller athlete of the pair
    pub athlete_a: AthleteId,
    pub athlete_b: AthleteId,
    /// `None` is a statistical dead heat
    pub winner_id: Option<AthleteId>,
    /// Always non-negative; direction carried by `winner_id`
    pub margin_seconds: f64,
    pub side: Side,
    pub session_id: SessionId,
    /// Later piece of the swapped pair
    pub piece_index: u32,
    /// Earlier piece of the swapped pair
    pub reference_piece_index: u32,
    pub timestamp: DateTime<Utc>,
}

impl Comparison {
    /// Replay ordering key
    pub fn key(&self) -> ComparisonKey {
        ComparisonKey {
            timestamp: self.timestamp,
            session_id: self.session_id,
            piece_index: self.piece_index,
            reference_piece_index: self.reference_piece_index,
            athlete_a: self.athlete_a.clone(),
            athlete_b: self.athlete_b.clone(),
        }
    }

    pub fn is_draw(&self) -> bool {
        self.winner_id.is_none()
    }

    /// Actual score for athlete A: 1.0 win, 0.0 loss, 0.5 draw
    pub fn score_a(&self) -> f64 {
        match &self.winner_id {
            Some(winner) if *winner == self.athlete_a => 1.0,
            Some(_) => 0.0,
            None => 0.5,
        }
    }
}

/// Total replay order for comparisons: chronological, then
/// `(session_id, piece_index)`, then the remaining fields
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComparisonKey {
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub piece_index: u32,
    pub reference_piece_index: u32,
    pub athlete_a: AthleteId,
    pub athlete_b: AthleteId,
}

/// Algorithm-specific state carried by a rating row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rating_type", rename_all = "snake_case")]
pub enum RatingDetails {
    SeatRaceElo {
        wins: u32,
        losses: u32,
        draws: u32,
        /// Running sums of applied rating deltas, for volatility
        delta_sum: f64,
        delta_sum_squared: f64,
        /// Latest comparison already reflected in this rating
        last_comparison: Option<ComparisonKey>,
    },
    BradleyTerry {
        /// Log strength centered on the component mean
        log_strength: f64,
        component: usize,
        component_size: usize,
        converged: bool,
        iterations: usize,
    },
}

/// Materialized rating for one athlete within one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteRating {
    pub athlete_id: AthleteId,
    pub side: ScopeSide,
    pub rating_value: f64,
    /// Evidence behind the rating, in [0, 1]
    pub confidence_score: f64,
    pub races_count: u32,
    pub last_calculated_at: DateTime<Utc>,
    pub details: RatingDetails,
}

impl AthleteRating {
    pub fn rating_type(&self) -> RatingType {
        match self.details {
            RatingDetails::SeatRaceElo { .. } => RatingType::SeatRaceElo,
            RatingDetails::BradleyTerry { .. } => RatingType::BradleyTerry,
        }
    }

    pub fn scope(&self) -> RatingScope {
        RatingScope::new(self.rating_type(), self.side)
    }

    /// Standard deviation of the Elo deltas applied so far; `None` for
    /// Bradley-Terry rows
    pub fn volatility(&self) -> Option<f64> {
        match &self.details {
            RatingDetails::SeatRaceElo {
                delta_sum,
                delta_sum_squared,
                ..
            } => {
                if self.races_count <= 1 {
                    return Some(0.0);
                }
                let n = self.races_count as f64;
                let mean = delta_sum / n;
                let variance = (delta_sum_squared / n) - mean * mean;
                Some(variance.max(0.0).sqrt())
            }
            RatingDetails::BradleyTerry { .. } => None,
        }
    }
}

/// Answer to a pairwise win probability query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "probability", rename_all = "snake_case")]
pub enum WinProbability {
    Estimate(f64),
    InsufficientData,
}

impl WinProbability {
    pub fn value(&self) -> Option<f64> {
        match self {
            WinProbability::Estimate(p) => Some(*p),
            WinProbability::InsufficientData => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, WinProbability::InsufficientData)
    }
}

/// Ranking entry for display consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedAthlete {
    pub rank: usize,
    pub athlete_id: AthleteId,
    pub rating_value: f64,
    pub confidence_score: f64,
    pub races_count: u32,
}

/// Sort ratings for display: rating descending, then athlete ID
pub fn rank_ratings(ratings: &RatingMap) -> Vec<RankedAthlete> {
    let mut rows: Vec<&AthleteRating> = ratings.values().collect();
    rows.sort_by(|a, b| {
        b.rating_value
            .partial_cmp(&a.rating_value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.athlete_id.cmp(&b.athlete_id))
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, rating)| RankedAthlete {
            rank: i + 1,
            athlete_id: rating.athlete_id.clone(),
            rating_value: rating.rating_value,
            confidence_score: rating.confidence_score,
            races_count: rating.races_count,
        })
        .collect()
}
