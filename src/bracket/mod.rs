// Bracket vocabulary: formats, typed match coordinates and slot parity.
//
// Everything under `bracket` is pure and storage-free; the `competition`
// services persist what these functions compute.

pub mod builder;
pub mod round_robin;
pub mod routing;
pub mod seeding;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Tournament structure of a competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionFormat {
    SingleElimination,
    DoubleElimination,
    RoundRobin,
}

impl CompetitionFormat {
    /// Parse a format string (from DB) into a CompetitionFormat.
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "single_elimination" => Some(Self::SingleElimination),
            "double_elimination" => Some(Self::DoubleElimination),
            "round_robin" => Some(Self::RoundRobin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleElimination => "single_elimination",
            Self::DoubleElimination => "double_elimination",
            Self::RoundRobin => "round_robin",
        }
    }
}

/// How a match between two performers is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    HeadToHeadVote,
    RankedScore,
    JudgeScore,
    Combined,
}

impl ResolutionMethod {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "head_to_head_vote" => Some(Self::HeadToHeadVote),
            "ranked_score" => Some(Self::RankedScore),
            "judge_score" => Some(Self::JudgeScore),
            "combined" => Some(Self::Combined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeadToHeadVote => "head_to_head_vote",
            Self::RankedScore => "ranked_score",
            Self::JudgeScore => "judge_score",
            Self::Combined => "combined",
        }
    }
}

/// Which sub-bracket a match belongs to. Single elimination and round robin
/// store every match as `Winners`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketType {
    Winners,
    Losers,
    GrandFinals,
    GrandFinalsReset,
}

impl BracketType {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "winners" => Some(Self::Winners),
            "losers" => Some(Self::Losers),
            "grand_finals" => Some(Self::GrandFinals),
            "grand_finals_reset" => Some(Self::GrandFinalsReset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Winners => "winners",
            Self::Losers => "losers",
            Self::GrandFinals => "grand_finals",
            Self::GrandFinalsReset => "grand_finals_reset",
        }
    }
}

/// Typed coordinate of a match inside its bracket. `round` is local to the
/// sub-bracket (losers round 1 is the first losers round), unlike the global
/// `round_number` stored on a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BracketPosition {
    pub bracket: BracketType,
    pub round: u32,
    pub match_number: u32,
}

impl BracketPosition {
    pub fn winners(round: u32, match_number: u32) -> Self {
        Self {
            bracket: BracketType::Winners,
            round,
            match_number,
        }
    }

    pub fn losers(round: u32, match_number: u32) -> Self {
        Self {
            bracket: BracketType::Losers,
            round,
            match_number,
        }
    }

    pub fn grand_finals() -> Self {
        Self {
            bracket: BracketType::GrandFinals,
            round: 1,
            match_number: 1,
        }
    }

    pub fn grand_finals_reset() -> Self {
        Self {
            bracket: BracketType::GrandFinalsReset,
            round: 1,
            match_number: 1,
        }
    }
}

impl fmt::Display for BracketPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bracket {
            BracketType::Winners => {
                write!(f, "winners-round-{}-match-{}", self.round, self.match_number)
            }
            BracketType::Losers => {
                write!(f, "losers-round-{}-match-{}", self.round, self.match_number)
            }
            BracketType::GrandFinals => write!(f, "grand-finals"),
            BracketType::GrandFinalsReset => write!(f, "grand-finals-reset"),
        }
    }
}

impl FromStr for BracketPosition {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grand-finals" => return Ok(Self::grand_finals()),
            "grand-finals-reset" => return Ok(Self::grand_finals_reset()),
            _ => {}
        }

        let bad = || EngineError::invalid_input(format!("malformed bracket position '{s}'"));
        let parts: Vec<&str> = s.split('-').collect();
        let [bracket, "round", round, "match", match_number] = parts.as_slice() else {
            return Err(bad());
        };
        let bracket = match *bracket {
            "winners" => BracketType::Winners,
            "losers" => BracketType::Losers,
            _ => return Err(bad()),
        };
        let round: u32 = round.parse().map_err(|_| bad())?;
        let match_number: u32 = match_number.parse().map_err(|_| bad())?;
        if round == 0 || match_number == 0 {
            return Err(bad());
        }
        Ok(Self {
            bracket,
            round,
            match_number,
        })
    }
}

/// One of the two entrant slots of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Slot::First => Slot::Second,
            Slot::Second => Slot::First,
        }
    }
}

/// Slot a winner takes in the next halving round: odd match numbers feed the
/// first slot, even ones the second.
pub fn slot_for(match_number: u32) -> Slot {
    if match_number % 2 == 1 {
        Slot::First
    } else {
        Slot::Second
    }
}

/// Match number in the next halving round: `ceil(match_number / 2)`.
pub fn next_match_number(match_number: u32) -> u32 {
    match_number.div_ceil(2)
}

/// Shape metadata written once when a bracket is built and read back by the
/// advancement engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BracketConfig {
    pub bracket_size: u32,
    pub entrant_count: u32,
    pub winners_rounds: u32,
    pub losers_rounds: u32,
    pub grand_finals_reset: bool,
}

impl BracketConfig {
    /// Global, tournament-wide round number of a coordinate. Losers rounds
    /// follow the winners rounds; grand finals and the reset come last.
    pub fn global_round(&self, position: &BracketPosition) -> u32 {
        match position.bracket {
            BracketType::Winners => position.round,
            BracketType::Losers => self.winners_rounds + position.round,
            BracketType::GrandFinals => self.winners_rounds + self.losers_rounds + 1,
            BracketType::GrandFinalsReset => self.winners_rounds + self.losers_rounds + 2,
        }
    }
}
