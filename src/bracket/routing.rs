// Winner/loser routing and slot liveness for elimination brackets.
//
// Losers bracket layout for `W` winners rounds (`W >= 2`):
//
//   losers round 1        entry round, winners-round-1 losers play each other
//   losers round 2k       drop-in round, winners-round-(k+1) losers take slot 2,
//                         survivors of the previous losers round take slot 1
//   losers round 2k+1     internal round, survivors halve
//
// giving `2 * (W - 1)` losers rounds, the last of which feeds grand finals.
// With `W == 1` there is no losers bracket and the only loser goes straight
// to grand finals.

use super::seeding::seed_order;
use super::{next_match_number, slot_for, BracketConfig, BracketPosition, BracketType, Slot};
use super::CompetitionFormat;
use crate::error::EngineError;

/// Number of losers rounds for a double-elimination bracket.
pub fn losers_rounds_for(winners_rounds: u32) -> u32 {
    if winners_rounds <= 1 {
        0
    } else {
        2 * (winners_rounds - 1)
    }
}

/// What feeds a given losers round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LosersRoundKind {
    /// Winners-round-1 losers paired among themselves.
    Entry,
    /// Survivors meet the losers of `from_winners_round`.
    DropIn { from_winners_round: u32 },
    /// Survivors only.
    Internal,
}

impl LosersRoundKind {
    /// Winners round whose losers enter this losers round, if any.
    pub fn receives_losers_from(&self) -> Option<u32> {
        match self {
            LosersRoundKind::Entry => Some(1),
            LosersRoundKind::DropIn { from_winners_round } => Some(*from_winners_round),
            LosersRoundKind::Internal => None,
        }
    }
}

pub fn losers_round_kind(round: u32) -> LosersRoundKind {
    if round == 1 {
        LosersRoundKind::Entry
    } else if round % 2 == 0 {
        LosersRoundKind::DropIn {
            from_winners_round: round / 2 + 1,
        }
    } else {
        LosersRoundKind::Internal
    }
}

/// Losers round that receives the losers of `winners_round`.
pub fn losers_round_receiving(winners_round: u32) -> u32 {
    if winners_round == 1 {
        1
    } else {
        2 * (winners_round - 1)
    }
}

/// Matches laid out in a losers round (before dead matches are dropped).
pub fn losers_match_count(bracket_size: u32, round: u32) -> u32 {
    match losers_round_kind(round) {
        LosersRoundKind::Entry => bracket_size / 4,
        LosersRoundKind::DropIn { from_winners_round } => bracket_size >> from_winners_round,
        LosersRoundKind::Internal => losers_match_count(bracket_size, round - 1).div_ceil(2),
    }
}

/// How a dropped loser picks its slot in the receiving losers round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    /// First match (by match number) with any empty slot, slot 1 before slot 2.
    FirstOpenSlot,
    /// First match (by match number) whose second slot is empty.
    SecondSlot,
}

/// Where the winner of a resolved match goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinnerRoute {
    /// Fill a slot of a later match.
    Advance { position: BracketPosition, slot: Slot },
    /// Winner of the first grand-finals match came from the losers bracket:
    /// both finalists now have one loss and play the reset match.
    ResetMatch,
    /// Tournament decided.
    Champion,
    /// Round robin: results are independent.
    Terminal,
}

/// Where the loser of a resolved match goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoserRoute {
    Eliminated,
    /// Fill a fixed slot (winners final loser in a two-entrant bracket).
    Advance { position: BracketPosition, slot: Slot },
    /// Enter the losers bracket.
    DropIn { losers_round: u32, policy: DropPolicy },
}

pub fn route_winner(
    format: CompetitionFormat,
    config: &BracketConfig,
    from: &BracketPosition,
    winner_slot: Slot,
) -> Result<WinnerRoute, EngineError> {
    if format == CompetitionFormat::RoundRobin {
        return Ok(WinnerRoute::Terminal);
    }
    let double = format == CompetitionFormat::DoubleElimination;

    match from.bracket {
        BracketType::Winners => {
            if from.round < config.winners_rounds {
                Ok(WinnerRoute::Advance {
                    position: BracketPosition::winners(
                        from.round + 1,
                        next_match_number(from.match_number),
                    ),
                    slot: slot_for(from.match_number),
                })
            } else if double {
                Ok(WinnerRoute::Advance {
                    position: BracketPosition::grand_finals(),
                    slot: Slot::First,
                })
            } else {
                Ok(WinnerRoute::Champion)
            }
        }
        BracketType::Losers if double => {
            if from.round >= config.losers_rounds {
                return Ok(WinnerRoute::Advance {
                    position: BracketPosition::grand_finals(),
                    slot: Slot::Second,
                });
            }
            let next_round = from.round + 1;
            let route = match losers_round_kind(next_round) {
                LosersRoundKind::DropIn { .. } => WinnerRoute::Advance {
                    position: BracketPosition::losers(next_round, from.match_number),
                    slot: Slot::First,
                },
                _ => WinnerRoute::Advance {
                    position: BracketPosition::losers(
                        next_round,
                        next_match_number(from.match_number),
                    ),
                    slot: slot_for(from.match_number),
                },
            };
            Ok(route)
        }
        BracketType::GrandFinals if double => match winner_slot {
            Slot::First => Ok(WinnerRoute::Champion),
            Slot::Second => Ok(WinnerRoute::ResetMatch),
        },
        BracketType::GrandFinalsReset if double => Ok(WinnerRoute::Champion),
        _ => Err(EngineError::inconsistent(format!(
            "{} match {from} in a {} competition",
            from.bracket.as_str(),
            format.as_str()
        ))),
    }
}

pub fn route_loser(
    format: CompetitionFormat,
    config: &BracketConfig,
    from: &BracketPosition,
) -> LoserRoute {
    if format != CompetitionFormat::DoubleElimination || from.bracket != BracketType::Winners {
        return LoserRoute::Eliminated;
    }
    if config.losers_rounds == 0 {
        return LoserRoute::Advance {
            position: BracketPosition::grand_finals(),
            slot: Slot::Second,
        };
    }
    let losers_round = losers_round_receiving(from.round);
    let policy = if losers_round == 1 {
        DropPolicy::FirstOpenSlot
    } else {
        DropPolicy::SecondSlot
    };
    LoserRoute::DropIn {
        losers_round,
        policy,
    }
}

/// Number of winners-round-1 matches that produce a loser (i.e. are not byes).
fn first_round_contests(config: &BracketConfig) -> u32 {
    config
        .entrant_count
        .saturating_sub(config.bracket_size / 2)
}

/// How many entrants will ever reach the match at `position` (0, 1 or 2).
///
/// A match expecting exactly one entrant is resolved as a bye as soon as that
/// entrant arrives; a match expecting none is never created.
pub fn expected_entrants(config: &BracketConfig, position: &BracketPosition) -> u8 {
    match position.bracket {
        BracketType::Winners if position.round == 1 => {
            let order = seed_order(config.bracket_size as usize);
            let first = 2 * (position.match_number as usize - 1);
            order[first..first + 2]
                .iter()
                .filter(|&&seed| seed < config.entrant_count as usize)
                .count() as u8
        }
        BracketType::Losers if position.round == 1 => {
            // Entry round fills first-open-slot in match order, so the
            // winners-round-1 losers occupy the leading slots.
            let filled_before = 2 * (position.match_number - 1);
            first_round_contests(config)
                .saturating_sub(filled_before)
                .min(2) as u8
        }
        BracketType::Losers if position.round == 2 => {
            let survivor = expected_entrants(
                config,
                &BracketPosition::losers(1, position.match_number),
            ) > 0;
            1 + survivor as u8
        }
        _ => 2,
    }
}
