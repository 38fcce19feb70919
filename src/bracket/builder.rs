// Bracket construction: turns a ranked entrant list into the full set of
// matches for a competition, with placeholders for rounds not yet decided.

use std::collections::HashSet;

use super::round_robin::plan_round_robin;
use super::routing::{expected_entrants, losers_match_count, losers_round_kind, losers_rounds_for};
use super::seeding::{bracket_size, rounds_for, seed_order, seed_slots};
use super::{BracketConfig, BracketPosition, CompetitionFormat};
use crate::error::EngineError;

/// One match to be written when a bracket is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    pub position: BracketPosition,
    /// Tournament-wide round number.
    pub round_number: u32,
    pub entrant_1: Option<i64>,
    pub seed_1: Option<u32>,
    pub entrant_2: Option<i64>,
    pub seed_2: Option<u32>,
    /// Set for first-round byes: the present entrant wins without a vote.
    pub bye_winner: Option<i64>,
    pub receives_losers_from_round: Option<u32>,
}

impl MatchPlan {
    pub fn placeholder(position: BracketPosition, round_number: u32) -> Self {
        Self {
            position,
            round_number,
            entrant_1: None,
            seed_1: None,
            entrant_2: None,
            seed_2: None,
            bye_winner: None,
            receives_losers_from_round: None,
        }
    }

    pub fn is_bye(&self) -> bool {
        self.bye_winner.is_some()
    }
}

/// Everything the lifecycle needs to persist a freshly built bracket.
#[derive(Debug, Clone)]
pub struct BracketPlan {
    pub format: CompetitionFormat,
    pub config: BracketConfig,
    pub rounds_total: u32,
    pub matches: Vec<MatchPlan>,
}

impl BracketPlan {
    pub fn bye_count(&self) -> usize {
        self.matches.iter().filter(|m| m.is_bye()).count()
    }

    pub fn matches_in_round(&self, round_number: u32) -> impl Iterator<Item = &MatchPlan> {
        self.matches
            .iter()
            .filter(move |m| m.round_number == round_number)
    }
}

/// Reject entrant lists that cannot form a bracket.
pub fn validate_entrants(entrants: &[i64]) -> Result<(), EngineError> {
    if entrants.len() < 2 {
        return Err(EngineError::invalid_input(format!(
            "a bracket needs at least 2 entrants, got {}",
            entrants.len()
        )));
    }
    let mut seen = HashSet::with_capacity(entrants.len());
    for id in entrants {
        if !seen.insert(id) {
            return Err(EngineError::invalid_input(format!(
                "entrant {id} appears more than once"
            )));
        }
    }
    Ok(())
}

/// Build the match plan for `format` from ranked entrants (index 0 = top seed).
pub fn plan_bracket(
    format: CompetitionFormat,
    entrants: &[i64],
) -> Result<BracketPlan, EngineError> {
    validate_entrants(entrants)?;
    match format {
        CompetitionFormat::SingleElimination => plan_single_elimination(entrants),
        CompetitionFormat::DoubleElimination => plan_double_elimination(entrants),
        CompetitionFormat::RoundRobin => Ok(plan_round_robin(entrants)),
    }
}

fn elimination_config(entrants: &[i64], double: bool) -> BracketConfig {
    let winners_rounds = rounds_for(entrants.len());
    BracketConfig {
        bracket_size: bracket_size(entrants.len()) as u32,
        entrant_count: entrants.len() as u32,
        winners_rounds,
        losers_rounds: if double {
            losers_rounds_for(winners_rounds)
        } else {
            0
        },
        grand_finals_reset: double,
    }
}

/// Round 1 from seeded slots plus empty placeholders for the later rounds.
fn plan_winners_bracket(
    entrants: &[i64],
    config: &BracketConfig,
) -> Result<Vec<MatchPlan>, EngineError> {
    let slots = seed_slots(entrants)?;
    let order = seed_order(slots.len());
    let mut matches = Vec::with_capacity(slots.len());

    for (i, pair) in slots.chunks(2).enumerate() {
        let position = BracketPosition::winners(1, i as u32 + 1);
        let seed_of = |slot: usize| slots[slot].map(|_| order[slot] as u32 + 1);
        let bye_winner = match (pair[0], pair[1]) {
            (Some(_), Some(_)) => None,
            (Some(e), None) | (None, Some(e)) => Some(e),
            (None, None) => {
                return Err(EngineError::inconsistent(format!(
                    "{position} has no entrants"
                )))
            }
        };
        matches.push(MatchPlan {
            entrant_1: pair[0],
            seed_1: seed_of(2 * i),
            entrant_2: pair[1],
            seed_2: seed_of(2 * i + 1),
            bye_winner,
            ..MatchPlan::placeholder(position, 1)
        });
    }

    for round in 2..=config.winners_rounds {
        let count = config.bracket_size >> round;
        for m in 1..=count {
            matches.push(MatchPlan::placeholder(
                BracketPosition::winners(round, m),
                round,
            ));
        }
    }
    Ok(matches)
}

fn plan_single_elimination(entrants: &[i64]) -> Result<BracketPlan, EngineError> {
    let config = elimination_config(entrants, false);
    let matches = plan_winners_bracket(entrants, &config)?;
    Ok(BracketPlan {
        format: CompetitionFormat::SingleElimination,
        rounds_total: config.winners_rounds,
        config,
        matches,
    })
}

fn plan_double_elimination(entrants: &[i64]) -> Result<BracketPlan, EngineError> {
    let config = elimination_config(entrants, true);
    let mut matches = plan_winners_bracket(entrants, &config)?;

    for round in 1..=config.losers_rounds {
        let receives = losers_round_kind(round).receives_losers_from();
        for m in 1..=losers_match_count(config.bracket_size, round) {
            let position = BracketPosition::losers(round, m);
            if expected_entrants(&config, &position) == 0 {
                continue;
            }
            matches.push(MatchPlan {
                receives_losers_from_round: receives,
                ..MatchPlan::placeholder(position, config.global_round(&position))
            });
        }
    }

    for position in [
        BracketPosition::grand_finals(),
        BracketPosition::grand_finals_reset(),
    ] {
        matches.push(MatchPlan::placeholder(
            position,
            config.global_round(&position),
        ));
    }

    Ok(BracketPlan {
        format: CompetitionFormat::DoubleElimination,
        rounds_total: config.global_round(&BracketPosition::grand_finals_reset()),
        config,
        matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::BracketType;

    fn ids(n: i64) -> Vec<i64> {
        (1..=n).collect()
    }

    #[test]
    fn test_five_entrants_single_elimination() {
        let plan = plan_bracket(CompetitionFormat::SingleElimination, &ids(5)).unwrap();
        assert_eq!(plan.config.bracket_size, 8);
        assert_eq!(plan.rounds_total, 3);
        assert_eq!(plan.matches_in_round(1).count(), 4);
        assert_eq!(plan.matches_in_round(2).count(), 2);
        assert_eq!(plan.matches_in_round(3).count(), 1);
        assert_eq!(plan.bye_count(), 3);

        for m in plan.matches_in_round(1).filter(|m| m.is_bye()) {
            let present = m.entrant_1.or(m.entrant_2);
            assert_eq!(m.bye_winner, present);
        }
        let contested: Vec<&MatchPlan> = plan.matches_in_round(1).filter(|m| !m.is_bye()).collect();
        assert_eq!(contested.len(), 1);
        assert_eq!(contested[0].entrant_1, Some(4));
        assert_eq!(contested[0].entrant_2, Some(5));
        assert_eq!(contested[0].seed_1, Some(4));
        assert_eq!(contested[0].seed_2, Some(5));
    }

    #[test]
    fn test_later_rounds_are_placeholders() {
        let plan = plan_bracket(CompetitionFormat::SingleElimination, &ids(8)).unwrap();
        assert_eq!(plan.matches.len(), 7);
        assert!(plan
            .matches
            .iter()
            .filter(|m| m.round_number > 1)
            .all(|m| m.entrant_1.is_none() && m.entrant_2.is_none()));
    }

    #[test]
    fn test_double_elimination_shape_for_8() {
        let plan = plan_bracket(CompetitionFormat::DoubleElimination, &ids(8)).unwrap();
        assert_eq!(plan.config.winners_rounds, 3);
        assert_eq!(plan.config.losers_rounds, 4);
        assert!(plan.config.grand_finals_reset);
        assert_eq!(plan.rounds_total, 9);

        let losers: Vec<&MatchPlan> = plan
            .matches
            .iter()
            .filter(|m| m.position.bracket == BracketType::Losers)
            .collect();
        assert_eq!(losers.len(), 6);
        assert!(losers
            .iter()
            .filter(|m| m.position.round == 1)
            .all(|m| m.receives_losers_from_round == Some(1)));
        assert!(losers
            .iter()
            .filter(|m| m.position.round == 3)
            .all(|m| m.receives_losers_from_round.is_none()));
        assert!(losers
            .iter()
            .filter(|m| m.position.round == 4)
            .all(|m| m.receives_losers_from_round == Some(3)));

        let finals: Vec<BracketType> = plan
            .matches
            .iter()
            .map(|m| m.position.bracket)
            .filter(|b| matches!(b, BracketType::GrandFinals | BracketType::GrandFinalsReset))
            .collect();
        assert_eq!(
            finals,
            vec![BracketType::GrandFinals, BracketType::GrandFinalsReset]
        );
    }

    #[test]
    fn test_double_elimination_skips_dead_losers_matches() {
        let plan = plan_bracket(CompetitionFormat::DoubleElimination, &ids(5)).unwrap();
        let losers_round_1: Vec<&MatchPlan> = plan
            .matches
            .iter()
            .filter(|m| m.position.bracket == BracketType::Losers && m.position.round == 1)
            .collect();
        assert_eq!(losers_round_1.len(), 1);
        assert_eq!(losers_round_1[0].position.match_number, 1);
    }

    #[test]
    fn test_round_numbers_are_unique_per_bracket_round() {
        let plan = plan_bracket(CompetitionFormat::DoubleElimination, &ids(16)).unwrap();
        for m in &plan.matches {
            assert_eq!(m.round_number, plan.config.global_round(&m.position));
        }
        let mut positions: Vec<String> =
            plan.matches.iter().map(|m| m.position.to_string()).collect();
        let total = positions.len();
        positions.sort();
        positions.dedup();
        assert_eq!(positions.len(), total);
    }

    #[test]
    fn test_rejects_bad_entrant_lists() {
        assert!(plan_bracket(CompetitionFormat::SingleElimination, &[7]).is_err());
        assert!(plan_bracket(CompetitionFormat::RoundRobin, &[]).is_err());
        let err = plan_bracket(CompetitionFormat::DoubleElimination, &[1, 2, 2]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
