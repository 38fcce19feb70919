// Round-robin scheduling (circle method) and standings.

use std::collections::HashMap;

use serde::Serialize;

use super::builder::{BracketPlan, MatchPlan};
use super::{BracketConfig, BracketPosition, CompetitionFormat};

/// Pairings per round as indices into the entrant list.
///
/// An odd field is padded with a phantom entrant; whoever draws the phantom
/// sits the round out, so no match is produced for that pairing.
pub fn circle_rounds(entrant_count: usize) -> Vec<Vec<(usize, usize)>> {
    if entrant_count < 2 {
        return Vec::new();
    }
    let padded = entrant_count + entrant_count % 2;
    let phantom = if padded > entrant_count {
        Some(padded - 1)
    } else {
        None
    };

    // Index 0 stays fixed, the others rotate one step per round.
    let mut rotating: Vec<usize> = (1..padded).collect();
    let mut rounds = Vec::with_capacity(padded - 1);

    for _ in 0..padded - 1 {
        let mut pairs = Vec::with_capacity(padded / 2);
        let mut push = |a: usize, b: usize| {
            if Some(a) != phantom && Some(b) != phantom {
                pairs.push((a.min(b), a.max(b)));
            }
        };
        push(0, rotating[0]);
        for i in 1..padded / 2 {
            push(rotating[i], rotating[padded - 1 - i]);
        }
        rounds.push(pairs);
        rotating.rotate_right(1);
    }
    rounds
}

/// Full schedule for ranked entrants. Every match is stored in the winners
/// bracket with the round as both local and global round number.
pub fn plan_round_robin(entrants: &[i64]) -> BracketPlan {
    let n = entrants.len();
    let padded = (n + n % 2) as u32;
    let config = BracketConfig {
        bracket_size: padded,
        entrant_count: n as u32,
        winners_rounds: padded.saturating_sub(1),
        losers_rounds: 0,
        grand_finals_reset: false,
    };

    let mut matches = Vec::new();
    for (r, pairs) in circle_rounds(n).into_iter().enumerate() {
        let round = r as u32 + 1;
        for (m, (a, b)) in pairs.into_iter().enumerate() {
            matches.push(MatchPlan {
                entrant_1: Some(entrants[a]),
                seed_1: Some(a as u32 + 1),
                entrant_2: Some(entrants[b]),
                seed_2: Some(b as u32 + 1),
                ..MatchPlan::placeholder(BracketPosition::winners(round, m as u32 + 1), round)
            });
        }
    }

    BracketPlan {
        format: CompetitionFormat::RoundRobin,
        rounds_total: config.winners_rounds,
        config,
        matches,
    }
}

/// A resolved round-robin result, as read back from storage.
#[derive(Debug, Clone, Copy)]
pub struct PlayedMatch {
    pub entrant_1: i64,
    pub entrant_2: i64,
    pub votes_1: i64,
    pub votes_2: i64,
    pub winner: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub entrant_id: i64,
    pub seed: u32,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub votes_for: i64,
    pub votes_against: i64,
}

/// Table ordered by wins, then votes received, then seed.
pub fn standings(entrants: &[i64], played: &[PlayedMatch]) -> Vec<Standing> {
    let mut table: HashMap<i64, Standing> = entrants
        .iter()
        .enumerate()
        .map(|(i, &id)| {
            (
                id,
                Standing {
                    entrant_id: id,
                    seed: i as u32 + 1,
                    played: 0,
                    wins: 0,
                    losses: 0,
                    votes_for: 0,
                    votes_against: 0,
                },
            )
        })
        .collect();

    for m in played {
        for (id, votes_for, votes_against) in [
            (m.entrant_1, m.votes_1, m.votes_2),
            (m.entrant_2, m.votes_2, m.votes_1),
        ] {
            if let Some(row) = table.get_mut(&id) {
                row.played += 1;
                row.votes_for += votes_for;
                row.votes_against += votes_against;
                if m.winner == id {
                    row.wins += 1;
                } else {
                    row.losses += 1;
                }
            }
        }
    }

    let mut rows: Vec<Standing> = table.into_values().collect();
    rows.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then(b.votes_for.cmp(&a.votes_for))
            .then(a.seed.cmp(&b.seed))
            .then(a.entrant_id.cmp(&b.entrant_id))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_pair_meets_exactly_once() {
        for n in 2..=32usize {
            let rounds = circle_rounds(n);
            let padded = n + n % 2;
            assert_eq!(rounds.len(), padded - 1, "n = {n}");

            let mut seen = HashSet::new();
            for pairs in &rounds {
                let mut busy = HashSet::new();
                for &(a, b) in pairs {
                    assert!(a < n && b < n);
                    assert!(busy.insert(a) && busy.insert(b), "n = {n}: double booked");
                    assert!(seen.insert((a, b)), "n = {n}: repeat pairing {a}-{b}");
                }
            }
            assert_eq!(seen.len(), n * (n - 1) / 2, "n = {n}");
        }
    }

    #[test]
    fn test_odd_field_sits_one_out_per_round() {
        let rounds = circle_rounds(5);
        assert_eq!(rounds.len(), 5);
        assert!(rounds.iter().all(|pairs| pairs.len() == 2));
    }

    #[test]
    fn test_plan_round_robin() {
        let plan = plan_round_robin(&[11, 22, 33, 44]);
        assert_eq!(plan.rounds_total, 3);
        assert_eq!(plan.matches.len(), 6);
        assert!(plan.matches.iter().all(|m| m.bye_winner.is_none()));
        assert!(plan
            .matches
            .iter()
            .all(|m| m.round_number == m.position.round));
        let first = &plan.matches[0];
        assert_eq!(first.entrant_1, Some(11));
        assert_eq!(first.seed_1, Some(1));
    }

    fn played(entrant_1: i64, entrant_2: i64, votes: (i64, i64), winner: i64) -> PlayedMatch {
        PlayedMatch {
            entrant_1,
            entrant_2,
            votes_1: votes.0,
            votes_2: votes.1,
            winner,
        }
    }

    #[test]
    fn test_standings_order() {
        let entrants = [1, 2, 3];
        let results = [
            played(1, 2, (2, 5), 2),
            played(1, 3, (4, 1), 1),
            played(2, 3, (0, 3), 3),
        ];
        let table = standings(&entrants, &results);
        // All on one win: votes received decide (1: 6, 2: 5, 3: 4).
        let order: Vec<i64> = table.iter().map(|s| s.entrant_id).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(table.iter().all(|s| s.played == 2 && s.wins == 1));
        assert_eq!(table[0].votes_against, 6);
    }

    #[test]
    fn test_standings_seed_breaks_full_tie() {
        let table = standings(&[9, 8], &[played(8, 9, (0, 0), 8)]);
        assert_eq!(table[0].entrant_id, 8);
        let table = standings(&[9, 8, 7], &[]);
        let order: Vec<i64> = table.iter().map(|s| s.entrant_id).collect();
        assert_eq!(order, vec![9, 8, 7]);
    }
}
