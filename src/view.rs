// Read model for displaying a bracket: matches grouped by bracket and round,
// entrants resolved to display names through the entrant directory.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bracket::{BracketType, CompetitionFormat, Slot};
use crate::competition::Engine;
use crate::db::{Competition, CompetitionStatus, Match, MatchStatus};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrantProfile {
    pub id: i64,
    pub name: String,
    pub photo_url: Option<String>,
}

/// Read-only lookup of performer display data. Bracket logic never needs it.
pub trait EntrantDirectory: Send + Sync {
    fn lookup(&self, entrant_id: i64) -> Option<EntrantProfile>;
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<i64, EntrantProfile>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i64, name: impl Into<String>, photo_url: Option<String>) {
        self.entries.insert(
            id,
            EntrantProfile {
                id,
                name: name.into(),
                photo_url,
            },
        );
    }
}

impl EntrantDirectory for StaticDirectory {
    fn lookup(&self, entrant_id: i64) -> Option<EntrantProfile> {
        self.entries.get(&entrant_id).cloned()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrantView {
    pub id: i64,
    pub name: String,
    pub photo_url: Option<String>,
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub id: i64,
    pub bracket_position: String,
    pub round_number: u32,
    pub match_number: u32,
    pub status: MatchStatus,
    pub entrant_1: Option<EntrantView>,
    pub entrant_2: Option<EntrantView>,
    pub votes_entrant_1: i64,
    pub votes_entrant_2: i64,
    pub winner_id: Option<i64>,
    pub voting_closes_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    /// Round within the bracket section.
    pub round: u32,
    pub matches: Vec<MatchView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BracketSection {
    pub bracket: BracketType,
    pub rounds: Vec<RoundView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BracketView {
    pub competition_id: i64,
    pub name: String,
    pub format: CompetitionFormat,
    pub status: CompetitionStatus,
    pub current_round: u32,
    pub rounds_total: u32,
    pub winner: Option<EntrantView>,
    pub runner_up: Option<EntrantView>,
    pub sections: Vec<BracketSection>,
}

fn entrant_view(directory: &dyn EntrantDirectory, id: i64, seed: Option<u32>) -> EntrantView {
    match directory.lookup(id) {
        Some(profile) => EntrantView {
            id,
            name: profile.name,
            photo_url: profile.photo_url,
            seed,
        },
        None => EntrantView {
            id,
            name: format!("Entrant {id}"),
            photo_url: None,
            seed,
        },
    }
}

fn match_view(directory: &dyn EntrantDirectory, m: &Match) -> MatchView {
    let slot_view = |slot: Slot| {
        m.entrant(slot)
            .map(|id| entrant_view(directory, id, m.seed(slot)))
    };
    MatchView {
        id: m.id,
        bracket_position: m.bracket_position(),
        round_number: m.round_number,
        match_number: m.match_number(),
        status: m.status,
        entrant_1: slot_view(Slot::First),
        entrant_2: slot_view(Slot::Second),
        votes_entrant_1: m.votes_entrant_1,
        votes_entrant_2: m.votes_entrant_2,
        winner_id: m.winner_id,
        voting_closes_at: m.voting_closes_at,
    }
}

pub fn build_view(
    competition: &Competition,
    matches: &[Match],
    directory: &dyn EntrantDirectory,
) -> BracketView {
    let mut grouped: BTreeMap<BracketType, BTreeMap<u32, Vec<MatchView>>> = BTreeMap::new();
    for m in matches {
        grouped
            .entry(m.bracket_type())
            .or_default()
            .entry(m.position.round)
            .or_default()
            .push(match_view(directory, m));
    }

    let sections = grouped
        .into_iter()
        .map(|(bracket, rounds)| BracketSection {
            bracket,
            rounds: rounds
                .into_iter()
                .map(|(round, mut matches)| {
                    matches.sort_by_key(|m| m.match_number);
                    RoundView { round, matches }
                })
                .collect(),
        })
        .collect();

    BracketView {
        competition_id: competition.id,
        name: competition.name.clone(),
        format: competition.format,
        status: competition.status,
        current_round: competition.current_round,
        rounds_total: competition.rounds_total,
        winner: competition
            .winner_id
            .map(|id| entrant_view(directory, id, None)),
        runner_up: competition
            .runner_up_id
            .map(|id| entrant_view(directory, id, None)),
        sections,
    }
}

impl Engine {
    pub async fn bracket_view(
        &self,
        competition_id: i64,
        directory: &dyn EntrantDirectory,
    ) -> Result<BracketView> {
        let competition = self.get_competition(competition_id).await?;
        let matches = self.list_matches(competition_id).await?;
        Ok(build_view(&competition, &matches, directory))
    }
}
