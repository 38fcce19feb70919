// Shared helpers for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use festival_brackets::bracket::{CompetitionFormat, ResolutionMethod, Slot};
use festival_brackets::db::{Database, Match, MatchStatus, NewCompetition};
use festival_brackets::events::EventBus;
use festival_brackets::{Engine, EngineSettings};
use uuid::Uuid;

pub async fn test_engine() -> Engine {
    let db = Database::new("sqlite::memory:").await.unwrap();
    Engine::new(Arc::new(db), EventBus::new(1024), EngineSettings::default())
}

/// A database file under the system temp dir, removed on drop along with
/// its WAL side files.
pub struct TempDatabase {
    path: PathBuf,
}

impl TempDatabase {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("brackets_{}.sqlite", Uuid::new_v4()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path.display())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// An engine on a file-backed database with a real connection pool, so
/// concurrent calls run on separate connections.
pub async fn file_engine(file: &TempDatabase) -> Engine {
    let db = Database::connect(&file.url(), 5).await.unwrap();
    Engine::new(Arc::new(db), EventBus::new(1024), EngineSettings::default())
}

pub async fn new_competition(engine: &Engine, format: CompetitionFormat) -> i64 {
    engine
        .create_competition(NewCompetition {
            event_id: Some(1),
            name: format!("{} showdown", format.as_str()),
            description: String::new(),
            format,
            resolution_method: ResolutionMethod::HeadToHeadVote,
        })
        .await
        .unwrap()
        .id
}

/// Entrant ids 1..=n, ranked in id order.
pub fn ranked(n: i64) -> Vec<i64> {
    (1..=n).collect()
}

/// Complete every playable match with an explicit winner chosen by `pick`
/// until nothing is left to play. Returns the final match list.
pub async fn play_out(
    engine: &Engine,
    competition_id: i64,
    pick: impl Fn(&Match) -> Slot,
) -> Vec<Match> {
    for _ in 0..500 {
        let ready: Vec<Match> = engine
            .list_matches(competition_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.status == MatchStatus::Pending && m.has_both_entrants())
            .collect();
        if ready.is_empty() {
            return engine.list_matches(competition_id).await.unwrap();
        }
        for m in ready {
            let winner = m.entrant(pick(&m)).unwrap();
            let completion = engine.complete(m.id, Some(winner)).await.unwrap();
            assert!(completion.is_resolved(), "match {} did not resolve", m.id);
        }
    }
    panic!("competition {competition_id} never ran out of playable matches");
}

/// The better-seeded (lower id) entrant always wins.
pub fn favourite(m: &Match) -> Slot {
    if m.entrant_1_id.unwrap() < m.entrant_2_id.unwrap() {
        Slot::First
    } else {
        Slot::Second
    }
}

/// Completed matches lost by `entrant_id`.
pub fn losses(matches: &[Match], entrant_id: i64) -> usize {
    matches
        .iter()
        .filter(|m| m.status == MatchStatus::Completed && m.loser_id == Some(entrant_id))
        .count()
}
