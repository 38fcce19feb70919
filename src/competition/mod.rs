// Stateful competition services: lifecycle, advancement, voting and the
// deadline sweeper, all hanging off one cheaply cloneable `Engine` handle.

pub mod advancement;
pub mod lifecycle;
pub mod sweeper;
pub mod voting;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::bracket::Slot;
use crate::db::{Competition, CompetitionStatus, Database};
use crate::dedup::{InMemoryMarkerStore, VoteMarkerStore};
use crate::error::{EngineError, Result};
use crate::events::{CompetitionEvent, EventBus};

pub use lifecycle::BuildSummary;
pub use sweeper::{spawn_deadline_sweeper, SweepReport};
pub use voting::{Completion, VoteReceipt};

/// How a vote-resolved match with equal tallies is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Entrant 1 wins ties. Slot 1 holds the better seed in most
    /// construction paths.
    #[default]
    FirstSlot,
    /// Fair coin.
    CoinFlip,
}

impl TieBreak {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "first_slot" => Some(Self::FirstSlot),
            "coin_flip" => Some(Self::CoinFlip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstSlot => "first_slot",
            Self::CoinFlip => "coin_flip",
        }
    }

    /// Winning slot for a final tally.
    pub fn decide(&self, votes_1: i64, votes_2: i64) -> Slot {
        if votes_1 > votes_2 {
            return Slot::First;
        }
        if votes_2 > votes_1 {
            return Slot::Second;
        }
        match self {
            TieBreak::FirstSlot => Slot::First,
            TieBreak::CoinFlip => {
                if rand::random::<bool>() {
                    Slot::First
                } else {
                    Slot::Second
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub tie_break: TieBreak,
    /// Voter markers outlive the voting window by this much.
    pub vote_marker_grace: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::FirstSlot,
            vote_marker_grace: chrono::Duration::minutes(5),
        }
    }
}

/// Handle to the bracket engine. Holds no competition state of its own;
/// every operation takes explicit ids and works against the database.
#[derive(Clone)]
pub struct Engine {
    db: Arc<Database>,
    events: EventBus,
    markers: Arc<dyn VoteMarkerStore>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(db: Arc<Database>, events: EventBus, settings: EngineSettings) -> Self {
        Self {
            db,
            events,
            markers: Arc::new(InMemoryMarkerStore::new()),
            settings,
        }
    }

    /// Swap in a shared voter marker store.
    pub fn with_marker_store(mut self, markers: Arc<dyn VoteMarkerStore>) -> Self {
        self.markers = markers;
        self
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompetitionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish_all(&self, events: Vec<CompetitionEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }
}

/// Reject match mutations on competitions that are not running.
pub(crate) fn ensure_active(competition: &Competition) -> Result<()> {
    if competition.status != CompetitionStatus::Active {
        return Err(EngineError::invalid_state(format!(
            "competition {} is {}, not active",
            competition.id,
            competition.status.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_tally_wins() {
        assert_eq!(TieBreak::FirstSlot.decide(2, 5), Slot::Second);
        assert_eq!(TieBreak::FirstSlot.decide(5, 2), Slot::First);
        assert_eq!(TieBreak::CoinFlip.decide(0, 1), Slot::Second);
    }

    #[test]
    fn test_tie_goes_to_first_slot() {
        assert_eq!(TieBreak::FirstSlot.decide(3, 3), Slot::First);
        assert_eq!(TieBreak::FirstSlot.decide(0, 0), Slot::First);
    }

    #[test]
    fn test_coin_flip_lands_on_a_slot() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(TieBreak::CoinFlip.decide(4, 4));
        }
        assert!(seen.contains(&Slot::First));
        assert!(seen.contains(&Slot::Second));
    }

    #[test]
    fn test_tie_break_names() {
        assert_eq!(TieBreak::from_str_name("coin_flip"), Some(TieBreak::CoinFlip));
        assert_eq!(TieBreak::FirstSlot.as_str(), "first_slot");
        assert_eq!(TieBreak::from_str_name("revote"), None);
    }
}
