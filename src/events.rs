// Fire-and-forget competition events for notification, real-time display and
// audit consumers.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompetitionEvent {
    CompetitionCompleted {
        competition_id: i64,
        winner_id: i64,
        runner_up_id: Option<i64>,
    },
    MatchVotingStarted {
        competition_id: i64,
        match_id: i64,
    },
    MatchVoteSubmitted {
        match_id: i64,
        entrant_id: i64,
        voter_id: String,
    },
    MatchCompleted {
        competition_id: i64,
        match_id: i64,
        winner_id: i64,
        loser_id: Option<i64>,
    },
}

/// Broadcast fan-out. Publishing never blocks and never fails the caller:
/// with no subscribers the event is dropped, slow subscribers see `Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CompetitionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompetitionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: CompetitionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Log every event until the bus is dropped. Used by the binary.
pub fn spawn_event_logger(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(target: "brackets::events", "{json}"),
                    Err(e) => tracing::warn!("failed to serialize event: {e}"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event logger lagged, {n} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
