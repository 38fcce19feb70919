// Match voting: time-boxed windows, one vote per voter, and resolution by
// tally or explicit result.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::advancement::advance;
use super::{ensure_active, Engine};
use crate::db::{self, matches, Match, MatchStatus};
use crate::dedup::vote_marker_key;
use crate::error::{EngineError, Result};
use crate::events::CompetitionEvent;
use crate::metrics;

/// An accepted vote and the tally right after it was counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteReceipt {
    pub match_id: i64,
    pub entrant_id: i64,
    pub votes_entrant_1: i64,
    pub votes_entrant_2: i64,
}

/// Outcome of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Completion {
    Resolved {
        match_id: i64,
        winner_id: i64,
        loser_id: i64,
        competition_completed: bool,
    },
    /// Someone else resolved the match first; nothing was changed.
    AlreadyResolved { match_id: i64 },
}

impl Completion {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Completion::Resolved { .. })
    }
}

impl Engine {
    pub async fn open_voting(&self, match_id: i64, duration: Duration) -> Result<Match> {
        self.open_voting_at(match_id, duration, Utc::now()).await
    }

    /// Open a voting window of `duration` starting at `now`. Both entrant
    /// slots must be filled.
    pub async fn open_voting_at(
        &self,
        match_id: i64,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Match> {
        if duration <= Duration::zero() {
            return Err(EngineError::invalid_input("voting window must be positive"));
        }

        let mut tx = self.db.begin().await?;
        let m = matches::require_match(&mut tx, match_id).await?;
        let competition = db::require_competition(&mut tx, m.competition_id).await?;
        ensure_active(&competition)?;
        ensure_ready(&m)?;
        if !matches!(m.status, MatchStatus::Pending | MatchStatus::Scheduled) {
            return Err(EngineError::invalid_state(format!(
                "match {match_id} is {}, voting cannot open",
                m.status.as_str()
            )));
        }

        if !matches::start_voting(&mut tx, match_id, m.status, now, now + duration, now).await? {
            return Err(EngineError::invalid_state(format!(
                "match {match_id} changed state concurrently"
            )));
        }
        db::bump_current_round(&mut tx, m.competition_id, m.round_number).await?;
        let opened = matches::require_match(&mut tx, match_id).await?;
        tx.commit().await?;

        tracing::info!(
            competition_id = m.competition_id,
            "voting open on {} until {}",
            m.position,
            now + duration
        );
        self.publish_all(vec![CompetitionEvent::MatchVotingStarted {
            competition_id: m.competition_id,
            match_id,
        }]);
        Ok(opened)
    }

    pub async fn schedule_voting(
        &self,
        match_id: i64,
        opens_at: DateTime<Utc>,
        duration: Duration,
    ) -> Result<Match> {
        self.schedule_voting_at(match_id, opens_at, duration, Utc::now()).await
    }

    /// Reserve a future voting window; the deadline sweeper opens it once
    /// `opens_at` arrives.
    pub async fn schedule_voting_at(
        &self,
        match_id: i64,
        opens_at: DateTime<Utc>,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Match> {
        if duration <= Duration::zero() {
            return Err(EngineError::invalid_input("voting window must be positive"));
        }
        if opens_at <= now {
            return Err(EngineError::invalid_input(
                "scheduled window must open in the future",
            ));
        }

        let mut conn = self.db.acquire().await?;
        let m = matches::require_match(&mut conn, match_id).await?;
        let competition = db::require_competition(&mut conn, m.competition_id).await?;
        ensure_active(&competition)?;
        ensure_ready(&m)?;
        if m.status != MatchStatus::Pending {
            return Err(EngineError::invalid_state(format!(
                "match {match_id} is {}, only pending matches can be scheduled",
                m.status.as_str()
            )));
        }

        if !matches::schedule_window(&mut conn, match_id, opens_at, opens_at + duration).await? {
            return Err(EngineError::invalid_state(format!(
                "match {match_id} changed state concurrently"
            )));
        }
        tracing::info!(
            competition_id = m.competition_id,
            "voting on {} scheduled for {opens_at}",
            m.position
        );
        matches::require_match(&mut conn, match_id).await
    }

    /// Open a scheduled window whose start has arrived. Returns false if the
    /// match was no longer scheduled.
    pub(crate) async fn open_scheduled_at(&self, m: &Match, now: DateTime<Utc>) -> Result<bool> {
        let (Some(opens_at), Some(closes_at)) = (m.voting_opens_at, m.voting_closes_at) else {
            return Err(EngineError::inconsistent(format!(
                "scheduled match {} has no window",
                m.id
            )));
        };

        let mut tx = self.db.begin().await?;
        let opened = matches::start_voting(
            &mut tx,
            m.id,
            MatchStatus::Scheduled,
            opens_at,
            closes_at,
            now,
        )
        .await?;
        if !opened {
            return Ok(false);
        }
        db::bump_current_round(&mut tx, m.competition_id, m.round_number).await?;
        tx.commit().await?;

        tracing::info!(
            competition_id = m.competition_id,
            "scheduled voting opened on {}",
            m.position
        );
        self.publish_all(vec![CompetitionEvent::MatchVotingStarted {
            competition_id: m.competition_id,
            match_id: m.id,
        }]);
        Ok(true)
    }

    pub async fn submit_vote(
        &self,
        match_id: i64,
        entrant_id: i64,
        voter_id: &str,
    ) -> Result<VoteReceipt> {
        self.submit_vote_at(match_id, entrant_id, voter_id, Utc::now()).await
    }

    /// Count one vote for `entrant_id`. Each voter identity may vote once
    /// per match; the repeat is rejected with `DuplicateVote`.
    pub async fn submit_vote_at(
        &self,
        match_id: i64,
        entrant_id: i64,
        voter_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt> {
        let voter_id = voter_id.trim();
        if voter_id.is_empty() {
            return Err(EngineError::invalid_input("voter identity is empty"));
        }

        let mut conn = self.db.acquire().await?;
        let m = matches::require_match(&mut conn, match_id).await?;
        let closes_at = match (m.status, m.voting_opens_at, m.voting_closes_at) {
            (MatchStatus::Completed | MatchStatus::Bye, _, _) => {
                return Err(EngineError::VotingClosed(match_id));
            }
            (MatchStatus::Voting, Some(opens_at), Some(closes_at)) => {
                if now >= closes_at {
                    return Err(EngineError::VotingClosed(match_id));
                }
                if now < opens_at {
                    return Err(EngineError::invalid_state(format!(
                        "voting on match {match_id} has not opened yet"
                    )));
                }
                closes_at
            }
            _ => {
                return Err(EngineError::invalid_state(format!(
                    "match {match_id} is not open for voting"
                )));
            }
        };
        let competition = db::require_competition(&mut conn, m.competition_id).await?;
        ensure_active(&competition)?;
        let slot = m.slot_of(entrant_id).ok_or_else(|| {
            EngineError::invalid_input(format!(
                "entrant {entrant_id} is not playing in match {match_id}"
            ))
        })?;

        let key = vote_marker_key(match_id, voter_id);
        let expires_at = closes_at + self.settings.vote_marker_grace;
        if !self.markers.set_if_absent(&key, expires_at, now) {
            metrics::DUPLICATE_VOTES_TOTAL.inc();
            tracing::warn!(match_id, "duplicate vote rejected");
            return Err(EngineError::DuplicateVote { match_id });
        }

        let tally = match matches::increment_vote(&mut conn, match_id, slot).await {
            Ok(Some(tally)) => tally,
            Ok(None) => {
                self.markers.release(&key);
                return Err(EngineError::VotingClosed(match_id));
            }
            Err(e) => {
                self.markers.release(&key);
                return Err(e);
            }
        };

        metrics::VOTES_ACCEPTED_TOTAL.inc();
        tracing::debug!(match_id, "vote for entrant {entrant_id}, tally {}-{}", tally.0, tally.1);
        self.publish_all(vec![CompetitionEvent::MatchVoteSubmitted {
            match_id,
            entrant_id,
            voter_id: voter_id.to_string(),
        }]);

        Ok(VoteReceipt {
            match_id,
            entrant_id,
            votes_entrant_1: tally.0,
            votes_entrant_2: tally.1,
        })
    }

    pub async fn complete(
        &self,
        match_id: i64,
        explicit_winner: Option<i64>,
    ) -> Result<Completion> {
        self.complete_at(match_id, explicit_winner, Utc::now()).await
    }

    /// Resolve a match and advance its entrants. Without an explicit winner
    /// the tally decides, with ties going through the configured tie-break.
    /// Completing a match that is already resolved changes nothing and
    /// reports `AlreadyResolved`.
    pub async fn complete_at(
        &self,
        match_id: i64,
        explicit_winner: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Completion> {
        let mut tx = self.db.begin().await?;
        let m = matches::require_match(&mut tx, match_id).await?;
        if m.status.is_resolved() {
            tracing::debug!(match_id, "already resolved, completion ignored");
            return Ok(Completion::AlreadyResolved { match_id });
        }
        let competition = db::require_competition(&mut tx, m.competition_id).await?;
        ensure_active(&competition)?;
        ensure_ready(&m)?;

        let (winner_slot, resolution) = match explicit_winner {
            Some(winner) => {
                let slot = m.slot_of(winner).ok_or_else(|| {
                    EngineError::invalid_input(format!(
                        "entrant {winner} is not playing in match {match_id}"
                    ))
                })?;
                (slot, "explicit")
            }
            None if m.status == MatchStatus::Voting => (
                self.settings
                    .tie_break
                    .decide(m.votes_entrant_1, m.votes_entrant_2),
                "votes",
            ),
            None => {
                return Err(EngineError::invalid_state(format!(
                    "match {match_id} has no votes to tally, an explicit winner is required"
                )));
            }
        };
        // ensure_ready guarantees both slots are filled.
        let (Some(winner_id), Some(loser_id)) =
            (m.entrant(winner_slot), m.entrant(winner_slot.other()))
        else {
            return Err(EngineError::inconsistent(format!("match {match_id} lost an entrant")));
        };

        let won = matches::resolve(
            &mut tx,
            match_id,
            m.status,
            MatchStatus::Completed,
            winner_id,
            Some(loser_id),
            now,
        )
        .await?;
        if !won {
            tracing::warn!(match_id, "lost completion race, no changes made");
            return Ok(Completion::AlreadyResolved { match_id });
        }
        db::bump_current_round(&mut tx, m.competition_id, m.round_number).await?;

        let resolved = matches::require_match(&mut tx, match_id).await?;
        let mut events = vec![CompetitionEvent::MatchCompleted {
            competition_id: m.competition_id,
            match_id,
            winner_id,
            loser_id: Some(loser_id),
        }];
        if let Err(e) = advance(&mut tx, &competition, &resolved, now, &mut events).await {
            if matches!(e, EngineError::BracketInconsistent(_)) {
                tracing::error!(match_id, "advancement failed: {e}");
            }
            return Err(e);
        }
        tx.commit().await?;

        metrics::MATCHES_RESOLVED_TOTAL
            .with_label_values(&[resolution])
            .inc();
        tracing::info!(
            competition_id = m.competition_id,
            "{} won by entrant {winner_id} ({resolution}, {}-{})",
            m.position,
            m.votes_entrant_1,
            m.votes_entrant_2
        );
        let competition_completed = events
            .iter()
            .any(|e| matches!(e, CompetitionEvent::CompetitionCompleted { .. }));
        self.publish_all(events);

        Ok(Completion::Resolved {
            match_id,
            winner_id,
            loser_id,
            competition_completed,
        })
    }
}

fn ensure_ready(m: &Match) -> Result<()> {
    if !m.has_both_entrants() {
        return Err(EngineError::invalid_state(format!(
            "match {} ({}) does not have both entrants yet",
            m.id, m.position
        )));
    }
    Ok(())
}
