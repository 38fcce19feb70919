// Competition lifecycle: creation, externally driven state transitions and
// bracket construction.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::advancement::{played_match, resolve_bye};
use super::Engine;
use crate::bracket::builder::plan_bracket;
use crate::bracket::round_robin::{standings, Standing};
use crate::bracket::CompetitionFormat;
use crate::db::{
    self, matches, Competition, CompetitionStatus, Match, MatchStatus, NewCompetition,
};
use crate::error::{EngineError, Result};
use crate::metrics;

/// What a successful bracket build produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub competition_id: i64,
    pub format: CompetitionFormat,
    pub rounds_total: u32,
    pub matches_created: usize,
    pub byes: usize,
}

impl Engine {
    pub async fn create_competition(&self, new: NewCompetition) -> Result<Competition> {
        let competition = self.db.create_competition(&new, Utc::now()).await?;
        tracing::info!(
            competition_id = competition.id,
            "competition '{}' created ({})",
            competition.name,
            competition.format.as_str()
        );
        Ok(competition)
    }

    pub async fn get_competition(&self, competition_id: i64) -> Result<Competition> {
        self.db
            .get_competition(competition_id)
            .await?
            .ok_or(EngineError::CompetitionNotFound(competition_id))
    }

    pub async fn get_match(&self, match_id: i64) -> Result<Match> {
        let mut conn = self.db.acquire().await?;
        matches::require_match(&mut conn, match_id).await
    }

    /// All matches of a competition ordered by round, then match number.
    pub async fn list_matches(&self, competition_id: i64) -> Result<Vec<Match>> {
        let mut conn = self.db.acquire().await?;
        db::require_competition(&mut conn, competition_id).await?;
        matches::list_for_competition(&mut conn, competition_id).await
    }

    /// Take one of the externally driven lifecycle edges: open registration,
    /// start seeding, pause, resume or cancel. `active` is otherwise entered
    /// only by building a bracket and `completed` only by declaring a winner.
    pub async fn transition(
        &self,
        competition_id: i64,
        target: CompetitionStatus,
    ) -> Result<Competition> {
        let mut conn = self.db.acquire().await?;
        let competition = db::require_competition(&mut conn, competition_id).await?;
        let from = competition.status;

        if target == CompetitionStatus::Completed {
            return Err(EngineError::invalid_state(
                "a competition completes only when a winner is declared",
            ));
        }
        if target == CompetitionStatus::Active && from != CompetitionStatus::Paused {
            return Err(EngineError::invalid_state(
                "a competition becomes active by building its bracket",
            ));
        }
        if !from.can_transition_to(target) {
            return Err(EngineError::invalid_state(format!(
                "competition {competition_id} cannot go from {} to {}",
                from.as_str(),
                target.as_str()
            )));
        }

        if !db::set_status(&mut conn, competition_id, from, target, Utc::now()).await? {
            tracing::warn!(competition_id, "status changed concurrently, transition dropped");
            return Err(EngineError::invalid_state(format!(
                "competition {competition_id} changed state concurrently"
            )));
        }
        tracing::info!(
            competition_id,
            "competition {} -> {}",
            from.as_str(),
            target.as_str()
        );
        db::require_competition(&mut conn, competition_id).await
    }

    pub async fn build_bracket(
        &self,
        competition_id: i64,
        entrants: &[i64],
    ) -> Result<BuildSummary> {
        self.build_bracket_at(competition_id, entrants, Utc::now()).await
    }

    /// Build the bracket from ranked entrants (index 0 = top seed) and
    /// activate the competition. Any match rows already stored for the
    /// competition are deleted and the new ones written in one transaction;
    /// first-round byes are advanced before it commits. An active
    /// competition never returns to a buildable state, so the delete only
    /// clears rows written outside the engine.
    pub async fn build_bracket_at(
        &self,
        competition_id: i64,
        entrants: &[i64],
        now: DateTime<Utc>,
    ) -> Result<BuildSummary> {
        let competition = self.get_competition(competition_id).await?;
        if !competition.status.accepts_build() {
            return Err(EngineError::invalid_state(format!(
                "cannot build a bracket for a competition in {}",
                competition.status.as_str()
            )));
        }
        let plan = plan_bracket(competition.format, entrants)?;

        let mut tx = self.db.begin().await?;
        let activated = db::activate_built(
            &mut tx,
            competition_id,
            plan.rounds_total,
            &plan.config,
            entrants,
            now,
        )
        .await?;
        if !activated {
            return Err(EngineError::invalid_state(format!(
                "competition {competition_id} changed state during the build"
            )));
        }

        let removed = matches::delete_for_competition(&mut tx, competition_id).await?;
        if removed > 0 {
            tracing::warn!(competition_id, "build: removed {removed} leftover matches");
        }

        let mut byes = Vec::new();
        for m in &plan.matches {
            let id = matches::insert_match(&mut tx, competition_id, m).await?;
            if let Some(winner) = m.bye_winner {
                byes.push((id, winner));
            }
        }

        // Advancement reads the shape back from the activated row.
        let active = db::require_competition(&mut tx, competition_id).await?;
        let mut events = Vec::new();
        for (match_id, winner) in &byes {
            resolve_bye(&mut tx, &active, *match_id, *winner, now, &mut events).await?;
        }
        tx.commit().await?;

        metrics::BRACKETS_BUILT_TOTAL
            .with_label_values(&[plan.format.as_str()])
            .inc();
        tracing::info!(
            competition_id,
            "{} bracket built: {} entrants, {} matches, {} byes, {} rounds",
            plan.format.as_str(),
            entrants.len(),
            plan.matches.len(),
            byes.len(),
            plan.rounds_total
        );
        self.publish_all(events);

        Ok(BuildSummary {
            competition_id,
            format: plan.format,
            rounds_total: plan.rounds_total,
            matches_created: plan.matches.len(),
            byes: byes.len(),
        })
    }

    /// Current table from every match resolved by a result (byes excluded),
    /// ordered by wins, votes received and seed.
    pub async fn standings(&self, competition_id: i64) -> Result<Vec<Standing>> {
        let mut conn = self.db.acquire().await?;
        let competition = db::require_competition(&mut conn, competition_id).await?;
        let played = matches::list_for_competition(&mut conn, competition_id)
            .await?
            .iter()
            .filter(|m| m.status == MatchStatus::Completed)
            .map(played_match)
            .collect::<Result<Vec<_>>>()?;
        Ok(standings(&competition.entrants, &played))
    }
}
