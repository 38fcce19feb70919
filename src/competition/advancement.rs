// Advancement: moves the winner (and in double elimination the loser) of a
// resolved match into the next match, resolves single-entrant matches as
// byes on arrival and declares the champion.
//
// Everything here runs on the caller's connection, normally inside the
// transaction that resolved the match, so a failure anywhere rolls back
// the whole chain.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::sqlite::SqliteConnection;

use crate::bracket::round_robin::{standings, PlayedMatch};
use crate::bracket::routing::{
    expected_entrants, route_loser, route_winner, LoserRoute, WinnerRoute,
};
use crate::bracket::{BracketPosition, BracketType, Slot};
use crate::db::{self, matches, Competition, Match, MatchStatus};
use crate::error::{EngineError, Result};
use crate::events::CompetitionEvent;
use crate::metrics;

/// Route the outcome of `resolved`, which must already be `completed` or
/// `bye` with a winner recorded. Events produced along the way are pushed
/// onto `events` for the caller to publish after commit.
pub fn advance<'a>(
    conn: &'a mut SqliteConnection,
    competition: &'a Competition,
    resolved: &'a Match,
    now: DateTime<Utc>,
    events: &'a mut Vec<CompetitionEvent>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let winner = resolved.winner_id.ok_or_else(|| {
            EngineError::inconsistent(format!("match {} resolved without a winner", resolved.id))
        })?;
        let winner_slot = resolved.slot_of(winner).ok_or_else(|| {
            EngineError::inconsistent(format!(
                "winner {winner} of match {} holds no slot",
                resolved.id
            ))
        })?;

        let route = route_winner(
            competition.format,
            &competition.config,
            &resolved.position,
            winner_slot,
        )?;
        match route {
            WinnerRoute::Advance { position, slot } => {
                let seed = resolved.seed(winner_slot);
                place_entrant(conn, competition, &position, slot, winner, seed, now, events).await?;
            }
            WinnerRoute::ResetMatch => {
                open_reset_match(conn, competition, resolved).await?;
            }
            WinnerRoute::Champion => {
                if resolved.bracket_type() == BracketType::GrandFinals {
                    drop_reset_match(conn, competition).await?;
                }
                declare_champion(conn, competition, winner, resolved.loser_id, now, events).await?;
            }
            WinnerRoute::Terminal => {
                finish_round_robin_if_done(conn, competition, now, events).await?;
            }
        }

        let Some(loser) = resolved.loser_id else {
            return Ok(());
        };
        // The grand-finals loser is not out while a reset is pending.
        if route == WinnerRoute::ResetMatch {
            return Ok(());
        }
        let loser_seed = resolved.seed(winner_slot.other());
        match route_loser(competition.format, &competition.config, &resolved.position) {
            LoserRoute::Eliminated => {
                tracing::debug!(
                    competition_id = competition.id,
                    "entrant {loser} eliminated at {}",
                    resolved.position
                );
            }
            LoserRoute::Advance { position, slot } => {
                place_entrant(conn, competition, &position, slot, loser, loser_seed, now, events)
                    .await?;
            }
            LoserRoute::DropIn {
                losers_round,
                policy,
            } => {
                let (target, slot) = matches::find_open_losers_slot(
                    conn,
                    competition.id,
                    losers_round,
                    resolved.position.round,
                    policy,
                )
                .await?
                .ok_or_else(|| {
                    EngineError::inconsistent(format!(
                        "no open slot in losers round {losers_round} for the loser of {}",
                        resolved.position
                    ))
                })?;
                settle_into(conn, competition, target, slot, loser, loser_seed, now, events).await?;
            }
        }
        Ok(())
    })
}

/// Fill `slot` of the match at `position`.
#[allow(clippy::too_many_arguments)]
async fn place_entrant(
    conn: &mut SqliteConnection,
    competition: &Competition,
    position: &BracketPosition,
    slot: Slot,
    entrant_id: i64,
    seed: Option<u32>,
    now: DateTime<Utc>,
    events: &mut Vec<CompetitionEvent>,
) -> Result<()> {
    let target = matches::find_by_position(conn, competition.id, position)
        .await?
        .ok_or_else(|| {
            tracing::error!(
                competition_id = competition.id,
                "advancement target {position} is missing"
            );
            EngineError::inconsistent(format!("advancement target {position} is missing"))
        })?;
    settle_into(conn, competition, target, slot, entrant_id, seed, now, events).await
}

/// Fill a slot of `target`, then resolve it as a bye if nobody else can
/// ever reach it.
#[allow(clippy::too_many_arguments)]
async fn settle_into(
    conn: &mut SqliteConnection,
    competition: &Competition,
    target: Match,
    slot: Slot,
    entrant_id: i64,
    seed: Option<u32>,
    now: DateTime<Utc>,
    events: &mut Vec<CompetitionEvent>,
) -> Result<()> {
    if !matches::fill_slot(conn, target.id, slot, entrant_id, seed).await? {
        tracing::error!(
            competition_id = competition.id,
            "slot {slot:?} of {} is not open for entrant {entrant_id}",
            target.position
        );
        return Err(EngineError::inconsistent(format!(
            "slot {slot:?} of {} is not open",
            target.position
        )));
    }
    tracing::debug!(
        competition_id = competition.id,
        "entrant {entrant_id} placed in {} slot {slot:?}",
        target.position
    );

    if expected_entrants(&competition.config, &target.position) == 1 {
        resolve_bye(conn, competition, target.id, entrant_id, now, events).await?;
    }
    Ok(())
}

/// Resolve a single-entrant match in favour of its entrant and advance.
pub(crate) async fn resolve_bye(
    conn: &mut SqliteConnection,
    competition: &Competition,
    match_id: i64,
    entrant_id: i64,
    now: DateTime<Utc>,
    events: &mut Vec<CompetitionEvent>,
) -> Result<()> {
    let resolved_now = matches::resolve(
        conn,
        match_id,
        MatchStatus::Pending,
        MatchStatus::Bye,
        entrant_id,
        None,
        now,
    )
    .await?;
    if !resolved_now {
        return Err(EngineError::inconsistent(format!(
            "match {match_id} could not be resolved as a bye"
        )));
    }
    metrics::MATCHES_RESOLVED_TOTAL.with_label_values(&["bye"]).inc();

    let resolved = matches::require_match(conn, match_id).await?;
    tracing::debug!(
        competition_id = competition.id,
        "bye: entrant {entrant_id} advances from {}",
        resolved.position
    );
    advance(conn, competition, &resolved, now, events).await
}

/// Grand finals went to the losers-bracket entrant: both finalists now have
/// one loss and meet again.
async fn open_reset_match(
    conn: &mut SqliteConnection,
    competition: &Competition,
    grand_finals: &Match,
) -> Result<()> {
    let position = BracketPosition::grand_finals_reset();
    let reset = matches::find_by_position(conn, competition.id, &position)
        .await?
        .ok_or_else(|| EngineError::inconsistent("grand-finals-reset match is missing"))?;

    for slot in [Slot::First, Slot::Second] {
        let entrant = grand_finals.entrant(slot).ok_or_else(|| {
            EngineError::inconsistent(format!("grand finals resolved without slot {slot:?}"))
        })?;
        if !matches::fill_slot(conn, reset.id, slot, entrant, grand_finals.seed(slot)).await? {
            return Err(EngineError::inconsistent(
                "grand-finals-reset was already populated",
            ));
        }
    }
    tracing::info!(
        competition_id = competition.id,
        "grand finals reset: match {} is ready",
        reset.id
    );
    Ok(())
}

/// The undefeated finalist won grand finals; the reset is never played.
async fn drop_reset_match(conn: &mut SqliteConnection, competition: &Competition) -> Result<()> {
    let position = BracketPosition::grand_finals_reset();
    if let Some(reset) = matches::find_by_position(conn, competition.id, &position).await? {
        matches::delete_match(conn, reset.id).await?;
        tracing::debug!(competition_id = competition.id, "grand-finals-reset not needed");
    }
    Ok(())
}

async fn finish_round_robin_if_done(
    conn: &mut SqliteConnection,
    competition: &Competition,
    now: DateTime<Utc>,
    events: &mut Vec<CompetitionEvent>,
) -> Result<()> {
    if matches::count_unresolved(conn, competition.id).await? > 0 {
        return Ok(());
    }

    let played = matches::list_for_competition(conn, competition.id)
        .await?
        .iter()
        .map(played_match)
        .collect::<Result<Vec<_>>>()?;
    let table = standings(&competition.entrants, &played);
    let winner = table
        .first()
        .ok_or_else(|| EngineError::inconsistent("round robin finished without entrants"))?;
    let runner_up = table.get(1).map(|s| s.entrant_id);
    declare_champion(conn, competition, winner.entrant_id, runner_up, now, events).await
}

pub(crate) fn played_match(m: &Match) -> Result<PlayedMatch> {
    match (m.entrant_1_id, m.entrant_2_id, m.winner_id) {
        (Some(entrant_1), Some(entrant_2), Some(winner)) => Ok(PlayedMatch {
            entrant_1,
            entrant_2,
            votes_1: m.votes_entrant_1,
            votes_2: m.votes_entrant_2,
            winner,
        }),
        _ => Err(EngineError::inconsistent(format!(
            "round-robin match {} is incomplete",
            m.id
        ))),
    }
}

async fn declare_champion(
    conn: &mut SqliteConnection,
    competition: &Competition,
    winner_id: i64,
    runner_up_id: Option<i64>,
    now: DateTime<Utc>,
    events: &mut Vec<CompetitionEvent>,
) -> Result<()> {
    if !db::complete_competition(conn, competition.id, winner_id, runner_up_id, now).await? {
        return Err(EngineError::invalid_state(format!(
            "competition {} is no longer active",
            competition.id
        )));
    }
    metrics::COMPETITIONS_COMPLETED_TOTAL
        .with_label_values(&[competition.format.as_str()])
        .inc();
    tracing::info!(
        competition_id = competition.id,
        "competition '{}' won by entrant {winner_id}",
        competition.name
    );
    events.push(CompetitionEvent::CompetitionCompleted {
        competition_id: competition.id,
        winner_id,
        runner_up_id,
    });
    Ok(())
}
