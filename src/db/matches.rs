// Match rows and the atomic primitives the engine relies on: slot fills,
// compare-and-set status changes and in-place vote increments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;

use crate::bracket::builder::MatchPlan;
use crate::bracket::routing::DropPolicy;
use crate::bracket::{BracketPosition, BracketType, Slot};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Scheduled,
    Voting,
    Completed,
    Bye,
}

impl MatchStatus {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scheduled" => Some(Self::Scheduled),
            "voting" => Some(Self::Voting),
            "completed" => Some(Self::Completed),
            "bye" => Some(Self::Bye),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Voting => "voting",
            Self::Completed => "completed",
            Self::Bye => "bye",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Completed | Self::Bye)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub id: i64,
    pub competition_id: i64,
    pub round_number: u32,
    pub position: BracketPosition,
    pub entrant_1_id: Option<i64>,
    pub seed_1: Option<u32>,
    pub entrant_2_id: Option<i64>,
    pub seed_2: Option<u32>,
    pub winner_id: Option<i64>,
    pub loser_id: Option<i64>,
    pub votes_entrant_1: i64,
    pub votes_entrant_2: i64,
    pub status: MatchStatus,
    pub voting_opens_at: Option<DateTime<Utc>>,
    pub voting_closes_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub receives_losers_from_round: Option<u32>,
}

impl Match {
    pub fn entrant(&self, slot: Slot) -> Option<i64> {
        match slot {
            Slot::First => self.entrant_1_id,
            Slot::Second => self.entrant_2_id,
        }
    }

    pub fn seed(&self, slot: Slot) -> Option<u32> {
        match slot {
            Slot::First => self.seed_1,
            Slot::Second => self.seed_2,
        }
    }

    pub fn votes(&self, slot: Slot) -> i64 {
        match slot {
            Slot::First => self.votes_entrant_1,
            Slot::Second => self.votes_entrant_2,
        }
    }

    /// Slot holding `entrant_id`, if that entrant plays in this match.
    pub fn slot_of(&self, entrant_id: i64) -> Option<Slot> {
        if self.entrant_1_id == Some(entrant_id) {
            Some(Slot::First)
        } else if self.entrant_2_id == Some(entrant_id) {
            Some(Slot::Second)
        } else {
            None
        }
    }

    pub fn has_both_entrants(&self) -> bool {
        self.entrant_1_id.is_some() && self.entrant_2_id.is_some()
    }

    pub fn bracket_type(&self) -> BracketType {
        self.position.bracket
    }

    pub fn match_number(&self) -> u32 {
        self.position.match_number
    }

    pub fn bracket_position(&self) -> String {
        self.position.to_string()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MatchRow {
    id: i64,
    competition_id: i64,
    round_number: i64,
    bracket_type: String,
    bracket_round: i64,
    match_number: i64,
    entrant_1_id: Option<i64>,
    seed_1: Option<i64>,
    entrant_2_id: Option<i64>,
    seed_2: Option<i64>,
    winner_id: Option<i64>,
    loser_id: Option<i64>,
    votes_entrant_1: i64,
    votes_entrant_2: i64,
    status: String,
    voting_opens_at: Option<DateTime<Utc>>,
    voting_closes_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    receives_losers_from_round: Option<i64>,
}

impl TryFrom<MatchRow> for Match {
    type Error = EngineError;

    fn try_from(row: MatchRow) -> Result<Self> {
        let bracket = BracketType::from_str_name(&row.bracket_type).ok_or_else(|| {
            EngineError::CorruptRecord(format!(
                "match {}: unknown bracket type '{}'",
                row.id, row.bracket_type
            ))
        })?;
        let status = MatchStatus::from_str_name(&row.status).ok_or_else(|| {
            EngineError::CorruptRecord(format!("match {}: unknown status '{}'", row.id, row.status))
        })?;

        Ok(Match {
            id: row.id,
            competition_id: row.competition_id,
            round_number: row.round_number as u32,
            position: BracketPosition {
                bracket,
                round: row.bracket_round as u32,
                match_number: row.match_number as u32,
            },
            entrant_1_id: row.entrant_1_id,
            seed_1: row.seed_1.map(|s| s as u32),
            entrant_2_id: row.entrant_2_id,
            seed_2: row.seed_2.map(|s| s as u32),
            winner_id: row.winner_id,
            loser_id: row.loser_id,
            votes_entrant_1: row.votes_entrant_1,
            votes_entrant_2: row.votes_entrant_2,
            status,
            voting_opens_at: row.voting_opens_at,
            voting_closes_at: row.voting_closes_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            receives_losers_from_round: row.receives_losers_from_round.map(|r| r as u32),
        })
    }
}

fn decode_all(rows: Vec<MatchRow>) -> Result<Vec<Match>> {
    rows.into_iter().map(Match::try_from).collect()
}

// ── Reads ─────────────────────────────────────────────────────────────

pub async fn get_match(conn: &mut SqliteConnection, id: i64) -> Result<Option<Match>> {
    let row = sqlx::query_as::<_, MatchRow>("SELECT * FROM matches WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Match::try_from).transpose()
}

pub async fn require_match(conn: &mut SqliteConnection, id: i64) -> Result<Match> {
    get_match(conn, id).await?.ok_or(EngineError::MatchNotFound(id))
}

pub async fn find_by_position(
    conn: &mut SqliteConnection,
    competition_id: i64,
    position: &BracketPosition,
) -> Result<Option<Match>> {
    let row = sqlx::query_as::<_, MatchRow>(
        "SELECT * FROM matches WHERE competition_id = ? AND bracket_type = ? AND bracket_round = ? AND match_number = ?",
    )
    .bind(competition_id)
    .bind(position.bracket.as_str())
    .bind(position.round as i64)
    .bind(position.match_number as i64)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Match::try_from).transpose()
}

pub async fn list_for_competition(
    conn: &mut SqliteConnection,
    competition_id: i64,
) -> Result<Vec<Match>> {
    let rows = sqlx::query_as::<_, MatchRow>(
        "SELECT * FROM matches WHERE competition_id = ? ORDER BY round_number, match_number",
    )
    .bind(competition_id)
    .fetch_all(&mut *conn)
    .await?;
    decode_all(rows)
}

/// Number of matches in a competition that have not been resolved yet.
pub async fn count_unresolved(conn: &mut SqliteConnection, competition_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM matches WHERE competition_id = ? AND status NOT IN ('completed', 'bye')",
    )
    .bind(competition_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Losers-bracket match that should receive a dropped loser, following the
/// receiving round's slot policy. Ordered by match number.
pub async fn find_open_losers_slot(
    conn: &mut SqliteConnection,
    competition_id: i64,
    losers_round: u32,
    from_winners_round: u32,
    policy: DropPolicy,
) -> Result<Option<(Match, Slot)>> {
    let sql = match policy {
        DropPolicy::FirstOpenSlot => {
            "SELECT * FROM matches WHERE competition_id = ? AND bracket_type = 'losers' AND bracket_round = ? AND receives_losers_from_round = ? AND status = 'pending' AND (entrant_1_id IS NULL OR entrant_2_id IS NULL) ORDER BY match_number LIMIT 1"
        }
        DropPolicy::SecondSlot => {
            "SELECT * FROM matches WHERE competition_id = ? AND bracket_type = 'losers' AND bracket_round = ? AND receives_losers_from_round = ? AND status = 'pending' AND entrant_2_id IS NULL ORDER BY match_number LIMIT 1"
        }
    };
    let row = sqlx::query_as::<_, MatchRow>(sql)
        .bind(competition_id)
        .bind(losers_round as i64)
        .bind(from_winners_round as i64)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(m) = row.map(Match::try_from).transpose()? else {
        return Ok(None);
    };
    let slot = match policy {
        DropPolicy::FirstOpenSlot if m.entrant_1_id.is_none() => Slot::First,
        _ => Slot::Second,
    };
    Ok(Some((m, slot)))
}

/// Matches with an open or scheduled voting window in active competitions.
pub async fn list_windowed(conn: &mut SqliteConnection) -> Result<Vec<Match>> {
    let rows = sqlx::query_as::<_, MatchRow>(
        "SELECT m.* FROM matches m JOIN competitions c ON c.id = m.competition_id WHERE c.status = 'active' AND m.status IN ('voting', 'scheduled') ORDER BY m.voting_closes_at, m.id",
    )
    .fetch_all(&mut *conn)
    .await?;
    decode_all(rows)
}

// ── Writes ────────────────────────────────────────────────────────────

pub async fn insert_match(
    conn: &mut SqliteConnection,
    competition_id: i64,
    plan: &MatchPlan,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO matches (competition_id, round_number, bracket_type, bracket_round, match_number, entrant_1_id, seed_1, entrant_2_id, seed_2, receives_losers_from_round) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(competition_id)
    .bind(plan.round_number as i64)
    .bind(plan.position.bracket.as_str())
    .bind(plan.position.round as i64)
    .bind(plan.position.match_number as i64)
    .bind(plan.entrant_1)
    .bind(plan.seed_1.map(i64::from))
    .bind(plan.entrant_2)
    .bind(plan.seed_2.map(i64::from))
    .bind(plan.receives_losers_from_round.map(i64::from))
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn delete_for_competition(
    conn: &mut SqliteConnection,
    competition_id: i64,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM matches WHERE competition_id = ?")
        .bind(competition_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_match(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM matches WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Place an entrant into an empty slot of a pending match. Returns false if
/// the slot was already taken or the match has moved on.
pub async fn fill_slot(
    conn: &mut SqliteConnection,
    match_id: i64,
    slot: Slot,
    entrant_id: i64,
    seed: Option<u32>,
) -> Result<bool> {
    let sql = match slot {
        Slot::First => {
            "UPDATE matches SET entrant_1_id = ?, seed_1 = ? WHERE id = ? AND entrant_1_id IS NULL AND status = 'pending'"
        }
        Slot::Second => {
            "UPDATE matches SET entrant_2_id = ?, seed_2 = ? WHERE id = ? AND entrant_2_id IS NULL AND status = 'pending'"
        }
    };
    let result = sqlx::query(sql)
        .bind(entrant_id)
        .bind(seed.map(i64::from))
        .bind(match_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Move a ready match (both slots filled) from `from` into `voting`.
pub async fn start_voting(
    conn: &mut SqliteConnection,
    match_id: i64,
    from: MatchStatus,
    opens_at: DateTime<Utc>,
    closes_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE matches SET status = 'voting', voting_opens_at = ?, voting_closes_at = ?, started_at = ? WHERE id = ? AND status = ? AND entrant_1_id IS NOT NULL AND entrant_2_id IS NOT NULL",
    )
    .bind(opens_at)
    .bind(closes_at)
    .bind(now)
    .bind(match_id)
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reserve a future voting window on a ready pending match.
pub async fn schedule_window(
    conn: &mut SqliteConnection,
    match_id: i64,
    opens_at: DateTime<Utc>,
    closes_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE matches SET status = 'scheduled', voting_opens_at = ?, voting_closes_at = ? WHERE id = ? AND status = 'pending' AND entrant_1_id IS NOT NULL AND entrant_2_id IS NOT NULL",
    )
    .bind(opens_at)
    .bind(closes_at)
    .bind(match_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record the outcome of a match, but only if it is still in `from`. The
/// caller that wins this compare-and-set owns advancement.
pub async fn resolve(
    conn: &mut SqliteConnection,
    match_id: i64,
    from: MatchStatus,
    to: MatchStatus,
    winner_id: i64,
    loser_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE matches SET status = ?, winner_id = ?, loser_id = ?, completed_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(winner_id)
    .bind(loser_id)
    .bind(now)
    .bind(match_id)
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Add one vote for `slot` in place. Returns the new tally, or `None` if the
/// match is not accepting votes.
pub async fn increment_vote(
    conn: &mut SqliteConnection,
    match_id: i64,
    slot: Slot,
) -> Result<Option<(i64, i64)>> {
    let sql = match slot {
        Slot::First => {
            "UPDATE matches SET votes_entrant_1 = votes_entrant_1 + 1 WHERE id = ? AND status = 'voting' RETURNING votes_entrant_1, votes_entrant_2"
        }
        Slot::Second => {
            "UPDATE matches SET votes_entrant_2 = votes_entrant_2 + 1 WHERE id = ? AND status = 'voting' RETURNING votes_entrant_1, votes_entrant_2"
        }
    };
    let tally = sqlx::query_as::<_, (i64, i64)>(sql)
        .bind(match_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(tally)
}
