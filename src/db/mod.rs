// Database access layer (SQLite via sqlx).

pub mod matches;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Sqlite, Transaction};

use crate::bracket::{BracketConfig, CompetitionFormat, ResolutionMethod};
use crate::error::{EngineError, Result};

pub use matches::{Match, MatchStatus};

// ── Competition model ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionStatus {
    Setup,
    Registration,
    Seeding,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl CompetitionStatus {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "setup" => Some(Self::Setup),
            "registration" => Some(Self::Registration),
            "seeding" => Some(Self::Seeding),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Registration => "registration",
            Self::Seeding => "seeding",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// States from which a bracket may be (re)built.
    pub fn accepts_build(&self) -> bool {
        matches!(self, Self::Setup | Self::Registration | Self::Seeding)
    }

    /// Every edge of the lifecycle state machine, including the ones only the
    /// engine itself takes (bracket built, champion declared).
    pub fn can_transition_to(&self, target: Self) -> bool {
        use CompetitionStatus::*;
        match (*self, target) {
            (Setup, Registration) | (Registration, Seeding) => true,
            (Setup | Registration | Seeding, Active) => true,
            (Active, Paused) | (Paused, Active) => true,
            (Active, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Input for creating a competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompetition {
    #[serde(default)]
    pub event_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub format: CompetitionFormat,
    pub resolution_method: ResolutionMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct Competition {
    pub id: i64,
    pub event_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub format: CompetitionFormat,
    pub resolution_method: ResolutionMethod,
    pub status: CompetitionStatus,
    pub rounds_total: u32,
    pub current_round: u32,
    pub winner_id: Option<i64>,
    pub runner_up_id: Option<i64>,
    pub config: BracketConfig,
    /// Ranked entrant list the bracket was built from (index 0 = top seed).
    pub entrants: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct CompetitionRow {
    id: i64,
    event_id: Option<i64>,
    name: String,
    description: String,
    format: String,
    resolution_method: String,
    status: String,
    rounds_total: i64,
    current_round: i64,
    winner_id: Option<i64>,
    runner_up_id: Option<i64>,
    config: String,
    entrants: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<CompetitionRow> for Competition {
    type Error = EngineError;

    fn try_from(row: CompetitionRow) -> Result<Self> {
        let corrupt = |field: &str, value: &str| {
            EngineError::CorruptRecord(format!(
                "competition {}: unknown {field} '{value}'",
                row.id
            ))
        };
        let format = CompetitionFormat::from_str_name(&row.format)
            .ok_or_else(|| corrupt("format", &row.format))?;
        let resolution_method = ResolutionMethod::from_str_name(&row.resolution_method)
            .ok_or_else(|| corrupt("resolution method", &row.resolution_method))?;
        let status = CompetitionStatus::from_str_name(&row.status)
            .ok_or_else(|| corrupt("status", &row.status))?;

        Ok(Competition {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            description: row.description,
            format,
            resolution_method,
            status,
            rounds_total: row.rounds_total as u32,
            current_round: row.current_round as u32,
            winner_id: row.winner_id,
            runner_up_id: row.runner_up_id,
            config: serde_json::from_str(&row.config)?,
            entrants: serde_json::from_str(&row.entrants)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

// ── Pool and migrations ───────────────────────────────────────────────

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 5).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        // Every connection to `:memory:` is a separate database, so keep
        // exactly one alive for the lifetime of the pool.
        let in_memory = database_url.contains(":memory:");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await?
        };

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                format TEXT NOT NULL,
                resolution_method TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'setup',
                rounds_total INTEGER NOT NULL DEFAULT 0,
                current_round INTEGER NOT NULL DEFAULT 0,
                winner_id INTEGER,
                runner_up_id INTEGER,
                config TEXT NOT NULL DEFAULT '{}',
                entrants TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                competition_id INTEGER NOT NULL REFERENCES competitions(id) ON DELETE CASCADE,
                round_number INTEGER NOT NULL,
                bracket_type TEXT NOT NULL,
                bracket_round INTEGER NOT NULL,
                match_number INTEGER NOT NULL,
                entrant_1_id INTEGER,
                seed_1 INTEGER,
                entrant_2_id INTEGER,
                seed_2 INTEGER,
                winner_id INTEGER,
                loser_id INTEGER,
                votes_entrant_1 INTEGER NOT NULL DEFAULT 0 CHECK (votes_entrant_1 >= 0),
                votes_entrant_2 INTEGER NOT NULL DEFAULT 0 CHECK (votes_entrant_2 >= 0),
                status TEXT NOT NULL DEFAULT 'pending',
                voting_opens_at TEXT,
                voting_closes_at TEXT,
                started_at TEXT,
                completed_at TEXT,
                receives_losers_from_round INTEGER,
                UNIQUE(competition_id, bracket_type, bracket_round, match_number)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status, competition_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a write transaction. `BEGIN IMMEDIATE` takes the write lock up
    /// front, so a second writer waits on the busy timeout and then sees the
    /// first one's changes instead of failing to upgrade a read lock.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    // ── Competition CRUD ──────────────────────────────────────────────

    pub async fn create_competition(
        &self,
        new: &NewCompetition,
        now: DateTime<Utc>,
    ) -> Result<Competition> {
        if new.name.trim().is_empty() {
            return Err(EngineError::invalid_input("competition name is empty"));
        }
        let row = sqlx::query_as::<_, CompetitionRow>(
            "INSERT INTO competitions (event_id, name, description, format, resolution_method, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(new.event_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.format.as_str())
        .bind(new.resolution_method.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    pub async fn get_competition(&self, id: i64) -> Result<Option<Competition>> {
        let mut conn = self.acquire().await?;
        get_competition(&mut conn, id).await
    }

    pub async fn list_competitions(&self, event_id: Option<i64>) -> Result<Vec<Competition>> {
        let rows = sqlx::query_as::<_, CompetitionRow>(
            "SELECT * FROM competitions WHERE (? IS NULL OR event_id = ?) ORDER BY id",
        )
        .bind(event_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Competition::try_from).collect()
    }
}

// ── Connection-level competition queries ──────────────────────────────
//
// These take a bare connection so they can run inside a caller's
// transaction as well as on a pooled connection.

pub async fn get_competition(conn: &mut SqliteConnection, id: i64) -> Result<Option<Competition>> {
    let row = sqlx::query_as::<_, CompetitionRow>("SELECT * FROM competitions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Competition::try_from).transpose()
}

pub async fn require_competition(conn: &mut SqliteConnection, id: i64) -> Result<Competition> {
    get_competition(conn, id)
        .await?
        .ok_or(EngineError::CompetitionNotFound(id))
}

/// Move a buildable competition to `active` with its freshly computed shape.
/// Returns false if the competition was not in a buildable state.
pub async fn activate_built(
    conn: &mut SqliteConnection,
    id: i64,
    rounds_total: u32,
    config: &BracketConfig,
    entrants: &[i64],
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE competitions SET status = 'active', rounds_total = ?, current_round = 1, config = ?, entrants = ?, winner_id = NULL, runner_up_id = NULL, updated_at = ? WHERE id = ? AND status IN ('setup', 'registration', 'seeding')",
    )
    .bind(rounds_total as i64)
    .bind(serde_json::to_string(config)?)
    .bind(serde_json::to_string(entrants)?)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Compare-and-set status change. Returns false if the status was not `from`.
pub async fn set_status(
    conn: &mut SqliteConnection,
    id: i64,
    from: CompetitionStatus,
    to: CompetitionStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE competitions SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(now)
            .bind(id)
            .bind(from.as_str())
            .execute(&mut *conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Declare the outcome of an active competition. Returns false if it was no
/// longer active.
pub async fn complete_competition(
    conn: &mut SqliteConnection,
    id: i64,
    winner_id: i64,
    runner_up_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE competitions SET status = 'completed', winner_id = ?, runner_up_id = ?, completed_at = ?, updated_at = ? WHERE id = ? AND status = 'active'",
    )
    .bind(winner_id)
    .bind(runner_up_id)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Raise `current_round` to at least `round`; never lowers it.
pub async fn bump_current_round(conn: &mut SqliteConnection, id: i64, round: u32) -> Result<()> {
    sqlx::query("UPDATE competitions SET current_round = MAX(current_round, ?) WHERE id = ?")
        .bind(round as i64)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn new_competition(name: &str) -> NewCompetition {
        NewCompetition {
            event_id: Some(7),
            name: name.to_string(),
            description: "battle of the bands".to_string(),
            format: CompetitionFormat::SingleElimination,
            resolution_method: ResolutionMethod::HeadToHeadVote,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_competition() {
        let db = test_db().await;
        let now = Utc::now();

        let c = db.create_competition(&new_competition("Finals"), now).await.unwrap();
        assert_eq!(c.name, "Finals");
        assert_eq!(c.status, CompetitionStatus::Setup);
        assert_eq!(c.current_round, 0);
        assert_eq!(c.config, BracketConfig::default());
        assert!(c.entrants.is_empty());

        let fetched = db.get_competition(c.id).await.unwrap().unwrap();
        assert_eq!(fetched.format, CompetitionFormat::SingleElimination);
        assert_eq!(fetched.event_id, Some(7));

        assert!(db.get_competition(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_competitions_by_event() {
        let db = test_db().await;
        let now = Utc::now();
        db.create_competition(&new_competition("A"), now).await.unwrap();
        let mut other = new_competition("B");
        other.event_id = Some(8);
        db.create_competition(&other, now).await.unwrap();

        assert_eq!(db.list_competitions(None).await.unwrap().len(), 2);
        let for_eight = db.list_competitions(Some(8)).await.unwrap();
        assert_eq!(for_eight.len(), 1);
        assert_eq!(for_eight[0].name, "B");
    }

    #[tokio::test]
    async fn test_rejects_empty_name() {
        let db = test_db().await;
        let err = db
            .create_competition(&new_competition("  "), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_status_compare_and_set() {
        let db = test_db().await;
        let now = Utc::now();
        let c = db.create_competition(&new_competition("CAS"), now).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        use CompetitionStatus::{Cancelled, Registration, Setup};
        assert!(set_status(&mut conn, c.id, Setup, Registration, now)
            .await
            .unwrap());
        assert!(!set_status(&mut conn, c.id, Setup, Cancelled, now)
            .await
            .unwrap());
        let c = require_competition(&mut conn, c.id).await.unwrap();
        assert_eq!(c.status, CompetitionStatus::Registration);
    }

    #[tokio::test]
    async fn test_current_round_never_decreases() {
        let db = test_db().await;
        let c = db
            .create_competition(&new_competition("Rounds"), Utc::now())
            .await
            .unwrap();
        let mut conn = db.acquire().await.unwrap();

        bump_current_round(&mut conn, c.id, 3).await.unwrap();
        bump_current_round(&mut conn, c.id, 2).await.unwrap();
        let c = require_competition(&mut conn, c.id).await.unwrap();
        assert_eq!(c.current_round, 3);
    }

    #[tokio::test]
    async fn test_complete_requires_active() {
        let db = test_db().await;
        let now = Utc::now();
        let c = db.create_competition(&new_competition("Done"), now).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        assert!(!complete_competition(&mut conn, c.id, 1, None, now).await.unwrap());
        let config = BracketConfig {
            bracket_size: 2,
            entrant_count: 2,
            winners_rounds: 1,
            ..Default::default()
        };
        assert!(activate_built(&mut conn, c.id, 1, &config, &[1, 2], now).await.unwrap());
        assert!(complete_competition(&mut conn, c.id, 1, Some(2), now).await.unwrap());
        assert!(!complete_competition(&mut conn, c.id, 2, Some(1), now).await.unwrap());

        let c = require_competition(&mut conn, c.id).await.unwrap();
        assert_eq!(c.status, CompetitionStatus::Completed);
        assert_eq!(c.winner_id, Some(1));
        assert_eq!(c.runner_up_id, Some(2));
        assert_eq!(c.entrants, vec![1, 2]);
        assert!(c.completed_at.is_some());
    }

    #[test]
    fn test_state_machine_edges() {
        use CompetitionStatus::*;
        assert!(Setup.can_transition_to(Registration));
        assert!(Seeding.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Paused.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Setup));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Setup));
        assert!(Registration.accepts_build());
        assert!(!Active.accepts_build());
    }
}
