// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::competition::{EngineSettings, TieBreak};

/// Shortest and longest allowed sweep interval, in seconds.
const SWEEP_INTERVAL_BOUNDS: (u64, u64) = (1, 300);

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Maximum pooled database connections.
    pub db_max_connections: u32,
    /// How often the deadline sweeper runs.
    pub sweep_interval: Duration,
    /// Run a single sweep and exit (for cron-style schedulers).
    pub run_once: bool,
    /// How tied vote tallies are decided.
    pub tie_break: TieBreak,
    /// Extra lifetime of a voter marker beyond the voting window.
    pub vote_marker_grace: Duration,
    /// Events buffered per subscriber before it starts lagging.
    pub event_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:brackets.db?mode=rwc`)
    /// - `DB_MAX_CONNECTIONS` - pool size (default: 5)
    /// - `SWEEP_INTERVAL_SECS` - deadline sweep interval (default: 60, clamped to 1..=300)
    /// - `BRACKET_TIE_BREAK` - `first_slot` or `coin_flip` (default: `first_slot`)
    /// - `VOTE_MARKER_GRACE_SECS` - voter marker grace period (default: 300)
    /// - `EVENT_BUFFER` - event channel capacity (default: 256)
    ///
    /// CLI flags:
    /// - `--sweep-interval <SECS>` - Override the sweep interval
    /// - `--once` - Run one sweep and exit
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let database_url =
            env("DATABASE_URL").unwrap_or_else(|| "sqlite:brackets.db?mode=rwc".to_string());

        let db_max_connections = env("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        // Interval: CLI flag takes precedence, then env var, then default
        let (min, max) = SWEEP_INTERVAL_BOUNDS;
        let sweep_secs = Self::parse_cli_value(args, "--sweep-interval")
            .and_then(|v| v.parse::<u64>().ok())
            .or_else(|| env("SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()))
            .unwrap_or(60)
            .clamp(min, max);

        let tie_break = match env("BRACKET_TIE_BREAK") {
            Some(v) => TieBreak::from_str_name(&v).unwrap_or_else(|| {
                tracing::warn!("unknown BRACKET_TIE_BREAK '{v}', using first_slot");
                TieBreak::FirstSlot
            }),
            None => TieBreak::FirstSlot,
        };

        let vote_marker_grace = env("VOTE_MARKER_GRACE_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        let event_buffer = env("EVENT_BUFFER")
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);

        Config {
            database_url,
            db_max_connections,
            sweep_interval: Duration::from_secs(sweep_secs),
            run_once: args.iter().any(|a| a == "--once"),
            tie_break,
            vote_marker_grace,
            event_buffer,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            tie_break: self.tie_break,
            vote_marker_grace: chrono::Duration::from_std(self.vote_marker_grace)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Parse a CLI flag value like `--sweep-interval 30`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}
