// Competition bracket engine: seeding, single/double elimination and round
// robin brackets, advancement, match voting and deadline sweeping.

pub mod bracket;
pub mod competition;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod events;
pub mod metrics;
pub mod view;

pub use competition::{Completion, Engine, EngineSettings, SweepReport, TieBreak, VoteReceipt};
pub use error::{EngineError, ErrorKind};
