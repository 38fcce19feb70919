// Engine error type shared by every bracket, voting and lifecycle operation.

use thiserror::Error;

/// Coarse classification used by callers to pick a user-facing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient storage failure; the caller may try again.
    Retryable,
    /// The request is not allowed in the current state or with these inputs.
    NotAllowed,
    /// The request was already performed (duplicate vote).
    AlreadyDone,
    /// The referenced competition or match does not exist.
    NotFound,
    /// Persisted data is inconsistent; needs operator attention.
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("competition {0} not found")]
    CompetitionNotFound(i64),

    #[error("match {0} not found")]
    MatchNotFound(i64),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("voter has already voted on match {match_id}")]
    DuplicateVote { match_id: i64 },

    #[error("voting on match {0} is closed")]
    VotingClosed(i64),

    #[error("bracket inconsistency: {0}")]
    BracketInconsistent(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput(_)
            | EngineError::InvalidState(_)
            | EngineError::VotingClosed(_) => ErrorKind::NotAllowed,
            EngineError::DuplicateVote { .. } => ErrorKind::AlreadyDone,
            EngineError::CompetitionNotFound(_) | EngineError::MatchNotFound(_) => {
                ErrorKind::NotFound
            }
            EngineError::BracketInconsistent(_) | EngineError::CorruptRecord(_) => {
                ErrorKind::Internal
            }
            EngineError::Storage(_) => ErrorKind::Retryable,
        }
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        EngineError::InvalidState(msg.into())
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        EngineError::BracketInconsistent(msg.into())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::CorruptRecord(format!("invalid bracket config: {e}"))
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
