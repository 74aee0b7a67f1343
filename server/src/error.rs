//! Error taxonomy for matchmaking, sessions and their collaborators.

use shared::ErrorKind;
use thiserror::Error;

/// Rejection of a single player input. The session state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("answer already submitted for this round")]
    DuplicateAnswer,
    #[error("round is closed for input")]
    RoundClosed,
    #[error("event is not valid in the current state")]
    InvalidEvent,
    #[error("lifeline not available")]
    LifelineUnavailable,
    #[error("rebind rejected")]
    RebindRejected,
    #[error("player is not part of this session")]
    UnknownPlayer,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::DuplicateAnswer => ErrorKind::DuplicateAnswer,
            SessionError::RoundClosed => ErrorKind::RoundClosed,
            SessionError::InvalidEvent | SessionError::UnknownPlayer => ErrorKind::InvalidEvent,
            SessionError::LifelineUnavailable => ErrorKind::LifelineUnavailable,
            SessionError::RebindRejected => ErrorKind::RebindRejected,
        }
    }
}

/// Why a session ended in `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("question source unavailable")]
    QuestionSourceUnavailable,
    #[error("all players disconnected")]
    AllPlayersDisconnected,
}

impl AbortReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AbortReason::QuestionSourceUnavailable => ErrorKind::QuestionSourceUnavailable,
            AbortReason::AllPlayersDisconnected => ErrorKind::AllPlayersDisconnected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchmakingError {
    #[error("player {0} is already queued or matched")]
    AlreadyQueued(shared::PlayerId),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("only {available} questions match, {requested} requested")]
    NotEnoughQuestions { requested: usize, available: usize },
    #[error("question source returned {returned} questions, {requested} requested")]
    WrongBatchSize { requested: usize, returned: usize },
    #[error("malformed question at index {0}")]
    MalformedQuestion(usize),
    #[error("question source timed out")]
    Timeout,
    #[error("could not load question bank: {0}")]
    Load(String),
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("session {0} already recorded")]
    Duplicate(shared::SessionId),
    #[error("recorder did not acknowledge in time")]
    Timeout,
    #[error("recorder unavailable: {0}")]
    Unavailable(String),
}
