//! Wire protocol shared by the trivia duel server and terminal client.
//!
//! Everything that crosses the socket lives here: the client and server event
//! enums, the question and score records they carry, and the framing helpers
//! in [`codec`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod codec;

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8080;
pub const STARTING_RATING: i32 = 1000;

pub type PlayerId = u32;
pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    Ranked,
    Unranked,
    Training,
}

impl GameMode {
    /// Number of players a session of this mode binds.
    pub fn seats(&self) -> usize {
        match self {
            GameMode::Training => 1,
            GameMode::Ranked | GameMode::Unranked => 2,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameMode::Ranked => "ranked",
            GameMode::Unranked => "unranked",
            GameMode::Training => "training",
        };
        f.write_str(name)
    }
}

/// What a player asks the matchmaker for when connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchRequest {
    Ranked,
    Direct { invite_token: String },
    Training,
}

impl MatchRequest {
    pub fn mode(&self) -> GameMode {
        match self {
            MatchRequest::Ranked => GameMode::Ranked,
            MatchRequest::Direct { .. } => GameMode::Unranked,
            MatchRequest::Training => GameMode::Training,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A single trivia question as issued to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub choices: Vec<String>,
    pub correct_choice: usize,
    pub time_limit_ms: u64,
    pub difficulty: Difficulty,
    pub category: String,
}

impl Question {
    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct_choice
    }

    /// A question is usable when it has at least two choices and the correct
    /// index points at one of them.
    pub fn is_well_formed(&self) -> bool {
        self.choices.len() >= 2 && self.correct_choice < self.choices.len() && self.time_limit_ms > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Player(PlayerId),
    Draw,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AlreadyQueued,
    QuestionSourceUnavailable,
    DuplicateAnswer,
    RoundClosed,
    AllPlayersDisconnected,
    InvalidEvent,
    LifelineUnavailable,
    RebindRejected,
    UnsupportedVersion,
    SessionNotFound,
}

impl ErrorKind {
    /// Soft errors reject a single input; the rest end the player's session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::QuestionSourceUnavailable
                | ErrorKind::AllPlayersDisconnected
                | ErrorKind::UnsupportedVersion
                | ErrorKind::SessionNotFound
                | ErrorKind::AlreadyQueued
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::AlreadyQueued => "already queued or in a match",
            ErrorKind::QuestionSourceUnavailable => "questions could not be loaded",
            ErrorKind::DuplicateAnswer => "question already answered",
            ErrorKind::RoundClosed => "round is closed",
            ErrorKind::AllPlayersDisconnected => "all players disconnected",
            ErrorKind::InvalidEvent => "invalid event",
            ErrorKind::LifelineUnavailable => "fifty-fifty is not available",
            ErrorKind::RebindRejected => "could not rejoin the session",
            ErrorKind::UnsupportedVersion => "unsupported client version",
            ErrorKind::SessionNotFound => "session not found",
        };
        f.write_str(text)
    }
}

/// Events sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    Hello {
        client_version: u32,
        player_id: PlayerId,
        name: String,
        rating: Option<i32>,
        request: MatchRequest,
    },
    Resume {
        client_version: u32,
        player_id: PlayerId,
        session_id: SessionId,
    },
    Answer {
        question_index: usize,
        choice_index: usize,
    },
    FiftyFifty {
        question_index: usize,
    },
    Leave,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    Queued {
        mode: GameMode,
    },
    MatchFound {
        session_id: SessionId,
        mode: GameMode,
        opponent_name: Option<String>,
    },
    Resumed {
        session_id: SessionId,
        round_index: usize,
        cumulative_scores: Vec<PlayerScore>,
    },
    QuestionIssued {
        round_index: usize,
        text: String,
        choices: Vec<String>,
        time_limit_ms: u64,
    },
    OpponentAnswered {
        round_index: usize,
    },
    FiftyFiftyResult {
        round_index: usize,
        removed_choices: Vec<usize>,
    },
    RoundResult {
        round_index: usize,
        your_answer: Option<usize>,
        correct_choice_index: usize,
        points_awarded: u32,
        cumulative_scores: Vec<PlayerScore>,
    },
    SessionEnded {
        final_scores: Vec<PlayerScore>,
        winner: Winner,
        rating_delta: Option<i32>,
    },
    Error {
        kind: ErrorKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_question() -> Question {
        Question {
            text: "Largest planet?".to_string(),
            choices: vec!["Mars".into(), "Jupiter".into(), "Venus".into()],
            correct_choice: 1,
            time_limit_ms: 10_000,
            difficulty: Difficulty::Easy,
            category: "Science".to_string(),
        }
    }

    #[test]
    fn test_match_request_modes() {
        assert_eq!(MatchRequest::Ranked.mode(), GameMode::Ranked);
        assert_eq!(
            MatchRequest::Direct {
                invite_token: "abc".into()
            }
            .mode(),
            GameMode::Unranked
        );
        assert_eq!(MatchRequest::Training.mode(), GameMode::Training);
    }

    #[test]
    fn test_mode_seats() {
        assert_eq!(GameMode::Training.seats(), 1);
        assert_eq!(GameMode::Ranked.seats(), 2);
        assert_eq!(GameMode::Unranked.seats(), 2);
    }

    #[test]
    fn test_question_correctness() {
        let question = sample_question();
        assert!(question.is_correct(1));
        assert!(!question.is_correct(0));
        assert!(question.is_well_formed());
    }

    #[test]
    fn test_malformed_questions() {
        let mut question = sample_question();
        question.correct_choice = 3;
        assert!(!question.is_well_formed());

        let mut question = sample_question();
        question.choices.truncate(1);
        question.correct_choice = 0;
        assert!(!question.is_well_formed());

        let mut question = sample_question();
        question.time_limit_ms = 0;
        assert!(!question.is_well_formed());
    }

    #[test]
    fn test_error_kind_severity() {
        assert!(!ErrorKind::DuplicateAnswer.is_fatal());
        assert!(!ErrorKind::RoundClosed.is_fatal());
        assert!(!ErrorKind::LifelineUnavailable.is_fatal());
        assert!(ErrorKind::AllPlayersDisconnected.is_fatal());
        assert!(ErrorKind::QuestionSourceUnavailable.is_fatal());
    }

    #[test]
    fn test_session_ended_serialization() {
        let event = ServerEvent::SessionEnded {
            final_scores: vec![PlayerScore {
                player_id: 7,
                name: "ada".into(),
                score: 300,
            }],
            winner: Winner::Player(7),
            rating_delta: Some(16),
        };

        let serialized = bincode::serialize(&event).unwrap();
        let deserialized: ServerEvent = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_hello_serialization() {
        let event = ClientEvent::Hello {
            client_version: PROTOCOL_VERSION,
            player_id: 42,
            name: "grace".into(),
            rating: None,
            request: MatchRequest::Direct {
                invite_token: "room-1".into(),
            },
        };

        let serialized = bincode::serialize(&event).unwrap();
        let deserialized: ClientEvent = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, event);
    }
}
