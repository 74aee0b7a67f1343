use log::debug;
use shared::{ErrorKind, GameMode, PlayerId, PlayerScore, ServerEvent, SessionId, Winner};

/// The question currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub round_index: usize,
    pub text: String,
    pub choices: Vec<String>,
    pub time_limit_ms: u64,
    /// Choices struck out by the fifty-fifty lifeline
    pub removed: Vec<usize>,
    pub answered: Option<usize>,
    pub opponent_answered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finish {
    pub final_scores: Vec<PlayerScore>,
    pub winner: Winner,
    pub rating_delta: Option<i32>,
}

/// Client-side mirror of a session, rebuilt only from server events.
#[derive(Debug, Clone)]
pub struct GameView {
    pub player_id: PlayerId,
    pub session_id: Option<SessionId>,
    pub mode: Option<GameMode>,
    pub opponent: Option<String>,
    pub question: Option<QuestionView>,
    pub scores: Vec<PlayerScore>,
    pub lifeline_used: bool,
    pub finish: Option<Finish>,
    pub last_error: Option<ErrorKind>,
}

impl GameView {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            session_id: None,
            mode: None,
            opponent: None,
            question: None,
            scores: Vec::new(),
            lifeline_used: false,
            finish: None,
            last_error: None,
        }
    }

    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Queued { mode } => {
                self.mode = Some(*mode);
            }

            ServerEvent::MatchFound {
                session_id,
                mode,
                opponent_name,
            } => {
                self.session_id = Some(*session_id);
                self.mode = Some(*mode);
                self.opponent = opponent_name.clone();
            }

            ServerEvent::Resumed {
                session_id,
                cumulative_scores,
                ..
            } => {
                self.session_id = Some(*session_id);
                self.scores = cumulative_scores.clone();
                self.question = None;
            }

            ServerEvent::QuestionIssued {
                round_index,
                text,
                choices,
                time_limit_ms,
            } => {
                self.question = Some(QuestionView {
                    round_index: *round_index,
                    text: text.clone(),
                    choices: choices.clone(),
                    time_limit_ms: *time_limit_ms,
                    removed: Vec::new(),
                    answered: None,
                    opponent_answered: false,
                });
            }

            ServerEvent::OpponentAnswered { round_index } => {
                if let Some(question) = self.open_question_mut(*round_index) {
                    question.opponent_answered = true;
                }
            }

            ServerEvent::FiftyFiftyResult {
                round_index,
                removed_choices,
            } => {
                self.lifeline_used = true;
                if let Some(question) = self.open_question_mut(*round_index) {
                    question.removed = removed_choices.clone();
                }
            }

            ServerEvent::RoundResult {
                round_index,
                cumulative_scores,
                ..
            } => {
                self.scores = cumulative_scores.clone();
                if self.open_question_mut(*round_index).is_some() {
                    self.question = None;
                }
            }

            ServerEvent::SessionEnded {
                final_scores,
                winner,
                rating_delta,
            } => {
                self.scores = final_scores.clone();
                self.question = None;
                self.finish = Some(Finish {
                    final_scores: final_scores.clone(),
                    winner: *winner,
                    rating_delta: *rating_delta,
                });
            }

            ServerEvent::Error { kind } => {
                debug!("Server rejected input: {}", kind);
                self.last_error = Some(*kind);
            }
        }
    }

    fn open_question_mut(&mut self, round_index: usize) -> Option<&mut QuestionView> {
        self.question
            .as_mut()
            .filter(|q| q.round_index == round_index)
    }

    pub fn my_score(&self) -> u32 {
        self.scores
            .iter()
            .find(|s| s.player_id == self.player_id)
            .map_or(0, |s| s.score)
    }

    pub fn can_answer(&self) -> bool {
        self.question.as_ref().map_or(false, |q| q.answered.is_none())
    }

    /// Choice indices still selectable on the open question.
    pub fn available_choices(&self) -> Vec<usize> {
        match &self.question {
            Some(q) => (0..q.choices.len()).filter(|i| !q.removed.contains(i)).collect(),
            None => Vec::new(),
        }
    }

    pub fn mark_answered(&mut self, choice: usize) {
        if let Some(question) = self.question.as_mut() {
            question.answered = Some(choice);
        }
    }

    pub fn is_over(&self) -> bool {
        self.finish.is_some() || self.last_error.map_or(false, |k| k.is_fatal())
    }
}
