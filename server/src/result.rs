//! Records produced by a session: answers, per-round results and the final
//! session result handed to the recorder.

use serde::{Deserialize, Serialize};
use shared::{GameMode, PlayerId, PlayerScore, SessionId, Winner};

/// One player's answer to one round. `choice` is `None` when the player did
/// not answer before the round closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub player_id: PlayerId,
    pub question_index: usize,
    pub choice: Option<usize>,
    /// Milliseconds between round start and submission
    pub elapsed_ms: u64,
}

impl Answer {
    pub fn no_answer(player_id: PlayerId, question_index: usize, elapsed_ms: u64) -> Self {
        Self {
            player_id,
            question_index,
            choice: None,
            elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredAnswer {
    pub answer: Answer,
    pub correct: bool,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_index: usize,
    pub correct_choice: usize,
    /// Ordered by player id
    pub answers: Vec<ScoredAnswer>,
    pub cumulative_scores: Vec<PlayerScore>,
}

impl RoundRecord {
    pub fn answer_of(&self, player_id: PlayerId) -> Option<&ScoredAnswer> {
        self.answers.iter().find(|a| a.answer.player_id == player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDelta {
    pub player_id: PlayerId,
    pub rating_before: i32,
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub final_scores: Vec<PlayerScore>,
    pub winner: Winner,
    pub rounds: Vec<RoundRecord>,
    pub rating_deltas: Vec<RatingDelta>,
}

impl SessionResult {
    pub fn score_of(&self, player_id: PlayerId) -> Option<u32> {
        self.final_scores
            .iter()
            .find(|s| s.player_id == player_id)
            .map(|s| s.score)
    }

    pub fn delta_of(&self, player_id: PlayerId) -> Option<i32> {
        self.rating_deltas
            .iter()
            .find(|d| d.player_id == player_id)
            .map(|d| d.delta)
    }

    /// Sum of the points awarded to `player_id` across every round.
    pub fn points_awarded(&self, player_id: PlayerId) -> u32 {
        self.rounds
            .iter()
            .filter_map(|round| round.answer_of(player_id))
            .map(|a| a.points)
            .sum()
    }
}

/// Picks the winner from final scores: the strictly highest score wins,
/// otherwise the game is a draw. A single player always wins.
pub fn decide_winner(scores: &[PlayerScore]) -> Winner {
    match scores {
        [] => Winner::Abandoned,
        [solo] => Winner::Player(solo.player_id),
        _ => {
            let best = scores.iter().map(|s| s.score).max().unwrap_or(0);
            let mut leaders = scores.iter().filter(|s| s.score == best);
            match (leaders.next(), leaders.next()) {
                (Some(leader), None) => Winner::Player(leader.player_id),
                _ => Winner::Draw,
            }
        }
    }
}
