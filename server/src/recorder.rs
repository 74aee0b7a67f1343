//! Result recording and the in-memory leaderboard.

use crate::error::RecordError;
use crate::result::SessionResult;
use async_trait::async_trait;
use log::info;
use shared::{GameMode, PlayerId, SessionId, Winner, STARTING_RATING};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[async_trait]
pub trait ResultRecorder: Send + Sync {
    /// Persists a finished session. Returning `Ok` acknowledges it.
    async fn record(&self, result: &SessionResult) -> Result<(), RecordError>;

    /// Current stored rating of a player, if the recorder knows them.
    async fn rating_of(&self, _player_id: PlayerId) -> Option<i32> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Win,
    Draw,
    Loss,
}

/// One finished game from a player's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub opponent: Option<PlayerId>,
    pub outcome: GameOutcome,
    pub score: u32,
    pub rating_after: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub rating: i32,
}

#[derive(Debug, Default)]
struct RecorderState {
    results: Vec<SessionResult>,
    recorded: HashSet<SessionId>,
    ratings: HashMap<PlayerId, i32>,
    names: HashMap<PlayerId, String>,
    history: HashMap<PlayerId, Vec<HistoryEntry>>,
}

/// Keeps every result in memory and maintains ratings and per-player history.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    state: RwLock<RecorderState>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn results(&self) -> Vec<SessionResult> {
        self.state.read().await.results.clone()
    }

    pub async fn history(&self, player_id: PlayerId) -> Vec<HistoryEntry> {
        self.state
            .read()
            .await
            .history
            .get(&player_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Ranked players ordered by rating, highest first.
    pub async fn rankings(&self) -> Vec<RankingEntry> {
        let state = self.state.read().await;
        let mut rankings: Vec<RankingEntry> = state
            .ratings
            .iter()
            .map(|(id, rating)| RankingEntry {
                player_id: *id,
                name: state.names.get(id).cloned().unwrap_or_default(),
                rating: *rating,
            })
            .collect();
        rankings.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.player_id.cmp(&b.player_id)));
        rankings
    }
}

fn outcome_for(winner: Winner, player_id: PlayerId) -> GameOutcome {
    match winner {
        Winner::Player(id) if id == player_id => GameOutcome::Win,
        Winner::Draw => GameOutcome::Draw,
        _ => GameOutcome::Loss,
    }
}

#[async_trait]
impl ResultRecorder for MemoryRecorder {
    async fn record(&self, result: &SessionResult) -> Result<(), RecordError> {
        let mut state = self.state.write().await;
        if !state.recorded.insert(result.session_id) {
            return Err(RecordError::Duplicate(result.session_id));
        }

        for delta in &result.rating_deltas {
            let rating = state
                .ratings
                .entry(delta.player_id)
                .or_insert(delta.rating_before);
            *rating = rating.saturating_add(delta.delta);
        }

        for score in &result.final_scores {
            state.names.insert(score.player_id, score.name.clone());

            let opponent = result
                .final_scores
                .iter()
                .map(|s| s.player_id)
                .find(|id| *id != score.player_id);
            let rating_after = state
                .ratings
                .get(&score.player_id)
                .copied()
                .unwrap_or(STARTING_RATING);

            let entry = HistoryEntry {
                session_id: result.session_id,
                mode: result.mode,
                opponent,
                outcome: outcome_for(result.winner, score.player_id),
                score: score.score,
                rating_after,
            };
            state.history.entry(score.player_id).or_default().push(entry);
        }

        info!(
            "Recorded {} session {} ({:?})",
            result.mode, result.session_id, result.winner
        );
        state.results.push(result.clone());
        Ok(())
    }

    async fn rating_of(&self, player_id: PlayerId) -> Option<i32> {
        self.state.read().await.ratings.get(&player_id).copied()
    }
}
