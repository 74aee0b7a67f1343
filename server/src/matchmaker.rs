//! Matchmaking queues for ranked, direct-invite and training games
//!
//! This module turns waiting players into session pairings:
//! - Ranked players wait in a FIFO queue and are paired with the
//!   longest-waiting compatible opponent
//! - Direct (unranked) players wait on an invite token until a second player
//!   names the same token
//! - Training requests are paired with nobody and start immediately
//!
//! A player is either waiting in exactly one queue, matched into exactly one
//! active session, or unknown. All queue mutation happens under one lock.

use crate::config::MatchmakerConfig;
use crate::connection::PlayerProfile;
use crate::error::MatchmakingError;
use log::{debug, info};
use shared::{GameMode, MatchRequest, PlayerId, SessionId};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A player waiting for an opponent, with whatever the caller needs to bind
/// them to a session once paired.
#[derive(Debug)]
struct Waiting<T> {
    profile: PlayerProfile,
    ticket: T,
    queued_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Ranked,
    Invite(String),
}

/// Players bound together for a new session. Longest-waiting player first.
#[derive(Debug)]
pub struct Pairing<T> {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub players: Vec<(PlayerProfile, T)>,
}

#[derive(Debug)]
pub enum Enqueued<T> {
    Waiting,
    Matched(Pairing<T>),
}

#[derive(Debug)]
struct QueueState<T> {
    ranked: VecDeque<Waiting<T>>,
    invites: HashMap<String, Waiting<T>>,
    waiting: HashMap<PlayerId, Slot>,
    matched: HashMap<PlayerId, SessionId>,
    matches_made: u64,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            ranked: VecDeque::new(),
            invites: HashMap::new(),
            waiting: HashMap::new(),
            matched: HashMap::new(),
            matches_made: 0,
        }
    }
}

impl<T> QueueState<T> {
    fn pair(&mut self, mode: GameMode, players: Vec<(PlayerProfile, T)>) -> Pairing<T> {
        debug_assert_eq!(players.len(), mode.seats());
        let session_id = SessionId::new_v4();
        for (profile, _) in &players {
            self.waiting.remove(&profile.id);
            self.matched.insert(profile.id, session_id);
        }
        self.matches_made += 1;

        Pairing {
            session_id,
            mode,
            players,
        }
    }
}

pub struct Matchmaker<T> {
    config: MatchmakerConfig,
    state: Mutex<QueueState<T>>,
}

impl<T> Matchmaker<T> {
    pub fn new(config: MatchmakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn compatible(&self, a: &PlayerProfile, b: &PlayerProfile) -> bool {
        self.config
            .max_rating_gap
            .map_or(true, |gap| {
                (i64::from(a.rating) - i64::from(b.rating)).abs() <= i64::from(gap)
            })
    }

    /// Places a player according to `request`.
    ///
    /// Fails with `AlreadyQueued` if the player is waiting anywhere or is
    /// already matched into an unreleased session.
    pub async fn enqueue(
        &self,
        profile: PlayerProfile,
        request: MatchRequest,
        ticket: T,
    ) -> Result<Enqueued<T>, MatchmakingError> {
        let mut state = self.state.lock().await;

        if state.waiting.contains_key(&profile.id) || state.matched.contains_key(&profile.id) {
            return Err(MatchmakingError::AlreadyQueued(profile.id));
        }

        match request {
            MatchRequest::Training => {
                info!("Player {} starts a training session", profile.id);
                let pairing = state.pair(GameMode::Training, vec![(profile, ticket)]);
                Ok(Enqueued::Matched(pairing))
            }

            MatchRequest::Ranked => {
                let opponent = state
                    .ranked
                    .iter()
                    .position(|w| self.compatible(&w.profile, &profile));

                let opponent = opponent.and_then(|index| state.ranked.remove(index));
                match opponent {
                    Some(waiting) => {
                        debug!(
                            "Player {} waited {:?} for a ranked opponent",
                            waiting.profile.id,
                            waiting.queued_at.elapsed()
                        );
                        info!(
                            "Ranked match: {} vs {}",
                            waiting.profile.id, profile.id
                        );
                        let players = vec![(waiting.profile, waiting.ticket), (profile, ticket)];
                        Ok(Enqueued::Matched(state.pair(GameMode::Ranked, players)))
                    }
                    None => {
                        debug!("Player {} joins the ranked queue", profile.id);
                        state.waiting.insert(profile.id, Slot::Ranked);
                        state.ranked.push_back(Waiting {
                            profile,
                            ticket,
                            queued_at: Instant::now(),
                        });
                        Ok(Enqueued::Waiting)
                    }
                }
            }

            MatchRequest::Direct { invite_token } => match state.invites.remove(&invite_token) {
                Some(host) => {
                    info!(
                        "Direct match on invite '{}': {} vs {}",
                        invite_token, host.profile.id, profile.id
                    );
                    let players = vec![(host.profile, host.ticket), (profile, ticket)];
                    Ok(Enqueued::Matched(state.pair(GameMode::Unranked, players)))
                }
                None => {
                    debug!("Player {} waits on invite '{}'", profile.id, invite_token);
                    state
                        .waiting
                        .insert(profile.id, Slot::Invite(invite_token.clone()));
                    state.invites.insert(
                        invite_token,
                        Waiting {
                            profile,
                            ticket,
                            queued_at: Instant::now(),
                        },
                    );
                    Ok(Enqueued::Waiting)
                }
            },
        }
    }

    /// Removes a still-waiting player. Returns false if the player was not
    /// waiting (already matched, or unknown).
    pub async fn cancel(&self, player_id: PlayerId) -> bool {
        let mut state = self.state.lock().await;

        match state.waiting.remove(&player_id) {
            Some(Slot::Ranked) => {
                state.ranked.retain(|w| w.profile.id != player_id);
                info!("Player {} left the ranked queue", player_id);
                true
            }
            Some(Slot::Invite(token)) => {
                state.invites.remove(&token);
                info!("Player {} withdrew invite '{}'", player_id, token);
                true
            }
            None => false,
        }
    }

    /// Frees the players of a finished session so they may queue again.
    /// Returns how many players were released.
    pub async fn release(&self, session_id: SessionId) -> usize {
        let mut state = self.state.lock().await;
        let before = state.matched.len();
        state.matched.retain(|_, s| *s != session_id);
        before - state.matched.len()
    }

    pub async fn ranked_queue_len(&self) -> usize {
        self.state.lock().await.ranked.len()
    }

    pub async fn is_waiting(&self, player_id: PlayerId) -> bool {
        self.state.lock().await.waiting.contains_key(&player_id)
    }

    pub async fn session_of(&self, player_id: PlayerId) -> Option<SessionId> {
        self.state.lock().await.matched.get(&player_id).copied()
    }

    pub async fn matches_made(&self) -> u64 {
        self.state.lock().await.matches_made
    }
}
