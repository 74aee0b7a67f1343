//! Game session coordinator: one task per duel or training run.
//!
//! A session moves through `Forming → InProgress(round) → Finalizing →
//! Closed`, or to `Aborted` from any non-closed state. It owns a single input
//! queue fed by the inbound pumps of its players and by rebind requests from
//! the network layer; every state change happens while handling one input or
//! one timer, so the deadline-versus-answers race is decided in one place.
//!
//! Timing uses `tokio::time::Instant` throughout, which lets tests drive whole
//! sessions deterministically on a paused clock.

use crate::config::SessionConfig;
use crate::connection::{ConnectionHandle, PlayerProfile};
use crate::error::{AbortReason, RecordError, SessionError, SourceError};
use crate::questions::{QuestionBatch, QuestionSource};
use crate::rating::RatingStrategy;
use crate::recorder::ResultRecorder;
use crate::result::{decide_winner, Answer, RatingDelta, RoundRecord, SessionResult};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use shared::{ClientEvent, GameMode, PlayerId, PlayerScore, ServerEvent, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Forming,
    InProgress { round: usize },
    Finalizing,
    Closed,
    Aborted(AbortReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted(_))
    }
}

/// Everything a session reacts to besides its own timers.
#[derive(Debug)]
pub enum SessionInput {
    Event {
        player_id: PlayerId,
        event: ClientEvent,
    },
    Dropped {
        player_id: PlayerId,
    },
    /// A returning player on a fresh connection. `accepted` reports whether
    /// the session took it.
    Rebind {
        player_id: PlayerId,
        connection: ConnectionHandle,
        accepted: oneshot::Sender<bool>,
    },
}

/// Collaborators shared by every session of a server.
#[derive(Clone)]
pub struct SessionDeps {
    pub source: Arc<dyn QuestionSource>,
    pub recorder: Arc<dyn ResultRecorder>,
    pub rating: Arc<dyn RatingStrategy>,
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub state: SessionState,
    pub result: Option<SessionResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Connected,
    Dropped { since: Instant },
    Left,
}

#[derive(Debug)]
struct Participant {
    profile: PlayerProfile,
    connection: Option<ConnectionHandle>,
    presence: Presence,
    score: u32,
    lifeline_used: bool,
}

impl Participant {
    fn is_connected(&self) -> bool {
        self.presence == Presence::Connected
    }
}

#[derive(Debug)]
struct OpenRound {
    index: usize,
    started_at: Instant,
    deadline: Instant,
    answers: HashMap<PlayerId, Answer>,
}

pub struct Session {
    id: SessionId,
    mode: GameMode,
    config: SessionConfig,
    deps: SessionDeps,
    created_at: Instant,
    participants: Vec<Participant>,
    batch: Option<QuestionBatch>,
    state: SessionState,
    open_round: Option<OpenRound>,
    rounds: Vec<RoundRecord>,
    result_emitted: bool,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    inputs_closed: bool,
}

impl Session {
    /// Creates a session in `Forming` with its players bound, and returns the
    /// sender side of its input queue.
    pub fn new(
        id: SessionId,
        mode: GameMode,
        players: Vec<(PlayerProfile, ConnectionHandle)>,
        config: SessionConfig,
        deps: SessionDeps,
    ) -> (Self, mpsc::UnboundedSender<SessionInput>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let participants = players
            .into_iter()
            .map(|(profile, connection)| Participant {
                profile,
                connection: Some(connection),
                presence: Presence::Connected,
                score: 0,
                lifeline_used: false,
            })
            .collect();

        let session = Self {
            id,
            mode,
            config,
            deps,
            created_at: Instant::now(),
            participants,
            batch: None,
            state: SessionState::Forming,
            open_round: None,
            rounds: Vec::new(),
            result_emitted: false,
            inputs: rx,
            inputs_closed: false,
        };

        (session, tx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn score_of(&self, player_id: PlayerId) -> Option<u32> {
        self.participant(player_id).map(|p| p.score)
    }

    fn participant(&self, player_id: PlayerId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.profile.id == player_id)
    }

    fn participant_mut(&mut self, player_id: PlayerId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.profile.id == player_id)
    }

    fn scores(&self) -> Vec<PlayerScore> {
        self.participants
            .iter()
            .map(|p| PlayerScore {
                player_id: p.profile.id,
                name: p.profile.name.clone(),
                score: p.score,
            })
            .collect()
    }

    fn send_to(&self, player_id: PlayerId, event: ServerEvent) {
        if let Some(connection) = self.participant(player_id).and_then(|p| p.connection.as_ref()) {
            connection.send(event);
        }
    }

    fn broadcast(&self, event: &ServerEvent) {
        for connection in self.participants.iter().filter_map(|p| p.connection.as_ref()) {
            connection.send(event.clone());
        }
    }

    fn release_connections(&mut self) {
        for participant in &mut self.participants {
            participant.connection = None;
        }
    }

    fn announce(&self) {
        for participant in &self.participants {
            let opponent_name = self
                .participants
                .iter()
                .find(|p| p.profile.id != participant.profile.id)
                .map(|p| p.profile.name.clone());

            self.send_to(
                participant.profile.id,
                ServerEvent::MatchFound {
                    session_id: self.id,
                    mode: self.mode,
                    opponent_name,
                },
            );
        }
    }

    /// Moves to `Aborted`, tells every still-bound player why and releases
    /// their connections.
    pub fn abort(&mut self, reason: AbortReason) {
        if self.state.is_terminal() {
            return;
        }

        warn!("Session {} aborted: {}", self.id, reason);
        self.state = SessionState::Aborted(reason);
        self.open_round = None;
        self.broadcast(&ServerEvent::Error {
            kind: reason.kind(),
        });
        self.release_connections();
    }

    /// Once every round is played the result stands even if everyone left.
    fn abort_if_deserted(&mut self) {
        if self.state == SessionState::Finalizing {
            return;
        }
        if !self.participants.iter().any(Participant::is_connected) {
            self.abort(AbortReason::AllPlayersDisconnected);
        }
    }

    /// Installs the fetched batch and enters round 0.
    fn start(&mut self, batch: QuestionBatch) -> Result<(), SourceError> {
        if batch.len() != self.config.question_count || batch.is_empty() {
            return Err(SourceError::WrongBatchSize {
                requested: self.config.question_count,
                returned: batch.len(),
            });
        }

        self.batch = Some(batch);
        if self.state == SessionState::Forming {
            self.state = SessionState::InProgress { round: 0 };
        }
        Ok(())
    }

    /// Opens the current round: broadcasts its question and arms the deadline.
    /// Returns the deadline, or `None` if no round can be opened.
    pub fn begin_round(&mut self, now: Instant) -> Option<Instant> {
        let round = match self.state {
            SessionState::InProgress { round } if self.open_round.is_none() => round,
            _ => return None,
        };
        let question = self.batch.as_ref()?.get(round)?.clone();
        let deadline = now + Duration::from_millis(question.time_limit_ms);

        self.open_round = Some(OpenRound {
            index: round,
            started_at: now,
            deadline,
            answers: HashMap::new(),
        });

        debug!("Session {} round {} opened", self.id, round);
        self.broadcast(&ServerEvent::QuestionIssued {
            round_index: round,
            text: question.text,
            choices: question.choices,
            time_limit_ms: question.time_limit_ms,
        });

        Some(deadline)
    }

    /// True once every connected player has answered the open round.
    pub fn round_complete(&self) -> bool {
        match &self.open_round {
            Some(open) => self
                .participants
                .iter()
                .filter(|p| p.is_connected())
                .all(|p| open.answers.contains_key(&p.profile.id)),
            None => false,
        }
    }

    pub fn submit_answer(
        &mut self,
        player_id: PlayerId,
        question_index: usize,
        choice_index: usize,
        now: Instant,
    ) -> Result<(), SessionError> {
        let round = match self.state {
            SessionState::InProgress { round } => round,
            SessionState::Forming => return Err(SessionError::InvalidEvent),
            _ => return Err(SessionError::RoundClosed),
        };

        let participant = self.participant(player_id).ok_or(SessionError::UnknownPlayer)?;
        if !participant.is_connected() {
            return Err(SessionError::InvalidEvent);
        }
        if question_index < round {
            return Err(SessionError::RoundClosed);
        }

        let choice_count = self
            .batch
            .as_ref()
            .and_then(|b| b.get(question_index))
            .map(|q| q.choices.len())
            .ok_or(SessionError::InvalidEvent)?;

        let open = match self.open_round.as_mut() {
            Some(open) if open.index == question_index => open,
            _ => return Err(SessionError::InvalidEvent),
        };
        if now >= open.deadline {
            return Err(SessionError::RoundClosed);
        }
        if open.answers.contains_key(&player_id) {
            return Err(SessionError::DuplicateAnswer);
        }
        if choice_index >= choice_count {
            return Err(SessionError::InvalidEvent);
        }

        let elapsed_ms = now.duration_since(open.started_at).as_millis() as u64;
        open.answers.insert(
            player_id,
            Answer {
                player_id,
                question_index,
                choice: Some(choice_index),
                elapsed_ms,
            },
        );
        debug!(
            "Session {} round {}: player {} answered after {}ms",
            self.id, question_index, player_id, elapsed_ms
        );

        for other in self.participants.iter().filter(|p| p.profile.id != player_id) {
            if let Some(connection) = &other.connection {
                connection.send(ServerEvent::OpponentAnswered {
                    round_index: question_index,
                });
            }
        }

        Ok(())
    }

    /// Spends the player's fifty-fifty lifeline on the open round and returns
    /// the removed choice indices: every wrong choice but one.
    pub fn use_fifty_fifty(
        &mut self,
        player_id: PlayerId,
        question_index: usize,
        now: Instant,
    ) -> Result<Vec<usize>, SessionError> {
        let participant = self.participant(player_id).ok_or(SessionError::UnknownPlayer)?;
        if !participant.is_connected() || participant.lifeline_used {
            return Err(SessionError::LifelineUnavailable);
        }

        let open = match &self.open_round {
            Some(open) if open.index == question_index && now < open.deadline => open,
            _ => return Err(SessionError::LifelineUnavailable),
        };
        if open.answers.contains_key(&player_id) {
            return Err(SessionError::LifelineUnavailable);
        }

        let question = self
            .batch
            .as_ref()
            .and_then(|b| b.get(question_index))
            .ok_or(SessionError::LifelineUnavailable)?;
        if question.choices.len() < 3 {
            return Err(SessionError::LifelineUnavailable);
        }

        let mut wrong: Vec<usize> = (0..question.choices.len())
            .filter(|i| *i != question.correct_choice)
            .collect();
        wrong.shuffle(&mut rand::thread_rng());
        wrong.truncate(wrong.len() - 1);
        wrong.sort_unstable();

        if let Some(participant) = self.participant_mut(player_id) {
            participant.lifeline_used = true;
        }
        self.send_to(
            player_id,
            ServerEvent::FiftyFiftyResult {
                round_index: question_index,
                removed_choices: wrong.clone(),
            },
        );

        Ok(wrong)
    }

    /// Closes the open round: fills in missing answers, scores the snapshot,
    /// broadcasts the per-player round results and advances the state.
    pub fn close_round(&mut self, now: Instant) -> Option<RoundRecord> {
        let open = self.open_round.take()?;
        let question = self.batch.as_ref()?.get(open.index)?.clone();

        let elapsed_at_close = now
            .duration_since(open.started_at)
            .as_millis()
            .min(question.time_limit_ms as u128) as u64;

        let answers: Vec<Answer> = self
            .participants
            .iter()
            .map(|p| {
                open.answers.get(&p.profile.id).cloned().unwrap_or_else(|| {
                    Answer::no_answer(p.profile.id, open.index, elapsed_at_close)
                })
            })
            .collect();

        let scored = self.config.scoring.score_round(&question, &answers);
        for entry in &scored {
            if let Some(participant) = self.participant_mut(entry.answer.player_id) {
                participant.score = participant.score.saturating_add(entry.points);
            }
        }

        let record = RoundRecord {
            round_index: open.index,
            correct_choice: question.correct_choice,
            answers: scored,
            cumulative_scores: self.scores(),
        };

        for entry in &record.answers {
            self.send_to(
                entry.answer.player_id,
                ServerEvent::RoundResult {
                    round_index: record.round_index,
                    your_answer: entry.answer.choice,
                    correct_choice_index: record.correct_choice,
                    points_awarded: entry.points,
                    cumulative_scores: record.cumulative_scores.clone(),
                },
            );
        }

        debug!(
            "Session {} round {} closed: {:?}",
            self.id, record.round_index, record.cumulative_scores
        );
        self.rounds.push(record.clone());

        let total = self.batch.as_ref().map_or(0, QuestionBatch::len);
        self.state = if open.index + 1 < total {
            SessionState::InProgress {
                round: open.index + 1,
            }
        } else {
            SessionState::Finalizing
        };

        Some(record)
    }

    /// Marks a player as dropped. Their remaining rounds score as no answer
    /// unless they rebind in time. Aborts when nobody is left.
    pub fn disconnect(&mut self, player_id: PlayerId, now: Instant) {
        if self.state.is_terminal() {
            return;
        }

        let session_id = self.id;
        match self.participant_mut(player_id) {
            Some(participant) if participant.is_connected() => {
                info!("Player {} dropped from session {}", player_id, session_id);
                participant.presence = Presence::Dropped { since: now };
                participant.connection = None;
            }
            Some(_) => return,
            None => {
                debug!("Drop for unknown player {} in session {}", player_id, session_id);
                return;
            }
        }

        self.abort_if_deserted();
    }

    /// A voluntary leave: accepted immediately, scored like a drop, and the
    /// player may not rebind.
    pub fn leave(&mut self, player_id: PlayerId) {
        if self.state.is_terminal() {
            return;
        }

        let session_id = self.id;
        if let Some(participant) = self.participant_mut(player_id) {
            if participant.presence == Presence::Left {
                return;
            }
            info!("Player {} left session {}", player_id, session_id);
            participant.presence = Presence::Left;
            participant.connection = None;
        }

        self.abort_if_deserted();
    }

    /// Binds a dropped player to a new connection without losing their score.
    pub fn rebind(
        &mut self,
        player_id: PlayerId,
        connection: ConnectionHandle,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::RebindRejected);
        }
        if self.mode == GameMode::Ranked && !self.config.allow_ranked_rebind {
            return Err(SessionError::RebindRejected);
        }
        let grace = self.config.grace_window.ok_or(SessionError::RebindRejected)?;

        let participant = self
            .participant_mut(player_id)
            .ok_or(SessionError::RebindRejected)?;
        match participant.presence {
            Presence::Dropped { since } if now.duration_since(since) <= grace => {}
            _ => return Err(SessionError::RebindRejected),
        }

        participant.presence = Presence::Connected;
        participant.connection = Some(connection);
        info!("Player {} rejoined session {}", player_id, self.id);

        let round_index = match self.state {
            SessionState::InProgress { round } => round,
            _ => self.rounds.len(),
        };
        self.send_to(
            player_id,
            ServerEvent::Resumed {
                session_id: self.id,
                round_index,
                cumulative_scores: self.scores(),
            },
        );

        let reissue = self.open_round.as_ref().and_then(|open| {
            if open.answers.contains_key(&player_id) || now >= open.deadline {
                return None;
            }
            let question = self.batch.as_ref()?.get(open.index)?;
            Some(ServerEvent::QuestionIssued {
                round_index: open.index,
                text: question.text.clone(),
                choices: question.choices.clone(),
                time_limit_ms: open.deadline.duration_since(now).as_millis() as u64,
            })
        });
        if let Some(event) = reissue {
            self.send_to(player_id, event);
        }

        Ok(())
    }

    /// Builds the session result. Yields `Some` exactly once, and only from
    /// `Finalizing`.
    pub fn finalize(&mut self) -> Option<SessionResult> {
        if self.result_emitted || self.state != SessionState::Finalizing {
            return None;
        }

        let final_scores = self.scores();
        let winner = decide_winner(&final_scores);

        let rating_deltas = if self.mode == GameMode::Ranked
            && self.participants.len() == self.mode.seats()
        {
            let ratings: Vec<(PlayerId, i32)> = self
                .participants
                .iter()
                .map(|p| (p.profile.id, p.profile.rating))
                .collect();
            self.deps
                .rating
                .deltas(&ratings, winner)
                .into_iter()
                .map(|(player_id, delta)| RatingDelta {
                    player_id,
                    rating_before: ratings
                        .iter()
                        .find(|(id, _)| *id == player_id)
                        .map_or(shared::STARTING_RATING, |(_, r)| *r),
                    delta,
                })
                .collect()
        } else {
            Vec::new()
        };

        self.result_emitted = true;
        Some(SessionResult {
            session_id: self.id,
            mode: self.mode,
            final_scores,
            winner,
            rounds: self.rounds.clone(),
            rating_deltas,
        })
    }

    pub fn handle_input(&mut self, input: SessionInput, now: Instant) {
        match input {
            SessionInput::Event { player_id, event } => self.handle_event(player_id, event, now),
            SessionInput::Dropped { player_id } => self.disconnect(player_id, now),
            SessionInput::Rebind {
                player_id,
                connection,
                accepted,
            } => {
                let reply = connection.clone();
                let outcome = self.rebind(player_id, connection, now);
                if let Err(e) = outcome {
                    warn!("Rebind of player {} to session {} rejected", player_id, self.id);
                    reply.send(ServerEvent::Error { kind: e.kind() });
                }
                let _ = accepted.send(outcome.is_ok());
            }
        }
    }

    fn handle_event(&mut self, player_id: PlayerId, event: ClientEvent, now: Instant) {
        if self.state.is_terminal() {
            return;
        }

        let outcome = match event {
            ClientEvent::Answer {
                question_index,
                choice_index,
            } => self.submit_answer(player_id, question_index, choice_index, now),
            ClientEvent::FiftyFifty { question_index } => self
                .use_fifty_fifty(player_id, question_index, now)
                .map(|_| ()),
            ClientEvent::Leave => {
                self.leave(player_id);
                Ok(())
            }
            ClientEvent::Hello { .. } | ClientEvent::Resume { .. } => Err(SessionError::InvalidEvent),
        };

        if let Err(e) = outcome {
            debug!("Session {}: player {} input rejected: {}", self.id, player_id, e);
            self.send_to(player_id, ServerEvent::Error { kind: e.kind() });
        }
    }

    fn drain_pending_inputs(&mut self) {
        while let Ok(input) = self.inputs.try_recv() {
            self.handle_input(input, Instant::now());
            if self.state.is_terminal() {
                return;
            }
        }
    }

    /// Processes inputs until `until`, returning early once the session is
    /// terminal or, when `stop_when_complete` is set, once the open round has
    /// every answer it waits for.
    async fn process_inputs_until(&mut self, until: Instant, stop_when_complete: bool) {
        loop {
            if self.state.is_terminal() || (stop_when_complete && self.round_complete()) {
                return;
            }

            let inputs_closed = self.inputs_closed;
            let next = tokio::select! {
                _ = sleep_until(until) => None,
                input = self.inputs.recv(), if !inputs_closed => Some(input),
            };

            match next {
                None => return,
                Some(Some(input)) => self.handle_input(input, Instant::now()),
                Some(None) => self.inputs_closed = true,
            }
        }
    }

    async fn fetch_questions(&self) -> Result<QuestionBatch, SourceError> {
        let fetch = self
            .deps
            .source
            .fetch_batch(self.config.question_count, &self.config.filters);
        match timeout(self.config.source_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout),
        }
    }

    async fn finish(&mut self) -> Option<SessionResult> {
        let result = self.finalize()?;

        let recorded = timeout(self.config.record_timeout, self.deps.recorder.record(&result))
            .await
            .unwrap_or(Err(RecordError::Timeout));
        match recorded {
            Ok(()) => debug!("Session {} result acknowledged", self.id),
            Err(e) => error!("ResultPersistFailure for session {}: {}", self.id, e),
        }

        for participant in &self.participants {
            self.send_to(
                participant.profile.id,
                ServerEvent::SessionEnded {
                    final_scores: result.final_scores.clone(),
                    winner: result.winner,
                    rating_delta: result.delta_of(participant.profile.id),
                },
            );
        }

        self.state = SessionState::Closed;
        self.release_connections();
        Some(result)
    }

    fn outcome(&self, result: Option<SessionResult>) -> SessionOutcome {
        SessionOutcome {
            session_id: self.id,
            mode: self.mode,
            state: self.state,
            result,
        }
    }

    /// Drives the session to a terminal state.
    pub async fn run(mut self) -> SessionOutcome {
        info!(
            "Session {} ({}) forming with players {:?}",
            self.id,
            self.mode,
            self.participants.iter().map(|p| p.profile.id).collect::<Vec<_>>()
        );
        self.announce();

        let fetched = self.fetch_questions().await;
        self.drain_pending_inputs();
        if self.state.is_terminal() {
            return self.outcome(None);
        }

        if let Err(e) = fetched.and_then(|batch| self.start(batch)) {
            warn!("Session {} could not get questions: {}", self.id, e);
            self.abort(AbortReason::QuestionSourceUnavailable);
            return self.outcome(None);
        }

        while let SessionState::InProgress { .. } = self.state {
            let deadline = match self.begin_round(Instant::now()) {
                Some(deadline) => deadline,
                None => break,
            };

            self.process_inputs_until(deadline, true).await;
            if self.state.is_terminal() {
                break;
            }
            self.close_round(Instant::now());

            // Late answers arriving during the pause, including after the
            // final round, are rejected with RoundClosed.
            let gap_end = Instant::now() + self.config.round_gap;
            self.process_inputs_until(gap_end, false).await;
        }

        let result = match self.state {
            SessionState::Finalizing => self.finish().await,
            _ => None,
        };

        info!(
            "Session {} ended as {:?} after {:?}",
            self.id,
            self.state,
            self.created_at.elapsed()
        );
        self.outcome(result)
    }
}
