//! Server network layer: TCP accept loop, handshake and session wiring

use crate::config::ServerConfig;
use crate::connection::{spawn_inbound_pump, ConnectionHandle, PlayerConnection, PlayerProfile};
use crate::matchmaker::{Enqueued, Matchmaker, Pairing};
use crate::questions::QuestionBank;
use crate::rating::{clamp_rating, EloRating};
use crate::recorder::MemoryRecorder;
use crate::session::{Session, SessionDeps, SessionInput};
use log::{debug, error, info, warn};
use shared::codec::{read_frame, write_frame};
use shared::{
    ClientEvent, ErrorKind, MatchRequest, ServerEvent, SessionId, PROTOCOL_VERSION,
    STARTING_RATING,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, RwLock};

/// State shared by every connection task
struct ServerShared {
    config: ServerConfig,
    deps: SessionDeps,
    matchmaker: Matchmaker<PlayerConnection>,
    sessions: RwLock<HashMap<SessionId, mpsc::UnboundedSender<SessionInput>>>,
}

/// Main server accepting players and running their sessions
pub struct Server {
    listener: TcpListener,
    shared: Arc<ServerShared>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        deps: SessionDeps,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let shared = ServerShared {
            matchmaker: Matchmaker::new(config.matchmaker.clone()),
            sessions: RwLock::new(HashMap::new()),
            config,
            deps,
        };

        Ok(Server {
            listener,
            shared: Arc::new(shared),
        })
    }

    /// Builds the default collaborators from `config`: the configured (or
    /// bundled) question bank, an in-memory recorder and Elo ratings.
    pub async fn from_config(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let bank = match &config.question_bank {
            Some(path) => QuestionBank::load(path, config.question_time_limit)?,
            None => QuestionBank::sample(config.question_time_limit)?,
        };
        info!("Question bank holds {} questions", bank.len());

        let deps = SessionDeps {
            source: Arc::new(bank.with_shuffle(config.shuffle_questions)),
            recorder: Arc::new(MemoryRecorder::new()),
            rating: Arc::new(EloRating::new(config.k_factor)),
        };
        Self::new(config, deps).await
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn active_sessions(&self) -> usize {
        self.shared.sessions.read().await.len()
    }

    /// Accepts connections forever, one task per connection
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }

                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        handle_connection(stream, addr, shared).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Spawns the task that writes queued events to the socket. It ends, closing
/// the socket, once every handle to the connection is gone.
fn spawn_writer(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    addr: SocketAddr,
) -> mpsc::UnboundedSender<ServerEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &event).await {
                warn!("Failed to send to {}: {}", addr, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
        debug!("Connection to {} closed", addr);
    });

    tx
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<ServerShared>) {
    let (mut reader, writer) = stream.into_split();
    let outbound = spawn_writer(writer, addr);

    let first = match read_frame::<_, ClientEvent>(&mut reader).await {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            warn!("Bad handshake from {}: {}", addr, e);
            if e.is_recoverable() {
                let _ = outbound.send(ServerEvent::Error {
                    kind: ErrorKind::InvalidEvent,
                });
            }
            return;
        }
    };

    match first {
        ClientEvent::Hello { client_version, .. } | ClientEvent::Resume { client_version, .. }
            if client_version != PROTOCOL_VERSION =>
        {
            info!(
                "Rejecting client at {} (version {}, expected {})",
                addr, client_version, PROTOCOL_VERSION
            );
            let _ = outbound.send(ServerEvent::Error {
                kind: ErrorKind::UnsupportedVersion,
            });
        }

        ClientEvent::Hello {
            player_id,
            name,
            rating,
            request,
            ..
        } => {
            info!("Player {} ({}) connected from {}", player_id, name, addr);
            let handle = ConnectionHandle::new(player_id, outbound);
            join_matchmaking(reader, handle, name, rating, request, &shared).await;
        }

        ClientEvent::Resume {
            player_id,
            session_id,
            ..
        } => {
            info!(
                "Player {} wants to resume session {} from {}",
                player_id, session_id, addr
            );
            let handle = ConnectionHandle::new(player_id, outbound);
            resume_session(reader, handle, session_id, &shared).await;
        }

        other => {
            warn!("Expected a handshake from {}, got {:?}", addr, other);
            let _ = outbound.send(ServerEvent::Error {
                kind: ErrorKind::InvalidEvent,
            });
        }
    }
}

async fn join_matchmaking(
    reader: OwnedReadHalf,
    handle: ConnectionHandle,
    name: String,
    rating: Option<i32>,
    request: MatchRequest,
    shared: &Arc<ServerShared>,
) {
    let player_id = handle.player_id();
    let rating = match shared.deps.recorder.rating_of(player_id).await {
        Some(stored) => stored,
        None => rating.map_or(STARTING_RATING, clamp_rating),
    };
    let profile = PlayerProfile::new(player_id, name, rating);
    let mode = request.mode();

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let connection = PlayerConnection::new(handle.clone(), inbound_rx);

    match shared.matchmaker.enqueue(profile, request, connection).await {
        Ok(Enqueued::Waiting) => {
            handle.send(ServerEvent::Queued { mode });
        }
        Ok(Enqueued::Matched(pairing)) => {
            start_session(pairing, shared).await;
        }
        Err(e) => {
            warn!("Refusing to queue player {}: {}", player_id, e);
            handle.send(ServerEvent::Error {
                kind: ErrorKind::AlreadyQueued,
            });
            return;
        }
    }

    read_client_events(reader, inbound_tx, &handle).await;

    // Only still-waiting players are removed here; matched players leave
    // through their session.
    if shared.matchmaker.cancel(player_id).await {
        debug!("Player {} disconnected while waiting", player_id);
    }
}

async fn resume_session(
    reader: OwnedReadHalf,
    handle: ConnectionHandle,
    session_id: SessionId,
    shared: &Arc<ServerShared>,
) {
    let player_id = handle.player_id();
    let session = shared.sessions.read().await.get(&session_id).cloned();

    let session = match session {
        Some(session) => session,
        None => {
            handle.send(ServerEvent::Error {
                kind: ErrorKind::SessionNotFound,
            });
            return;
        }
    };

    let (accepted, reply) = oneshot::channel();
    let rebind = SessionInput::Rebind {
        player_id,
        connection: handle.clone(),
        accepted,
    };
    if session.send(rebind).is_err() {
        handle.send(ServerEvent::Error {
            kind: ErrorKind::SessionNotFound,
        });
        return;
    }

    // On rejection the session has already told the client why.
    if !reply.await.unwrap_or(false) {
        return;
    }

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    spawn_inbound_pump(player_id, inbound_rx, session);
    read_client_events(reader, inbound_tx, &handle).await;
}

/// Reads client frames into `inbound` until the client leaves, the socket
/// closes or nothing consumes `inbound` any more (the session is over).
/// Undecodable frames are answered with `InvalidEvent` and skipped.
async fn read_client_events(
    mut reader: OwnedReadHalf,
    inbound: mpsc::UnboundedSender<ClientEvent>,
    handle: &ConnectionHandle,
) {
    let player_id = handle.player_id();

    loop {
        // A half-read frame is lost on the closed branch; the connection is
        // shutting down then anyway.
        let frame = tokio::select! {
            frame = read_frame::<_, ClientEvent>(&mut reader) => frame,
            _ = inbound.closed() => {
                debug!("Session of player {} is gone, closing connection", player_id);
                break;
            }
        };

        match frame {
            Ok(Some(event)) => {
                let leaving = event == ClientEvent::Leave;
                if inbound.send(event).is_err() || leaving {
                    break;
                }
            }
            Ok(None) => {
                debug!("Player {} closed the connection", player_id);
                break;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Undecodable event from player {}: {}", player_id, e);
                handle.send(ServerEvent::Error {
                    kind: ErrorKind::InvalidEvent,
                });
            }
            Err(e) => {
                debug!("Connection of player {} failed: {}", player_id, e);
                break;
            }
        }
    }
}

/// Binds a pairing to a new session, registers it for resumes and runs it.
async fn start_session(pairing: Pairing<PlayerConnection>, shared: &Arc<ServerShared>) {
    let session_id = pairing.session_id;
    let mut players = Vec::with_capacity(pairing.players.len());
    let mut inbound = Vec::with_capacity(pairing.players.len());

    for (profile, connection) in pairing.players {
        inbound.push((profile.id, connection.inbound));
        players.push((profile, connection.handle));
    }

    let (session, input) = Session::new(
        session_id,
        pairing.mode,
        players,
        shared.config.session.clone(),
        shared.deps.clone(),
    );

    for (player_id, events) in inbound {
        spawn_inbound_pump(player_id, events, input.clone());
    }
    shared.sessions.write().await.insert(session_id, input);

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let outcome = session.run().await;

        shared.sessions.write().await.remove(&outcome.session_id);
        let released = shared.matchmaker.release(outcome.session_id).await;
        info!(
            "Session {} finished as {:?}; {} players free to queue again",
            outcome.session_id, outcome.state, released
        );
    });
}
