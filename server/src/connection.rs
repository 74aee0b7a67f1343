//! Player connection handles as seen by matchmaking and sessions.
//!
//! The network layer owns the socket. What the rest of the server gets is:
//! - a [`ConnectionHandle`] that queues outbound events without blocking
//! - an inbound stream of [`ClientEvent`]s that ends when the socket closes
//!
//! Sessions never touch transports; an inbound pump task turns the end of the
//! stream into a drop notification on the session's input queue.

use crate::session::SessionInput;
use log::{debug, warn};
use shared::{ClientEvent, PlayerId, ServerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identity and standing of a connected player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub name: String,
    pub rating: i32,
}

impl PlayerProfile {
    pub fn new(id: PlayerId, name: impl Into<String>, rating: i32) -> Self {
        Self {
            id,
            name: name.into(),
            rating,
        }
    }
}

/// Outbound half of a player connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    player_id: PlayerId,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(player_id: PlayerId, outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            player_id,
            outbound,
        }
    }

    /// Creates a handle together with the receiver a writer task drains.
    pub fn channel(player_id: PlayerId) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(player_id, tx), rx)
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Queues `event` for delivery. Returns false, after logging, when the
    /// connection is already closed.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.outbound.send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Dropping {:?} for player {}: connection closed",
                    e.0, self.player_id
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Both halves of an identified player's connection, held by the matchmaker
/// until the player is bound to a session.
#[derive(Debug)]
pub struct PlayerConnection {
    pub handle: ConnectionHandle,
    pub inbound: mpsc::UnboundedReceiver<ClientEvent>,
}

impl PlayerConnection {
    pub fn new(handle: ConnectionHandle, inbound: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self { handle, inbound }
    }
}

/// Forwards a player's inbound events into a session until the stream ends,
/// then reports the drop. Stops early once the session has finished; dropping
/// `inbound` then lets the network layer close the connection.
pub fn spawn_inbound_pump(
    player_id: PlayerId,
    mut inbound: mpsc::UnboundedReceiver<ClientEvent>,
    session: mpsc::UnboundedSender<SessionInput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                event = inbound.recv() => event,
                _ = session.closed() => None,
            };

            let event = match next {
                Some(event) => event,
                None => break,
            };
            if session
                .send(SessionInput::Event { player_id, event })
                .is_err()
            {
                break;
            }
        }

        if session.send(SessionInput::Dropped { player_id }).is_err() {
            debug!("Session gone, stopping inbound pump for player {}", player_id);
        }
    })
}
