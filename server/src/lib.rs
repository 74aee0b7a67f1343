//! # Trivia Duel Server Library
//!
//! This library provides the authoritative server for real-time trivia duels.
//! It pairs players through a matchmaker, runs each match as an isolated game
//! session, and hands finished results to a recorder that keeps ratings and
//! history.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! Players announce themselves with a handshake and ask for one of three kinds
//! of game:
//! - Ranked duels against the longest-waiting compatible opponent
//! - Direct duels with whoever presents the same invite token
//! - Solo training runs that start immediately
//!
//! A player is waiting in at most one queue or bound to at most one session.
//!
//! ### Authoritative Sessions
//! Every match is a state machine owned by a single task. The session decides
//! when a round opens and closes, which answers count, what they score and who
//! wins. Clients only ever display what the session tells them.
//!
//! ### Result Recording
//! Exactly one result is produced per completed session. Ranked duels carry
//! Elo rating changes which the recorder applies.
//!
//! ## Architecture Design
//!
//! ### One Task Per Session
//! Sessions never share mutable state. Each one consumes a single input queue
//! fed by per-player pump tasks, so answers, disconnects and rebinds are
//! applied in arrival order against one consistent view of the round.
//!
//! ### Framed TCP Transport
//! Events travel as length-prefixed bincode frames (see `shared::codec`).
//! Writer tasks drain per-connection outbound queues so a slow client never
//! stalls a session.
//!
//! ### Deterministic Timing
//! All deadlines use `tokio::time`, which lets the test suite run entire
//! sessions on a paused clock.
//!
//! ## Module Organization
//!
//! - `config`: server, session and matchmaker settings
//! - `connection`: player profiles and outbound connection handles
//! - `error`: error types for every layer
//! - `matchmaker`: ranked, invite and training queues
//! - `network`: TCP accept loop and handshake
//! - `questions`: question sources and the JSON question bank
//! - `rating`: Elo rating strategy
//! - `recorder`: result recording, history and rankings
//! - `result`: answers, round records and session results
//! - `scoring`: per-answer scoring rule
//! - `session`: the game session state machine
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bundled question bank, in-memory recorder, Elo with K = 32
//!     let server = Server::from_config(ServerConfig::default()).await?;
//!
//!     // Accept players forever; each match runs in its own task
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod matchmaker;
pub mod network;
pub mod questions;
pub mod rating;
pub mod recorder;
pub mod result;
pub mod scoring;
pub mod session;
