//! # Trivia Duel Client Library
//!
//! This library provides a terminal client for the trivia duel server. It
//! connects, asks for a match, shows questions as they arrive and sends the
//! player's answers back.
//!
//! ## Architecture Overview
//!
//! The server is authoritative for everything that matters: which answers
//! count, what they score and who wins. The client keeps a local mirror of the
//! session built only from server events, and uses it to show the game and to
//! refuse obviously pointless input before it reaches the wire.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The local view of a session:
//! - Session id, mode and opponent
//! - The open question, including choices struck by the fifty-fifty lifeline
//! - Running scores and the final result
//!
//! ### Input Module (`input`)
//! Turns typed lines into client events:
//! - `1`..`n` answer with that choice
//! - `50` asks for the fifty-fifty lifeline
//! - `q` leaves the game
//!
//! It also holds the automatic player used for demos and tests.
//!
//! ### Network Module (`network`)
//! Manages the TCP connection:
//! - Handshake with a new match request or a resume of a dropped session
//! - A receiver task decoding framed server events
//! - The event loop combining server events, stdin lines and auto answers
//!
//! ### Rendering Module (`rendering`)
//! Formats server events as terminal text.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::AutoPlayer;
//! use client::network::{Client, ClientOptions};
//! use shared::MatchRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut options = ClientOptions::new(7, "ada", MatchRequest::Training);
//!     options.auto = Some(AutoPlayer::default());
//!     options.echo = true;
//!
//!     let client = Client::connect("127.0.0.1:8080", options).await?;
//!     let outcome = client.run().await?;
//!     println!("Final score: {}", outcome.final_score);
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
