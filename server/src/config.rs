//! Runtime configuration for the server, its sessions and the matchmaker.

use crate::questions::BatchFilters;
use crate::scoring::ScoringRule;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Policy applied to every session the server starts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of questions (rounds) per session
    pub question_count: usize,
    /// Pause between a round result and the next question
    pub round_gap: Duration,
    pub scoring: ScoringRule,
    /// How long a dropped player may rebind. `None` disables rebinding.
    pub grace_window: Option<Duration>,
    pub allow_ranked_rebind: bool,
    pub source_timeout: Duration,
    pub record_timeout: Duration,
    pub filters: BatchFilters,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            question_count: 10,
            round_gap: Duration::from_secs(1),
            scoring: ScoringRule::default(),
            grace_window: Some(Duration::from_secs(15)),
            allow_ranked_rebind: false,
            source_timeout: Duration::from_secs(5),
            record_timeout: Duration::from_secs(5),
            filters: BatchFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchmakerConfig {
    /// Largest rating difference allowed between ranked opponents
    pub max_rating_gap: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// JSON question bank; the built-in sample bank is used when absent
    pub question_bank: Option<PathBuf>,
    /// Default per-question time limit for bank entries without their own
    pub question_time_limit: Duration,
    pub shuffle_questions: bool,
    pub k_factor: f64,
    pub session: SessionConfig,
    pub matchmaker: MatchmakerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], shared::DEFAULT_PORT)),
            question_bank: None,
            question_time_limit: Duration::from_secs(15),
            shuffle_questions: true,
            k_factor: crate::rating::DEFAULT_K_FACTOR,
            session: SessionConfig::default(),
            matchmaker: MatchmakerConfig::default(),
        }
    }
}
