use clap::Parser;
use log::info;
use server::config::{MatchmakerConfig, ServerConfig, SessionConfig};
use server::network::Server;
use server::questions::BatchFilters;
use server::scoring::ScoringRule;
use shared::Difficulty;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// JSON question bank (open-trivia format); the bundled sample is used otherwise
    #[arg(short, long)]
    bank: Option<PathBuf>,

    /// Questions per session
    #[arg(short, long, default_value = "10")]
    questions: usize,

    /// Seconds to answer a question, unless the bank entry sets its own limit
    #[arg(short = 't', long, default_value = "15")]
    time_limit: u64,

    /// Pause between rounds in milliseconds
    #[arg(long, default_value = "1000")]
    round_gap_ms: u64,

    /// Points for a correct answer
    #[arg(long, default_value_t = server::scoring::DEFAULT_BASE_POINTS)]
    base_points: u32,

    /// Maximum extra points for answering fast (0 disables the bonus)
    #[arg(long, default_value = "0")]
    speed_bonus: u32,

    /// Seconds a dropped player may rejoin (0 disables rejoining)
    #[arg(long, default_value = "15")]
    grace_secs: u64,

    /// Allow rejoining ranked duels
    #[arg(long)]
    allow_ranked_rebind: bool,

    /// Elo K-factor for ranked duels
    #[arg(short, long, default_value_t = server::rating::DEFAULT_K_FACTOR)]
    k_factor: f64,

    /// Largest rating difference between ranked opponents
    #[arg(long)]
    max_rating_gap: Option<i32>,

    /// Serve questions in bank order with the answer first
    #[arg(long)]
    no_shuffle: bool,

    /// Only use questions from this category
    #[arg(long)]
    category: Option<String>,

    /// Only use questions of this difficulty (easy, medium, hard)
    #[arg(long, value_parser = parse_difficulty)]
    difficulty: Option<Difficulty>,
}

fn parse_difficulty(value: &str) -> Result<Difficulty, String> {
    match value.to_ascii_lowercase().as_str() {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        other => Err(format!("unknown difficulty '{}'", other)),
    }
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let bind_addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;

        let session = SessionConfig {
            question_count: self.questions,
            round_gap: Duration::from_millis(self.round_gap_ms),
            scoring: ScoringRule::new(self.base_points, self.speed_bonus),
            grace_window: (self.grace_secs > 0).then(|| Duration::from_secs(self.grace_secs)),
            allow_ranked_rebind: self.allow_ranked_rebind,
            filters: BatchFilters {
                category: self.category,
                difficulty: self.difficulty,
            },
            ..SessionConfig::default()
        };

        Ok(ServerConfig {
            bind_addr,
            question_bank: self.bank,
            question_time_limit: Duration::from_secs(self.time_limit),
            shuffle_questions: !self.no_shuffle,
            k_factor: self.k_factor,
            session,
            matchmaker: MatchmakerConfig {
                max_rating_gap: self.max_rating_gap,
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config()?;
    info!(
        "Starting trivia server: {} questions per session, {}s per question",
        config.session.question_count,
        config.question_time_limit.as_secs()
    );

    let server = Server::from_config(config).await?;

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
