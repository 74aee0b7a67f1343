use clap::Parser;
use client::input::AutoPlayer;
use client::network::{Client, ClientOptions};
use log::info;
use shared::{MatchRequest, PlayerId, SessionId};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player id; a random one is used when omitted
    #[arg(short, long)]
    id: Option<PlayerId>,

    /// Display name
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Rating to report if the server has none on record
    #[arg(short, long)]
    rating: Option<i32>,

    /// Play a solo training game
    #[arg(short, long, conflicts_with = "invite")]
    training: bool,

    /// Play an unranked duel with whoever uses the same invite token
    #[arg(long)]
    invite: Option<String>,

    /// Rejoin a session after a disconnect
    #[arg(long, conflicts_with_all = ["training", "invite"])]
    resume: Option<SessionId>,

    /// Let the client answer on its own
    #[arg(short, long)]
    auto: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let request = match (args.training, args.invite) {
        (true, _) => MatchRequest::Training,
        (false, Some(invite_token)) => MatchRequest::Direct { invite_token },
        (false, None) => MatchRequest::Ranked,
    };
    let player_id = args.id.unwrap_or_else(rand::random);

    let mut options = ClientOptions::new(player_id, args.name, request);
    options.rating = args.rating;
    options.resume = args.resume;
    options.interactive = !args.auto;
    options.echo = true;
    if args.auto {
        options.auto = Some(AutoPlayer::default());
    }

    info!("Starting client as player {}...", player_id);
    info!("Connecting to: {}", args.server);
    if !args.auto {
        info!("Controls: 1-4 to answer, 50 for fifty-fifty, q to leave");
    }

    let client = Client::connect(&args.server, options).await?;
    let outcome = client.run().await?;

    if let Some(session_id) = outcome.session_id {
        info!(
            "Session {} finished with {} points",
            session_id, outcome.final_score
        );
    }

    Ok(())
}
