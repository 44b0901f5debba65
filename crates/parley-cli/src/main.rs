//! Parley terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Connect and join a room straight away
//! parley --server ws://localhost:8080/ws --token "$PARLEY_TOKEN" --room 10
//!
//! # Start offline; /connect <token> and /join <room> later
//! parley --server ws://localhost:8080/ws
//! ```
//!
//! Plain lines are sent as messages. Commands: `/join <room>`, `/leave`,
//! `/edit <id> <text>`, `/delete <id>`, `/retry`, `/connect [token]`,
//! `/disconnect`, `/quit`.

use chrono::{FixedOffset, Local, Offset};
use clap::Parser;
use parley_app::{Intent, Runtime};
use parley_cli::{ExpectedIdentity, LineRenderer, SystemEnv, TerminalDriver, spawn_stdin_reader};
use parley_client::ClientConfig;
use parley_proto::{RoomId, UserId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley terminal client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Line-oriented client for the Parley chat protocol")]
#[command(version)]
struct Args {
    /// WebSocket URL of the chat server
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/ws")]
    server: String,

    /// Auth token; connects on startup when given
    #[arg(short, long, env = "PARLEY_TOKEN")]
    token: Option<String>,

    /// User id the token should authenticate as
    #[arg(long)]
    user_id: Option<UserId>,

    /// Display name the token should authenticate as
    #[arg(long)]
    username: Option<String>,

    /// Room to join on startup
    #[arg(short, long)]
    room: Option<RoomId>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Offset from UTC for times and day separators [default: local]
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Output owns stdout.
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let offset = match args.utc_offset_minutes {
        Some(minutes) => FixedOffset::east_opt(minutes.saturating_mul(60))
            .ok_or_else(|| format!("UTC offset out of range: {minutes} minutes"))?,
        None => Local::now().offset().fix(),
    };

    let env = SystemEnv::new();
    let expected = ExpectedIdentity { user_id: args.user_id, username: args.username };
    let mut driver = TerminalDriver::new(
        args.server.clone(),
        env,
        spawn_stdin_reader(),
        LineRenderer::new(offset, expected),
        std::io::stdout(),
    );

    if let Some(token) = args.token {
        driver.queue_intent(Intent::Connect { token });
    }
    if let Some(room_id) = args.room {
        driver.queue_intent(Intent::SelectRoom(Some(room_id)));
    }

    tracing::info!(server = %args.server, "parley starting");

    let mut runtime = Runtime::new(driver, env, ClientConfig::default(), offset);
    runtime.run().await?;

    Ok(())
}
