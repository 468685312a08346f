//! livedm-cli - Command-line tools for live-room push streams
//!
//! Watches a room with colored output, and decodes, encodes and classifies
//! frames offline.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use livedm_client::{ConnectionState, SessionConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "livedm-cli")]
#[command(about = "Command-line tools for live-room push streams")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Join a room and print its events until Ctrl+C
    Watch {
        /// Room id
        #[arg(short, long, env = "LIVEDM_ROOM_ID")]
        room: u64,

        /// Push server URL
        #[arg(
            short,
            long,
            env = "LIVEDM_SERVER_URL",
            default_value = "wss://broadcastlv.chat.bilibili.com:443/sub"
        )]
        url: String,

        /// Viewer uid (0 = anonymous)
        #[arg(long, env = "LIVEDM_UID", default_value = "0")]
        uid: u64,

        /// Auth token from the room-info call
        #[arg(short = 't', long, env = "LIVEDM_TOKEN")]
        token: Option<String>,

        /// Gift catalog JSON file
        #[arg(long, env = "LIVEDM_GIFT_CATALOG")]
        catalog: Option<PathBuf>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,

        /// Do not reconnect after the connection drops
        #[arg(long)]
        no_reconnect: bool,
    },

    /// Decode a hex-encoded frame
    Decode {
        /// Frame bytes as hex (whitespace allowed)
        hex: String,
    },

    /// Encode a frame and print it as hex
    Encode {
        /// Operation to encode
        #[arg(value_enum)]
        op: EncodeOp,

        /// JSON body (or @file.json); a message list for compressed replies
        body: Option<String>,

        /// Popularity value for heartbeat-reply
        #[arg(long, default_value = "0")]
        count: u32,

        /// Body encoding for message-reply
        #[arg(long, value_enum, default_value = "json")]
        encoding: EncodingArg,
    },

    /// Classify a push payload (inline JSON or @file.json)
    Classify {
        /// Payload JSON
        payload: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodeOp {
    Heartbeat,
    HeartbeatReply,
    MessageReply,
    Auth,
    AuthReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    Json,
    Deflate,
    Brotli,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            room,
            url,
            uid,
            token,
            catalog,
            json,
            no_reconnect,
        } => {
            let config = SessionConfig::new(url, room)
                .with_uid(uid)
                .with_auth_token(token.unwrap_or_default());
            watch(config, catalog, json, !no_reconnect).await?;
        }
        cmd => match commands::execute(cmd) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Streams a room's events to stdout until Ctrl+C.
async fn watch(
    config: SessionConfig,
    catalog: Option<PathBuf>,
    json: bool,
    auto_reconnect: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = match catalog {
        Some(path) => livedm_core::GiftCatalog::from_file(&path).map_err(|e| {
            eprintln!("{}: {}", "Error".red(), e);
            e
        })?,
        None => livedm_core::GiftCatalog::new(),
    };

    let room_id = config.room_id;
    let session = livedm_client::Session::new(config);
    let relay = livedm_core::EventRelay::with_parts(room_id, catalog, None);
    let _events = relay.on_event(move |event| {
        if json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!("{}", commands::format_event(event));
        }
        Ok(())
    });
    let _packets = relay.attach(&session);

    let mut states = session.watch_state();
    session.connect(auto_reconnect).await;

    eprintln!("{} room {}", "Watching".green(), room_id.to_string().cyan());
    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                eprintln!("{} {}", "Connection".dimmed(), state.to_string().yellow());
                if state == ConnectionState::Idle && !auto_reconnect {
                    eprintln!("{}", "Connection closed".red());
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n{}", "Stopping watch...".dimmed());
                break;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
