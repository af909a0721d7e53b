use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use meshcall_client::{
    ErrorKind, RoomEvent, RoomSession, RtcSessionFactory, SampleTrackMedia, SessionConfig,
    TransportConfig, WsConnector,
};
use meshcall_core::PeerId;
use meshcall_server::RelayConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshcall")]
#[command(about = "Mesh audio/video rooms over a websocket relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the room relay.
    Relay {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },
    /// Join a room as a headless participant with synthetic tracks.
    Join {
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,

        #[arg(short, long)]
        room: String,

        #[arg(short, long)]
        name: String,

        /// Fixed identity instead of a generated one.
        #[arg(long)]
        identity: Option<String>,

        /// STUN server URL, may be repeated. Defaults to public STUN.
        #[arg(long = "stun")]
        stun: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { bind } => run_relay(bind).await,
        Commands::Join {
            url,
            room,
            name,
            identity,
            stun,
        } => run_join(url, room, name, identity, stun).await,
    }
}

async fn run_relay(bind: SocketAddr) -> Result<()> {
    println!("{}", format!("📡 Starting relay on {}", bind).green().bold());

    let config = RelayConfig {
        bind,
        ..Default::default()
    };
    meshcall_server::serve(config)
        .await
        .context("Relay stopped")
}

async fn run_join(
    url: String,
    room: String,
    name: String,
    identity: Option<String>,
    stun: Vec<String>,
) -> Result<()> {
    let transport = if stun.is_empty() {
        TransportConfig::default()
    } else {
        TransportConfig::with_stun_urls(stun)
    };
    let connector = WsConnector::new(&url).with_context(|| format!("Bad relay URL {}", url))?;

    let session = RoomSession::new(
        SessionConfig {
            identity: identity.map(PeerId::from),
            ..Default::default()
        },
        Arc::new(connector),
        Arc::new(SampleTrackMedia),
        Arc::new(RtcSessionFactory::new(transport)),
    );

    println!("{}", format!("🚪 Joining room {} as {}...", room, name).cyan());
    let (handle, mut events) = session
        .join(room.as_str(), &name)
        .await
        .context("Failed to join room")?;
    println!("   🆔 Identity: {}", handle.identity());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving {}", room);
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let channel_lost = is_channel_loss(&event);
                print_event(&event);
                if channel_lost {
                    break;
                }
            }
        }
    }

    handle.leave().await.context("Failed to leave room")?;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    println!("{}", "👋 Left the room".green().bold());
    Ok(())
}

fn is_channel_loss(event: &RoomEvent) -> bool {
    matches!(
        event,
        RoomEvent::Error {
            kind: ErrorKind::Channel,
            ..
        }
    )
}

fn print_event(event: &RoomEvent) {
    match event {
        RoomEvent::StatusChanged(status) => println!("{} {}", "●".blue(), status.bold()),
        RoomEvent::PeerVideoAvailable {
            peer_id,
            media,
            display_name,
        } => println!(
            "{} {} ({}) is streaming {}",
            "▶".green(),
            display_name.bold(),
            peer_id,
            media.stream_id
        ),
        RoomEvent::PeerRemoved(peer_id) => println!("{} {} left", "◀".yellow(), peer_id),
        RoomEvent::Error { kind, message } => {
            println!("{} {}: {}", "✖".red(), kind.to_string().red(), message)
        }
    }
}
