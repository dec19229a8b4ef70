use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use meshcam::PeerId;
use meshcam::client::{MeshConfig, MeshSession, MeshView, RtcConnector, SyntheticMediaSource};
use meshcam::relay::{RelayConfig, run_relay};

#[derive(Parser)]
#[command(name = "meshcam")]
#[command(bin_name = "meshcam")]
#[command(about = "Full-mesh video rooms over WebRTC", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        #[arg(long)]
        bind: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Join a room as a headless participant with synthetic media.
    Join {
        #[arg(long)]
        url: Option<String>,

        #[arg(short, long)]
        room: String,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        no_audio: bool,
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
        Commands::Relay { bind, config } => relay(bind, config).await,
        Commands::Join {
            url,
            room,
            config,
            no_audio,
        } => join(url, room, config, no_audio).await,
    }
}

async fn relay(bind: Option<String>, config: Option<PathBuf>) -> Result<()> {
    let mut config = match config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }

    println!(
        "{}",
        format!("📡 Starting relay on {}...", config.bind_addr)
            .green()
            .bold()
    );

    tokio::select! {
        res = run_relay(config) => res,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Relay stopped.".yellow());
            Ok(())
        }
    }
}

async fn join(
    url: Option<String>,
    room: String,
    config: Option<PathBuf>,
    no_audio: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => MeshConfig::load(path)?,
        None => MeshConfig::default(),
    };
    if let Some(url) = url {
        config.signaling_url = url;
    }

    println!(
        "{}",
        format!("🔌 Connecting to {}...", config.signaling_url).cyan()
    );
    let media = SyntheticMediaSource::new(true, !no_audio);
    let handle = MeshSession::connect(config, Arc::new(media), Arc::new(RtcConnector)).await?;

    handle
        .start_local_media()
        .await
        .context("Failed to start local media")?;
    handle
        .join_room(room.as_str())
        .await
        .with_context(|| format!("Failed to join room {}", room))?;
    println!(
        "{}",
        format!("✨ Joined room '{}'. Press Ctrl-C to leave.", room)
            .green()
            .bold()
    );

    let mut views = handle.subscribe();
    let mut ready = HashSet::new();
    let mut signaling_up = true;

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                report_peers(&view, &mut ready);

                if view.signaling_available != signaling_up {
                    signaling_up = view.signaling_available;
                    if signaling_up {
                        println!("{}", "Relay connection restored.".green());
                    } else {
                        println!("{}", "Relay connection lost, keeping peers.".yellow());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("{}", "👋 Leaving...".cyan());
    handle.teardown().await?;
    Ok(())
}

fn report_peers(view: &MeshView, ready: &mut HashSet<PeerId>) {
    for status in &view.peers {
        if status.is_ready() && ready.insert(status.peer_id.clone()) {
            println!(
                "   {} {} ({:?})",
                "✔".green(),
                status.peer_id.short(),
                status.role
            );
        }
    }

    ready.retain(|peer_id| {
        let present = view.peer(peer_id).is_some();
        if !present {
            println!("   {} {} left", "✖".red(), peer_id.short());
        }
        present
    });
}
