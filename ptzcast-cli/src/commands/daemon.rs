//! Daemon commands - run, follow and stop the daemon

use anyhow::{Context, Result, bail};
use clap::Args;
use ptzcast_core::ipc::{self, DaemonEvent};
use ptzcast_core::{ConfigFile, Daemon, StreamEvent};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{connect, with_hint};

/// Arguments for the serve command
#[derive(Args)]
pub struct ServeArgs {
    /// Settings file (default: ~/.config/ptzcast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket to listen on
    #[arg(long)]
    socket: Option<PathBuf>,
}

/// Run the daemon until shut down
pub async fn serve(args: ServeArgs) -> Result<()> {
    if args.socket.is_none() && ipc::daemon_running().await {
        bail!(
            "A daemon is already listening on {}",
            ipc::socket_path().display()
        );
    }

    let config = match args.config {
        Some(path) => ConfigFile::load_from(path.clone())
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            match ConfigFile::create_default_if_missing() {
                Ok(true) => info!(
                    "Wrote default settings to {}",
                    ConfigFile::default_path().display()
                ),
                Ok(false) => {}
                Err(e) => warn!("Could not write default settings: {}", e),
            }
            ConfigFile::load_or_default()
        }
    };
    info!(
        "Using device {:?}, state in {:?}",
        config.device.path, config.state.dir
    );

    let mut daemon = Daemon::new(config);
    if let Some(socket) = args.socket {
        daemon = daemon.with_socket(socket);
    }
    daemon.run().await.map_err(with_hint)
}

/// Print events until the daemon goes away
pub async fn events() -> Result<()> {
    let client = connect().await?;
    let mut events = client.subscribe().await.map_err(with_hint)?;

    while let Some(event) = events.next_event().await.map_err(with_hint)? {
        match event {
            DaemonEvent::Control(result) if result.success => match result.value {
                Some(value) => println!("[control] {} = {}", result.control, value),
                None => println!("[control] {}", result.control),
            },
            DaemonEvent::Control(result) => println!(
                "[control] {} failed: {}",
                result.control,
                result.error.as_deref().unwrap_or("unknown error")
            ),
            DaemonEvent::Stream(StreamEvent::Started { pid }) => {
                println!("[stream] started (pid {})", pid)
            }
            DaemonEvent::Stream(StreamEvent::Stopped { code, requested }) => {
                let how = if requested { "stopped" } else { "exited unexpectedly" };
                match code {
                    Some(code) => println!("[stream] {} (exit code {})", how, code),
                    None => println!("[stream] {} (killed)", how),
                }
            }
            DaemonEvent::Stream(StreamEvent::Error { message }) => {
                println!("[stream] error: {}", message)
            }
            DaemonEvent::Stream(StreamEvent::Log { message }) => println!("[stream] {}", message),
        }
    }

    println!("Daemon stopped.");
    Ok(())
}

/// Ask the daemon to stop
pub async fn shutdown() -> Result<()> {
    let mut client = connect().await?;
    client.shutdown().await.map_err(with_hint)?;
    println!("Daemon is shutting down.");
    Ok(())
}
