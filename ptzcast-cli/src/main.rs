//! ptzcast CLI
//!
//! PTZ camera control and supervised streaming for V4L2 devices.
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon in the foreground
//! ptzcast serve
//!
//! # Move the camera
//! ptzcast pan 15
//! ptzcast zoom 4
//!
//! # Stream to an SRT listener
//! ptzcast start --protocol srt --destination srt://10.0.0.2:9000
//! ptzcast stop
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// ptzcast - PTZ camera control and streaming
#[derive(Parser)]
#[command(name = "ptzcast")]
#[command(author = "GhostKellz")]
#[command(version)]
#[command(
    about = "PTZ camera control and supervised hardware-encoded streaming",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Serve(commands::ServeArgs),

    /// Show stream status
    Status,

    /// Start streaming
    Start(commands::StartArgs),

    /// Stop streaming
    Stop,

    /// Read a control from the camera
    Get {
        /// Control name, e.g. brightness
        control: String,
    },

    /// Set a control and persist it
    Set {
        /// Control name, e.g. brightness
        control: String,
        /// New value
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },

    /// List every control the device exposes
    #[command(alias = "ls")]
    Controls,

    /// Show the persisted camera config
    CameraConfig,

    /// Restore every control to its default
    Reset,

    /// Pan relative to the current position
    Pan {
        /// Degrees, negative pans left
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
    },

    /// Tilt relative to the current position
    Tilt {
        /// Degrees, negative tilts down
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
    },

    /// Set the zoom level
    Zoom {
        /// Zoom level (0-12)
        level: i64,
    },

    /// Return to the home position
    Home,

    /// Update overlay settings (takes effect on next start)
    Overlay(commands::OverlayArgs),

    /// Show or update the stream config (takes effect on next start)
    StreamConfig(commands::StreamConfigArgs),

    /// Check which hardware encoder is available
    Encoders,

    /// Follow control and stream events
    Events,

    /// Stop the daemon
    Shutdown,

    /// Manage the settings file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let directive = format!("ptzcast={}", level).parse()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_target(false)
        .init();

    // Run the appropriate command
    match cli.command {
        Commands::Serve(args) => commands::serve(args).await?,
        Commands::Status => commands::status().await?,
        Commands::Start(args) => commands::start(args).await?,
        Commands::Stop => commands::stop().await?,
        Commands::Get { control } => commands::get(&control).await?,
        Commands::Set { control, value } => commands::set(&control, value).await?,
        Commands::Controls => commands::controls().await?,
        Commands::CameraConfig => commands::camera_config().await?,
        Commands::Reset => commands::reset().await?,
        Commands::Pan { degrees } => commands::pan(degrees).await?,
        Commands::Tilt { degrees } => commands::tilt(degrees).await?,
        Commands::Zoom { level } => commands::zoom(level).await?,
        Commands::Home => commands::home().await?,
        Commands::Overlay(args) => commands::overlay(args).await?,
        Commands::StreamConfig(args) => commands::stream_config(args).await?,
        Commands::Encoders => commands::encoders().await?,
        Commands::Events => commands::events().await?,
        Commands::Shutdown => commands::shutdown().await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
