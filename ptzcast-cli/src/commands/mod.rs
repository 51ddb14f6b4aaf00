//! CLI command implementations

mod camera;
mod config;
mod daemon;
mod stream;

pub use camera::{camera_config, controls, get, home, pan, reset, set, tilt, zoom};
pub use config::{ConfigArgs, config};
pub use daemon::{ServeArgs, events, serve, shutdown};
pub use stream::{
    OverlayArgs, StartArgs, StreamConfigArgs, encoders, overlay, start, status, stop,
    stream_config,
};

use anyhow::Result;
use ptzcast_core::PtzError;
use ptzcast_core::ipc::IpcClient;
use serde::Serialize;

/// Connect to the running daemon
async fn connect() -> Result<IpcClient> {
    IpcClient::connect().await.map_err(with_hint)
}

/// Turn a core error into a report carrying its user hint
fn with_hint(err: PtzError) -> anyhow::Error {
    match err.user_hint() {
        Some(hint) => anyhow::anyhow!("{}\n  hint: {}", err, hint),
        None => err.into(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
