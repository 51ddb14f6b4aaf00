//! Stream commands - start, stop and configure the outbound stream

use anyhow::{Result, bail};
use clap::Args;
use ptzcast_core::config::{
    CaptureFormat, Encoder, OverlayBackground, OverlayKind, OverlayPatch, OverlayPosition,
    Protocol, StreamConfigPatch,
};
use ptzcast_core::{StreamConfig, StreamStatus};
use serde::de::DeserializeOwned;

use super::{connect, print_json, with_hint};

/// Parse a lowercase config value the same way the JSON state does
fn parse_value<T: DeserializeOwned>(s: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("invalid value '{}'", s))
}

/// Stream settings shared by `start` and `stream-config`
#[derive(Args)]
pub struct StreamFields {
    /// Protocol (srt, rtmp, udp)
    #[arg(short, long)]
    protocol: Option<Protocol>,

    /// Destination URI, e.g. srt://10.0.0.2:9000
    #[arg(short, long)]
    destination: Option<String>,

    /// Capture width
    #[arg(long)]
    width: Option<u32>,

    /// Capture height
    #[arg(long)]
    height: Option<u32>,

    /// Capture framerate
    #[arg(long)]
    framerate: Option<u32>,

    /// Bitrate in bits per second
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Encoder (nvv4l2h264enc, omxh264enc, v4l2h264enc, x264enc)
    #[arg(short, long)]
    encoder: Option<Encoder>,

    /// Capture format (mjpeg, yuyv)
    #[arg(long, value_parser = parse_value::<CaptureFormat>)]
    capture_format: Option<CaptureFormat>,
}

impl StreamFields {
    fn patch(self) -> StreamConfigPatch {
        StreamConfigPatch {
            protocol: self.protocol,
            destination: self.destination,
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            bitrate: self.bitrate,
            encoder: self.encoder,
            capture_format: self.capture_format,
            ..Default::default()
        }
    }
}

/// Arguments for the start command
#[derive(Args)]
pub struct StartArgs {
    #[command(flatten)]
    stream: StreamFields,
}

/// Arguments for the stream-config command
#[derive(Args)]
pub struct StreamConfigArgs {
    #[command(flatten)]
    stream: StreamFields,

    /// Resume streaming when the daemon starts
    #[arg(long)]
    auto_start: Option<bool>,
}

/// Arguments for the overlay command
#[derive(Args)]
pub struct OverlayArgs {
    /// Turn the overlay on
    #[arg(long, conflicts_with = "disable")]
    enable: bool,

    /// Turn the overlay off
    #[arg(long)]
    disable: bool,

    /// Overlay type (text, url)
    #[arg(long = "type", value_parser = parse_value::<OverlayKind>)]
    kind: Option<OverlayKind>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    subtitle: Option<String>,

    /// Image location for url overlays
    #[arg(long)]
    url: Option<String>,

    /// Text position (top, bottom, center)
    #[arg(long, value_parser = parse_value::<OverlayPosition>)]
    position: Option<OverlayPosition>,

    /// Burn in a timestamp
    #[arg(long)]
    timestamp: Option<bool>,

    /// strftime format for the timestamp
    #[arg(long)]
    timestamp_format: Option<String>,

    /// Title font size in points
    #[arg(long)]
    font_size: Option<u32>,

    /// Text color name (white, black, red, ...)
    #[arg(long)]
    color: Option<String>,

    /// Background style (none, shaded)
    #[arg(long, value_parser = parse_value::<OverlayBackground>)]
    background: Option<OverlayBackground>,

    /// Background opacity, 0.0 - 1.0
    #[arg(long)]
    opacity: Option<f32>,

    /// Logo image path
    #[arg(long)]
    logo: Option<String>,
}

impl OverlayArgs {
    fn patch(self) -> OverlayPatch {
        let enabled = match (self.enable, self.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        OverlayPatch {
            enabled,
            kind: self.kind,
            title: self.title,
            subtitle: self.subtitle,
            url: self.url,
            position: self.position,
            show_timestamp: self.timestamp,
            timestamp_format: self.timestamp_format,
            font_size: self.font_size,
            color: self.color,
            background: self.background,
            background_opacity: self.opacity.map(|o| o.clamp(0.0, 1.0)),
            logo_path: self.logo,
        }
    }
}

fn print_status(status: &StreamStatus) {
    println!("ptzcast - Stream Status\n");
    println!("  State:       {}", status.state);
    if let Some(pid) = status.pid {
        println!("  PID:         {}", pid);
    }
    if let Some(uptime) = status.uptime_secs {
        println!("  Uptime:      {}s", uptime);
    }

    let config = status.active_config.as_ref().unwrap_or(&status.config);
    println!("  Protocol:    {}", config.protocol);
    if !config.destination.is_empty() {
        println!("  Destination: {}", config.destination);
    }
    println!(
        "  Video:       {}x{} @ {} fps, {} kbps, {}",
        config.width,
        config.height,
        config.framerate,
        config.bitrate / 1000,
        config.encoder
    );
    println!("  Auto-start:  {}", status.config.auto_start);
    if status.restart_pending {
        println!();
        println!("Config changed since the stream started; restart to apply.");
    }
}

fn print_changed(config: &StreamConfig, streaming: bool) -> Result<()> {
    print_json(config)?;
    if streaming {
        println!();
        println!("Stream is running; changes apply on the next start.");
    }
    Ok(())
}

/// Show stream status
pub async fn status() -> Result<()> {
    let mut client = connect().await?;
    let status = client.status().await.map_err(with_hint)?;
    print_status(&status);
    Ok(())
}

/// Start streaming
pub async fn start(args: StartArgs) -> Result<()> {
    let mut client = connect().await?;
    let status = client
        .start_stream(args.stream.patch())
        .await
        .map_err(with_hint)?;
    println!("Stream started!\n");
    print_status(&status);
    Ok(())
}

/// Stop streaming
pub async fn stop() -> Result<()> {
    let mut client = connect().await?;
    client.stop_stream().await.map_err(with_hint)?;
    println!("Stopping stream...");
    Ok(())
}

/// Show or update the stream config
pub async fn stream_config(args: StreamConfigArgs) -> Result<()> {
    let mut client = connect().await?;
    let mut patch = args.stream.patch();
    patch.auto_start = args.auto_start;

    let status = client.status().await.map_err(with_hint)?;
    if patch.is_empty() {
        return print_json(&status.config);
    }
    let config = client.update_config(patch).await.map_err(with_hint)?;
    print_changed(&config, status.is_streaming)
}

/// Show or update overlay settings
pub async fn overlay(args: OverlayArgs) -> Result<()> {
    let mut client = connect().await?;
    let patch = args.patch();

    let status = client.status().await.map_err(with_hint)?;
    if patch == OverlayPatch::default() {
        return print_json(&status.config.overlay);
    }
    let config = client.update_overlay(patch).await.map_err(with_hint)?;
    print_changed(&config, status.is_streaming)
}

/// Look for a hardware encoder on the daemon host
pub async fn encoders() -> Result<()> {
    let mut client = connect().await?;
    let probe = client.detect_encoder().await.map_err(with_hint)?;
    match probe.encoder {
        Some(encoder) if probe.success => {
            println!("{}: {}", probe.message, encoder);
            println!("Use it with: ptzcast stream-config --encoder {}", encoder);
            Ok(())
        }
        _ => bail!("{}; x264enc is the software fallback", probe.message),
    }
}
