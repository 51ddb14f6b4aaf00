//! Stream configuration to pipeline descriptor

use std::path::Path;

use super::{PipelineDescriptor, Stage};
use crate::config::{
    CaptureFormat, Encoder, OverlayBackground, OverlayConfig, OverlayKind, OverlayPosition,
    Protocol, StreamConfig,
};
use crate::error::{PtzError, Result};

/// SRT sink latency budget
pub const SRT_LATENCY_MS: u32 = 125;

/// RTMP target when no destination is configured
pub const RTMP_FALLBACK_URI: &str = "rtmp://localhost/live/stream";

/// UDP host when the destination cannot be parsed
pub const DEFAULT_UDP_HOST: &str = "127.0.0.1";

/// UDP port when the destination cannot be parsed
pub const DEFAULT_UDP_PORT: u16 = 5000;

/// Build the pipeline for `config`, capturing from `device`.
///
/// Pure: no processes are spawned and the same inputs always produce the
/// same descriptor.
pub fn build(config: &StreamConfig, device: &Path) -> Result<PipelineDescriptor> {
    if let Protocol::Other(name) = &config.protocol {
        return Err(PtzError::UnsupportedProtocol(name.clone()));
    }
    if let Encoder::Other(name) = &config.encoder {
        return Err(PtzError::UnsupportedEncoder(name.clone()));
    }

    let mut desc = PipelineDescriptor::new();

    push_source(&mut desc, config, device);

    if config.overlay.enabled {
        push_overlays(&mut desc, &config.overlay);
    }

    push_encoder(&mut desc, config);
    desc.push(Stage::element("h264parse"));
    push_sink(&mut desc, config);

    Ok(desc)
}

fn push_source(desc: &mut PipelineDescriptor, config: &StreamConfig, device: &Path) {
    desc.push(Stage::element("v4l2src").arg("device", device.display()));

    let framerate = format!("{}/1", config.framerate);
    match config.capture_format {
        CaptureFormat::Mjpeg => {
            desc.push(
                Stage::caps("image/jpeg")
                    .arg("width", config.width)
                    .arg("height", config.height)
                    .arg("framerate", framerate),
            );
            desc.push(Stage::element("jpegdec"));
        }
        CaptureFormat::Yuyv => {
            desc.push(
                Stage::caps("video/x-raw")
                    .arg("format", "YUY2")
                    .arg("width", config.width)
                    .arg("height", config.height)
                    .arg("framerate", framerate),
            );
            desc.push(Stage::element("videoconvert"));
        }
    }
}

/// Overlay stages in their fixed order: convert, timestamp, title, subtitle, logo
fn push_overlays(desc: &mut PipelineDescriptor, overlay: &OverlayConfig) {
    desc.push(Stage::element("videoconvert"));

    let edge = match overlay.position {
        OverlayPosition::Bottom => "bottom",
        _ => "top",
    };
    let color = color_to_argb(&overlay.color);

    if overlay.show_timestamp {
        let stage = Stage::element("clockoverlay")
            .arg("time-format", &overlay.timestamp_format)
            .arg("valignment", edge)
            .arg("halignment", "right")
            .arg("font-desc", format!("Sans Bold {}", overlay.font_size));
        desc.push(with_background(stage, overlay));
    }

    if overlay.kind == OverlayKind::Text {
        if !overlay.title.is_empty() {
            let stage = Stage::element("textoverlay")
                .arg("text", &overlay.title)
                .arg("valignment", edge)
                .arg("halignment", "center")
                .arg("font-desc", format!("Sans Bold {}", overlay.font_size))
                .arg("color", color);
            desc.push(with_background(stage, overlay));
        }

        if !overlay.subtitle.is_empty() {
            let valign = match overlay.position {
                OverlayPosition::Bottom => "bottom",
                _ => "center",
            };
            let stage = Stage::element("textoverlay")
                .arg("text", &overlay.subtitle)
                .arg("valignment", valign)
                .arg("halignment", "center")
                .arg("font-desc", format!("Sans {}", subtitle_font_size(overlay.font_size)))
                .arg("color", color);
            desc.push(with_background(stage, overlay));
        }
    }

    let image = match overlay.kind {
        OverlayKind::Url if !overlay.url.is_empty() => overlay.url.as_str(),
        _ => overlay.logo_path.as_str(),
    };
    if !image.is_empty() {
        desc.push(
            Stage::element("gdkpixbufoverlay")
                .arg("location", image)
                .arg("offset-x", 20)
                .arg("offset-y", 20),
        );
    }
}

/// Subtitle text is three quarters of the title size
fn subtitle_font_size(title: u32) -> u64 {
    u64::from(title) * 3 / 4
}

/// Two seconds of frames between keyframes
fn keyframe_interval(framerate: u32) -> u64 {
    u64::from(framerate.max(1)) * 2
}

fn with_background(stage: Stage, overlay: &OverlayConfig) -> Stage {
    match overlay.background {
        OverlayBackground::Shaded => {
            let shading = (overlay.background_opacity.clamp(0.0, 1.0) * 255.0).round() as u32;
            stage
                .arg("shaded-background", true)
                .arg("shading-value", shading)
        }
        OverlayBackground::None => stage.arg("shaded-background", false),
    }
}

fn push_encoder(desc: &mut PipelineDescriptor, config: &StreamConfig) {
    let gop = keyframe_interval(config.framerate);
    match config.encoder {
        Encoder::Nvv4l2h264enc => {
            desc.push(Stage::element("nvvidconv"));
            desc.push(Stage::caps("video/x-raw(memory:NVMM)"));
            desc.push(
                Stage::element("nvv4l2h264enc")
                    .arg("bitrate", config.bitrate)
                    .arg("insert-sps-pps", true)
                    .arg("iframeinterval", gop),
            );
            desc.push(Stage::caps("video/x-h264").arg("stream-format", "byte-stream"));
        }
        Encoder::Omxh264enc => {
            desc.push(
                Stage::element("omxh264enc")
                    .arg("bitrate", config.bitrate)
                    .arg("control-rate", "variable"),
            );
        }
        Encoder::V4l2h264enc => {
            desc.push(
                Stage::element("v4l2h264enc").arg(
                    "extra-controls",
                    format!(
                        "controls,video_bitrate={},repeat_sequence_header=1",
                        config.bitrate
                    ),
                ),
            );
            desc.push(Stage::caps("video/x-h264").arg("level", "(string)4"));
        }
        Encoder::X264enc => {
            desc.push(
                Stage::element("x264enc")
                    .arg("bitrate", config.bitrate / 1000)
                    .arg("tune", "zerolatency")
                    .arg("speed-preset", "ultrafast")
                    .arg("key-int-max", gop),
            );
        }
        // Rejected in build()
        Encoder::Other(_) => {}
    }
}

fn push_sink(desc: &mut PipelineDescriptor, config: &StreamConfig) {
    match config.protocol {
        Protocol::Srt => {
            desc.push(Stage::element("mpegtsmux"));
            desc.push(
                Stage::element("srtsink")
                    .arg("uri", &config.destination)
                    .arg("latency", SRT_LATENCY_MS),
            );
        }
        Protocol::Rtmp => {
            let location = if config.destination.trim().is_empty() {
                RTMP_FALLBACK_URI
            } else {
                config.destination.as_str()
            };
            desc.push(Stage::element("flvmux").arg("streamable", true));
            desc.push(Stage::element("rtmpsink").arg("location", location));
        }
        Protocol::Udp => {
            let (host, port) = parse_udp_destination(&config.destination);
            desc.push(Stage::element("mpegtsmux"));
            desc.push(Stage::element("udpsink").arg("host", host).arg("port", port));
        }
        // Rejected in build()
        Protocol::Other(_) => {}
    }
}

/// Parse `udp://host:port` or `host:port`.
///
/// Each part falls back to its default independently when missing or invalid.
pub fn parse_udp_destination(destination: &str) -> (String, u16) {
    let trimmed = destination.trim();
    let rest = match trimmed.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("udp://") => &trimmed[6..],
        _ => trimmed,
    };
    let authority = rest.split(['/', '?']).next().unwrap_or("");

    let (host, port) = if let Some(stripped) = authority.strip_prefix('[') {
        // [v6]:port
        match stripped.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => ("", None),
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let host = if host.is_empty() {
        DEFAULT_UDP_HOST.to_string()
    } else {
        host.to_string()
    };
    let port = port
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|p| *p != 0)
        .unwrap_or(DEFAULT_UDP_PORT);

    (host, port)
}

/// Map a color name to GStreamer's 0xAARRGGBB encoding; unknown names are white
pub fn color_to_argb(name: &str) -> &'static str {
    match name.trim().to_lowercase().as_str() {
        "black" => "0xFF000000",
        "red" => "0xFFFF0000",
        "green" => "0xFF00FF00",
        "blue" => "0xFF0000FF",
        "yellow" => "0xFFFFFF00",
        "cyan" => "0xFF00FFFF",
        "magenta" => "0xFFFF00FF",
        "orange" => "0xFFFFA500",
        "gray" | "grey" => "0xFF808080",
        _ => "0xFFFFFFFF",
    }
}
