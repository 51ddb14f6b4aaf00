//! Configuration types for ptzcast
//!
//! Stream and overlay settings, their partial-update patches, the TOML
//! daemon settings file, and the JSON state documents.

mod file;
mod store;

pub use file::{
    ConfigFile, DeviceSettings, PreviewSettings, ReaperSettings, StateSettings, StreamSettings,
    sample_config,
};
pub use store::{CameraConfigStore, JsonDocument, StreamConfigStore};

use serde::{Deserialize, Serialize};

use crate::error::{PtzError, Result};

/// Streaming protocol for the outbound stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    /// SRT caller into a listener (low latency)
    #[default]
    Srt,
    /// RTMP push (Twitch, YouTube, local nginx-rtmp)
    Rtmp,
    /// Raw MPEG-TS over UDP
    Udp,
    /// Anything else; kept so persisted values survive and the builder can reject them
    Other(String),
}

impl Protocol {
    /// Whether a stream with this protocol cannot start without a destination
    pub fn requires_destination(&self) -> bool {
        matches!(self, Self::Srt | Self::Udp)
    }

    /// Protocol name as used in configuration
    pub fn as_str(&self) -> &str {
        match self {
            Self::Srt => "srt",
            Self::Rtmp => "rtmp",
            Self::Udp => "udp",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Protocol {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "srt" => Self::Srt,
            "rtmp" => Self::Rtmp,
            "udp" => Self::Udp,
            _ => Self::Other(s),
        }
    }
}

impl From<Protocol> for String {
    fn from(p: Protocol) -> Self {
        p.as_str().to_string()
    }
}

impl std::str::FromStr for Protocol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware H.264 encoder element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Encoder {
    /// NVIDIA Jetson V4L2 encoder
    #[default]
    Nvv4l2h264enc,
    /// OpenMAX encoder (older Jetson / Raspberry Pi)
    Omxh264enc,
    /// Stateful V4L2 M2M encoder (Raspberry Pi 4)
    V4l2h264enc,
    /// Software x264, for hosts without an encoder block
    X264enc,
    /// Unrecognized element name
    Other(String),
}

impl Encoder {
    /// GStreamer element name
    pub fn element(&self) -> &str {
        match self {
            Self::Nvv4l2h264enc => "nvv4l2h264enc",
            Self::Omxh264enc => "omxh264enc",
            Self::V4l2h264enc => "v4l2h264enc",
            Self::X264enc => "x264enc",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Encoder {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "nvv4l2h264enc" => Self::Nvv4l2h264enc,
            "omxh264enc" => Self::Omxh264enc,
            "v4l2h264enc" => Self::V4l2h264enc,
            "x264enc" => Self::X264enc,
            _ => Self::Other(s),
        }
    }
}

impl From<Encoder> for String {
    fn from(e: Encoder) -> Self {
        e.element().to_string()
    }
}

impl std::str::FromStr for Encoder {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.element())
    }
}

/// Pixel format requested from the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    /// Motion JPEG, decoded in the pipeline
    #[default]
    Mjpeg,
    /// Uncompressed YUY2
    Yuyv,
}

/// What the overlay shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    /// Title/subtitle text
    #[default]
    Text,
    /// An image fetched from `url`
    Url,
}

/// Vertical placement of overlay text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    #[default]
    Top,
    Bottom,
    Center,
}

/// Background behind overlay text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayBackground {
    /// Text drawn directly on video
    None,
    /// Semi-transparent shaded box
    #[default]
    Shaded,
}

/// Overlay settings embedded in the stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayConfig {
    /// Whether any overlay stage is rendered
    pub enabled: bool,
    /// Text or image overlay
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    /// Main title text
    pub title: String,
    /// Secondary text line
    pub subtitle: String,
    /// Image location for `url` overlays
    pub url: String,
    /// Vertical placement
    pub position: OverlayPosition,
    /// Burn in a wall-clock timestamp
    pub show_timestamp: bool,
    /// strftime format for the timestamp
    pub timestamp_format: String,
    /// Title font size in points
    pub font_size: u32,
    /// Text color name
    pub color: String,
    /// Background style
    pub background: OverlayBackground,
    /// Background opacity, 0.0 - 1.0
    pub background_opacity: f32,
    /// Logo image path
    pub logo_path: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: OverlayKind::Text,
            title: String::new(),
            subtitle: String::new(),
            url: String::new(),
            position: OverlayPosition::Top,
            show_timestamp: false,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            font_size: 32,
            color: "white".to_string(),
            background: OverlayBackground::Shaded,
            background_opacity: 0.5,
            logo_path: String::new(),
        }
    }
}

/// Outbound stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    /// Transport protocol
    pub protocol: Protocol,
    /// Destination URI (empty RTMP destination means the local server)
    pub destination: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Capture framerate
    pub framerate: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Encoder element
    pub encoder: Encoder,
    /// Capture pixel format
    pub capture_format: CaptureFormat,
    /// Start streaming when the daemon starts
    pub auto_start: bool,
    /// Overlay settings
    pub overlay: OverlayConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Srt,
            destination: String::new(),
            width: 1920,
            height: 1080,
            framerate: 30,
            bitrate: 5_000_000,
            encoder: Encoder::Nvv4l2h264enc,
            capture_format: CaptureFormat::Mjpeg,
            auto_start: false,
            overlay: OverlayConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Shallow-merge a patch into this config.
    ///
    /// No range or kind validation happens here.
    pub fn merge(&mut self, patch: StreamConfigPatch) {
        let StreamConfigPatch {
            protocol,
            destination,
            width,
            height,
            framerate,
            bitrate,
            encoder,
            capture_format,
            auto_start,
            overlay,
        } = patch;

        if let Some(v) = protocol {
            self.protocol = v;
        }
        if let Some(v) = destination {
            self.destination = v;
        }
        if let Some(v) = width {
            self.width = v;
        }
        if let Some(v) = height {
            self.height = v;
        }
        if let Some(v) = framerate {
            self.framerate = v;
        }
        if let Some(v) = bitrate {
            self.bitrate = v;
        }
        if let Some(v) = encoder {
            self.encoder = v;
        }
        if let Some(v) = capture_format {
            self.capture_format = v;
        }
        if let Some(v) = auto_start {
            self.auto_start = v;
        }
        if let Some(v) = overlay {
            self.overlay.merge(v);
        }
    }

    /// Fail if the protocol needs a destination and none is set
    pub fn check_destination(&self) -> Result<()> {
        if self.protocol.requires_destination() && self.destination.trim().is_empty() {
            return Err(PtzError::MissingDestination(self.protocol.to_string()));
        }
        Ok(())
    }
}

impl OverlayConfig {
    /// Shallow-merge a patch into this overlay config
    pub fn merge(&mut self, patch: OverlayPatch) {
        let OverlayPatch {
            enabled,
            kind,
            title,
            subtitle,
            url,
            position,
            show_timestamp,
            timestamp_format,
            font_size,
            color,
            background,
            background_opacity,
            logo_path,
        } = patch;

        if let Some(v) = enabled {
            self.enabled = v;
        }
        if let Some(v) = kind {
            self.kind = v;
        }
        if let Some(v) = title {
            self.title = v;
        }
        if let Some(v) = subtitle {
            self.subtitle = v;
        }
        if let Some(v) = url {
            self.url = v;
        }
        if let Some(v) = position {
            self.position = v;
        }
        if let Some(v) = show_timestamp {
            self.show_timestamp = v;
        }
        if let Some(v) = timestamp_format {
            self.timestamp_format = v;
        }
        if let Some(v) = font_size {
            self.font_size = v;
        }
        if let Some(v) = color {
            self.color = v;
        }
        if let Some(v) = background {
            self.background = v;
        }
        if let Some(v) = background_opacity {
            self.background_opacity = v;
        }
        if let Some(v) = logo_path {
            self.logo_path = v;
        }
    }
}

/// Partial update of [`StreamConfig`]; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<Encoder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_format: Option<CaptureFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayPatch>,
}

impl StreamConfigPatch {
    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial update of [`OverlayConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<OverlayKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<OverlayPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_timestamp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<OverlayBackground>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_opacity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<String>,
}
