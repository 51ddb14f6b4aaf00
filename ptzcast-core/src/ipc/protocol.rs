//! IPC protocol definitions
//!
//! Newline-delimited JSON messages between the daemon and CLI clients.

use serde::{Deserialize, Serialize};

use crate::config::{OverlayPatch, StreamConfig, StreamConfigPatch};
use crate::controls::CameraConfig;
use crate::device::{AllControls, ApplyReport, ControlResult};
use crate::pipeline::EncoderProbe;
use crate::supervisor::{StreamEvent, StreamStatus};

/// Requests a client can send to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    /// Check if daemon is alive
    Ping,
    /// Raw dump of every device control
    GetAllControls,
    /// Read one control from the device
    GetControl { control: String },
    /// Set one control and persist it
    SetControl { control: String, value: i64 },
    /// Persisted camera config
    GetCameraConfig,
    /// Restore and apply every control default
    ResetCamera,
    /// Relative pan in degrees
    Pan { degrees: f64 },
    /// Relative tilt in degrees
    Tilt { degrees: f64 },
    /// Absolute zoom level
    Zoom { level: i64 },
    /// Move to home position
    ResetPosition,
    /// Stream status snapshot
    StreamStatus,
    /// Start streaming, merging `config` first
    StartStream {
        #[serde(default)]
        config: StreamConfigPatch,
    },
    /// Stop streaming
    StopStream,
    /// Merge and persist stream settings
    UpdateStreamConfig { config: StreamConfigPatch },
    /// Merge and persist overlay settings
    UpdateOverlay { overlay: OverlayPatch },
    /// Look for an available hardware encoder
    DetectEncoder,
    /// Turn this connection into an event stream
    Subscribe,
    /// Stop the daemon gracefully
    Shutdown,
}

/// Responses from the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Simple acknowledgment
    Ok,
    /// Pong response to ping
    Pong,
    /// Error response
    Error { message: String },
    /// Result of a single control operation
    Control(ControlResult),
    /// Raw control listing
    Controls(AllControls),
    /// Persisted camera config
    CameraConfig { config: CameraConfig },
    /// Results of applying a whole camera config
    Applied(ApplyReport),
    /// Stream status
    Status(StreamStatus),
    /// Stream config after a merge
    Config(StreamConfig),
    /// Hardware encoder availability
    Encoder(EncoderProbe),
    /// Pushed to subscribers
    Event { event: DaemonEvent },
    /// Shutdown acknowledgment
    Stopping,
}

/// Event pushed to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonEvent {
    /// Supervisor lifecycle and diagnostics
    Stream(StreamEvent),
    /// Outcome of a control operation
    Control(ControlResult),
}

impl IpcMessage {
    /// Serialize message to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl IpcResponse {
    /// Serialize response to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize response from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        IpcResponse::Error {
            message: message.into(),
        }
    }
}
