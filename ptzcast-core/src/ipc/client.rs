//! IPC client for CLI commands
//!
//! Connects to the running daemon to send commands and receive responses.

use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use super::protocol::{DaemonEvent, IpcMessage, IpcResponse};
use super::socket_path;
use crate::config::{OverlayPatch, StreamConfig, StreamConfigPatch};
use crate::controls::CameraConfig;
use crate::device::{AllControls, ApplyReport, ControlResult};
use crate::error::{PtzError, Result};
use crate::pipeline::EncoderProbe;
use crate::supervisor::StreamStatus;

/// Default connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for requests that reset or start things on the device
const SLOW_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// IPC client for communicating with the daemon
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl IpcClient {
    /// Connect to the daemon with default timeout
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&socket_path(), CONNECT_TIMEOUT).await
    }

    /// Connect to a daemon listening on `path`
    pub async fn connect_to(path: &Path, timeout: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(PtzError::ipc(format!("No daemon socket at {:?}", path)));
        }

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| PtzError::ipc("Connection timed out"))?
            .map_err(|e| PtzError::ipc(format!("Failed to connect to daemon: {}", e)))?;

        debug!("Connected to daemon at {:?}", path);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send a message and receive a response with timeout
    pub async fn send(&mut self, msg: IpcMessage) -> Result<IpcResponse> {
        self.send_with_timeout(msg, IO_TIMEOUT).await
    }

    /// Send a message and receive a response with custom timeout
    pub async fn send_with_timeout(
        &mut self,
        msg: IpcMessage,
        timeout: Duration,
    ) -> Result<IpcResponse> {
        let msg_bytes = msg.to_bytes();
        tokio::time::timeout(timeout, self.writer.write_all(&msg_bytes))
            .await
            .map_err(|_| PtzError::ipc("Write timed out"))?
            .map_err(|e| PtzError::ipc(format!("Failed to send message: {}", e)))?;

        self.read_response(timeout).await
    }

    async fn read_response(&mut self, timeout: Duration) -> Result<IpcResponse> {
        let mut line = String::new();
        let n = tokio::time::timeout(timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| PtzError::ipc("Read timed out"))?
            .map_err(|e| PtzError::ipc(format!("Failed to read response: {}", e)))?;
        if n == 0 {
            return Err(PtzError::ipc("Daemon closed the connection"));
        }

        IpcResponse::from_bytes(line.trim().as_bytes())
            .map_err(|e| PtzError::ipc(format!("Invalid response: {}", e)))
    }

    /// Ping the daemon to check if it's alive
    pub async fn ping(&mut self) -> Result<bool> {
        match self.send(IpcMessage::Ping).await {
            Ok(IpcResponse::Pong) => Ok(true),
            Ok(_) => Ok(false),
            Err(_) => Ok(false),
        }
    }

    /// Raw listing of every device control
    pub async fn all_controls(&mut self) -> Result<AllControls> {
        match self.send(IpcMessage::GetAllControls).await? {
            IpcResponse::Controls(controls) => Ok(controls),
            other => Err(unexpected(other)),
        }
    }

    /// Read one control
    pub async fn get_control(&mut self, control: &str) -> Result<ControlResult> {
        let msg = IpcMessage::GetControl {
            control: control.to_string(),
        };
        self.control(msg, IO_TIMEOUT).await
    }

    /// Set one control
    pub async fn set_control(&mut self, control: &str, value: i64) -> Result<ControlResult> {
        let msg = IpcMessage::SetControl {
            control: control.to_string(),
            value,
        };
        self.control(msg, IO_TIMEOUT).await
    }

    /// Relative pan in degrees
    pub async fn pan(&mut self, degrees: f64) -> Result<ControlResult> {
        self.control(IpcMessage::Pan { degrees }, IO_TIMEOUT).await
    }

    /// Relative tilt in degrees
    pub async fn tilt(&mut self, degrees: f64) -> Result<ControlResult> {
        self.control(IpcMessage::Tilt { degrees }, IO_TIMEOUT).await
    }

    /// Absolute zoom
    pub async fn zoom(&mut self, level: i64) -> Result<ControlResult> {
        self.control(IpcMessage::Zoom { level }, IO_TIMEOUT).await
    }

    /// Move to home position
    pub async fn reset_position(&mut self) -> Result<ControlResult> {
        self.control(IpcMessage::ResetPosition, IO_TIMEOUT).await
    }

    async fn control(&mut self, msg: IpcMessage, timeout: Duration) -> Result<ControlResult> {
        match self.send_with_timeout(msg, timeout).await? {
            IpcResponse::Control(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    /// Persisted camera config
    pub async fn camera_config(&mut self) -> Result<CameraConfig> {
        match self.send(IpcMessage::GetCameraConfig).await? {
            IpcResponse::CameraConfig { config } => Ok(config),
            other => Err(unexpected(other)),
        }
    }

    /// Restore every control default
    pub async fn reset_camera(&mut self) -> Result<ApplyReport> {
        match self
            .send_with_timeout(IpcMessage::ResetCamera, SLOW_IO_TIMEOUT)
            .await?
        {
            IpcResponse::Applied(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    /// Stream status
    pub async fn status(&mut self) -> Result<StreamStatus> {
        match self.send(IpcMessage::StreamStatus).await? {
            IpcResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// Start streaming
    pub async fn start_stream(&mut self, config: StreamConfigPatch) -> Result<StreamStatus> {
        match self
            .send_with_timeout(IpcMessage::StartStream { config }, SLOW_IO_TIMEOUT)
            .await?
        {
            IpcResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// Stop streaming
    pub async fn stop_stream(&mut self) -> Result<()> {
        match self.send(IpcMessage::StopStream).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Merge stream settings
    pub async fn update_config(&mut self, config: StreamConfigPatch) -> Result<StreamConfig> {
        match self.send(IpcMessage::UpdateStreamConfig { config }).await? {
            IpcResponse::Config(config) => Ok(config),
            other => Err(unexpected(other)),
        }
    }

    /// Merge overlay settings
    pub async fn update_overlay(&mut self, overlay: OverlayPatch) -> Result<StreamConfig> {
        match self.send(IpcMessage::UpdateOverlay { overlay }).await? {
            IpcResponse::Config(config) => Ok(config),
            other => Err(unexpected(other)),
        }
    }

    /// Look for an available hardware encoder
    pub async fn detect_encoder(&mut self) -> Result<EncoderProbe> {
        match self.send(IpcMessage::DetectEncoder).await? {
            IpcResponse::Encoder(probe) => Ok(probe),
            other => Err(unexpected(other)),
        }
    }

    /// Request the daemon to shut down
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.send(IpcMessage::Shutdown).await? {
            IpcResponse::Stopping => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Turn this connection into an event stream
    pub async fn subscribe(mut self) -> Result<EventStream> {
        match self.send(IpcMessage::Subscribe).await? {
            IpcResponse::Ok => Ok(EventStream { client: self }),
            other => Err(unexpected(other)),
        }
    }
}

/// Events pushed by the daemon after [`IpcClient::subscribe`]
pub struct EventStream {
    client: IpcClient,
}

impl EventStream {
    /// Next event; `None` once the daemon shuts down
    pub async fn next_event(&mut self) -> Result<Option<DaemonEvent>> {
        loop {
            let mut line = String::new();
            let n = self
                .client
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| PtzError::ipc(format!("Failed to read event: {}", e)))?;
            if n == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            match IpcResponse::from_bytes(line.trim().as_bytes())
                .map_err(|e| PtzError::ipc(format!("Invalid event: {}", e)))?
            {
                IpcResponse::Event { event } => return Ok(Some(event)),
                IpcResponse::Stopping => return Ok(None),
                other => return Err(unexpected(other)),
            }
        }
    }
}

fn unexpected(response: IpcResponse) -> PtzError {
    match response {
        IpcResponse::Error { message } => PtzError::Remote(message),
        other => PtzError::ipc(format!("Unexpected response: {:?}", other)),
    }
}
