//! IPC server for daemon mode
//!
//! Listens on a Unix socket and serves each client on its own task.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use super::protocol::{DaemonEvent, IpcMessage, IpcResponse};
use super::socket_path;
use crate::daemon::Services;
use crate::error::{PtzError, Result};

/// IPC server that handles client connections
pub struct IpcServer {
    /// Path to the Unix socket
    socket_path: PathBuf,
    /// Listener for incoming connections
    listener: Option<UnixListener>,
    /// Daemon services requests are dispatched to
    services: Services,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Set once a client requested shutdown
    stopping: Arc<AtomicBool>,
}

impl IpcServer {
    /// Create a server on the default socket path
    pub fn new(services: Services) -> Self {
        Self::with_path(services, socket_path())
    }

    /// Create a server on a specific socket path
    pub fn with_path(services: Services, path: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            socket_path: path.into(),
            listener: None,
            services,
            shutdown_tx,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Socket this server binds
    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Start listening for connections
    pub async fn start(&mut self) -> Result<()> {
        // Remove existing socket if present
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .map_err(|e| PtzError::ipc(format!("Failed to remove old socket: {}", e)))?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PtzError::ipc(format!("Failed to create socket directory: {}", e))
                })?;
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            PtzError::ipc(format!(
                "Failed to bind socket at {:?}: {}",
                self.socket_path, e
            ))
        })?;

        // Set socket permissions to owner-only (0600)
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&self.socket_path, permissions).map_err(|e| {
            warn!("Failed to set socket permissions: {}", e);
            PtzError::ipc(format!("Failed to set socket permissions: {}", e))
        })?;

        info!("IPC server listening on {:?}", self.socket_path);
        self.listener = Some(listener);

        Ok(())
    }

    /// Accept one connection and hand it to a task
    ///
    /// Returns true if the server should continue, false if it should shut down
    pub async fn accept_one(&self) -> Result<bool> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| PtzError::ipc("Server not started"))?;

        // Accept with timeout to allow checking for shutdown
        let accept_result =
            tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                debug!("IPC client connected");
                let connection = Connection {
                    services: self.services.clone(),
                    shutdown_tx: self.shutdown_tx.clone(),
                    stopping: self.stopping.clone(),
                };
                tokio::spawn(connection.serve(stream));
            }
            Ok(Err(e)) => error!("Failed to accept connection: {}", e),
            Err(_) => {}
        }

        Ok(!self.stopping.load(Ordering::SeqCst))
    }

    /// Clean up the socket file
    pub fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            } else {
                debug!("Removed socket file {:?}", self.socket_path);
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

struct Connection {
    services: Services,
    shutdown_tx: broadcast::Sender<()>,
    stopping: Arc<AtomicBool>,
}

impl Connection {
    async fn serve(self, stream: UnixStream) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("IPC client disconnected");
                    return;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let msg = match IpcMessage::from_bytes(trimmed.as_bytes()) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!("Invalid IPC message: {}", e);
                            let response = IpcResponse::error(format!("Invalid message: {}", e));
                            let _ = writer.write_all(&response.to_bytes()).await;
                            continue;
                        }
                    };

                    match msg {
                        IpcMessage::Subscribe => {
                            self.stream_events(writer).await;
                            return;
                        }
                        IpcMessage::Shutdown => {
                            info!("Received shutdown command via IPC");
                            let _ = writer.write_all(&IpcResponse::Stopping.to_bytes()).await;
                            self.stopping.store(true, Ordering::SeqCst);
                            let _ = self.shutdown_tx.send(());
                            return;
                        }
                        msg => {
                            let response = dispatch(&self.services, msg).await;
                            if let Err(e) = writer.write_all(&response.to_bytes()).await {
                                error!("Failed to send IPC response: {}", e);
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Error reading from IPC client: {}", e);
                    return;
                }
            }
        }
    }

    /// Forward control and stream events until the client goes away
    async fn stream_events(&self, mut writer: OwnedWriteHalf) {
        let mut controls = self.services.device.subscribe();
        let mut stream = self.services.supervisor.subscribe();
        let mut shutdown = self.shutdown_tx.subscribe();

        if writer.write_all(&IpcResponse::Ok.to_bytes()).await.is_err() {
            return;
        }
        debug!("IPC client subscribed to events");

        loop {
            let event = tokio::select! {
                result = controls.recv() => match result {
                    Ok(result) => DaemonEvent::Control(result),
                    Err(RecvError::Lagged(n)) => {
                        warn!("Event subscriber lagged, {} control events dropped", n);
                        continue;
                    }
                    Err(RecvError::Closed) => return,
                },
                event = stream.recv() => match event {
                    Ok(event) => DaemonEvent::Stream(event),
                    Err(RecvError::Lagged(n)) => {
                        warn!("Event subscriber lagged, {} stream events dropped", n);
                        continue;
                    }
                    Err(RecvError::Closed) => return,
                },
                _ = shutdown.recv() => {
                    let _ = writer.write_all(&IpcResponse::Stopping.to_bytes()).await;
                    return;
                }
            };

            let response = IpcResponse::Event { event };
            if writer.write_all(&response.to_bytes()).await.is_err() {
                debug!("Event subscriber disconnected");
                return;
            }
        }
    }
}

/// Run one request against the services
pub(crate) async fn dispatch(services: &Services, msg: IpcMessage) -> IpcResponse {
    let device = &services.device;
    let supervisor = &services.supervisor;

    match msg {
        IpcMessage::Ping => IpcResponse::Pong,
        IpcMessage::GetAllControls => IpcResponse::Controls(device.get_all_controls().await),
        IpcMessage::GetControl { control } => {
            IpcResponse::Control(device.get_control(&control).await)
        }
        IpcMessage::SetControl { control, value } => {
            IpcResponse::Control(device.set_control(&control, value).await)
        }
        IpcMessage::GetCameraConfig => IpcResponse::CameraConfig {
            config: device.camera_config(),
        },
        IpcMessage::ResetCamera => IpcResponse::Applied(device.reset_to_defaults().await),
        IpcMessage::Pan { degrees } => IpcResponse::Control(device.pan(degrees).await),
        IpcMessage::Tilt { degrees } => IpcResponse::Control(device.tilt(degrees).await),
        IpcMessage::Zoom { level } => IpcResponse::Control(device.zoom(level).await),
        IpcMessage::ResetPosition => IpcResponse::Control(device.reset_position().await),
        IpcMessage::StreamStatus => IpcResponse::Status(supervisor.status()),
        IpcMessage::StartStream { config } => match supervisor.start(config).await {
            Ok(status) => IpcResponse::Status(status),
            Err(e) => IpcResponse::error(e.to_string()),
        },
        IpcMessage::StopStream => match supervisor.stop() {
            Ok(()) => IpcResponse::Ok,
            Err(e) => IpcResponse::error(e.to_string()),
        },
        IpcMessage::UpdateStreamConfig { config } => {
            IpcResponse::Config(supervisor.update_config(config))
        }
        IpcMessage::UpdateOverlay { overlay } => {
            IpcResponse::Config(supervisor.update_overlay(overlay))
        }
        IpcMessage::DetectEncoder => IpcResponse::Encoder(services.encoders.detect().await),
        // Handled by the connection
        IpcMessage::Subscribe | IpcMessage::Shutdown => {
            IpcResponse::error("Not supported in this context")
        }
    }
}
