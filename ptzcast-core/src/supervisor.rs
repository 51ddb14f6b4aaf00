//! Stream process supervisor
//!
//! Owns the lifecycle of the external pipeline process:
//!
//! ```text
//! Stopped ──start──▶ Starting ──probe ok──▶ Running ──stop──▶ Stopping
//!    ▲                  │                      │                 │
//!    └──── spawn/probe failure ────────────────┴─── exit ────────┘
//! ```
//!
//! Only the process's own exit moves the supervisor back to `Stopped`;
//! `stop()` merely asks the process to finish.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{
    ConfigFile, OverlayPatch, StreamConfig, StreamConfigPatch, StreamConfigStore,
};
use crate::error::{PtzError, Result};
use crate::exec::has_failure_marker;
use crate::pipeline;
use crate::reaper::{self, LibcSignaller, ProcessSignaller, ResourceArbiter, ResourceId};

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Lifecycle event published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Pipeline process is up
    Started { pid: u32 },
    /// Pipeline process exited; `requested` is false for a crash
    Stopped { code: Option<i32>, requested: bool },
    /// Diagnostic text carrying an error marker, or a failed start
    Error { message: String },
    /// Informational diagnostic text
    Log { message: String },
}

/// Read-only status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub is_streaming: bool,
    pub state: SupervisorState,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    /// Current persisted configuration
    pub config: StreamConfig,
    /// Configuration the running process was started with
    pub active_config: Option<StreamConfig>,
    /// The running process uses a configuration that has since changed
    pub restart_pending: bool,
}

/// The running pipeline process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: Instant,
    pub config: StreamConfig,
}

/// Starts the external pipeline process
pub trait PipelineSpawner: Send + Sync {
    /// Spawn `program` with `args`; stdout and stderr must be piped
    fn spawn(&self, program: &str, args: &[String]) -> std::io::Result<Child>;
}

/// Spawns the program directly
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSpawner;

impl PipelineSpawner for CommandSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> std::io::Result<Child> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Launcher program, e.g. `gst-launch-1.0`
    pub program: String,
    /// Camera device the pipeline captures from
    pub device: PathBuf,
    /// Preview transcoder port to free before starting
    pub preview_port: Option<u16>,
    /// Early-exit window counted as a failed start
    pub startup_probe: Duration,
    /// Delay before resuming a persisted auto-start
    pub autostart_delay: Duration,
    /// How long shutdown waits for the process before killing it
    pub shutdown_grace: Duration,
}

impl SupervisorSettings {
    pub fn from_config(config: &ConfigFile) -> Self {
        Self {
            program: config.stream.pipeline_tool.clone(),
            device: config.device.path.clone(),
            preview_port: config.preview.port.filter(|port| *port != 0),
            startup_probe: config.stream.startup_probe(),
            autostart_delay: config.stream.autostart_delay(),
            shutdown_grace: config.reaper.grace(),
        }
    }
}

#[derive(Debug)]
struct OutputLine {
    text: String,
    stderr: bool,
}

#[derive(Debug, Default)]
struct Slot {
    state: SupervisorState,
    handle: Option<ProcessHandle>,
    stop_requested: bool,
    keep_auto_start: bool,
}

struct Inner {
    settings: SupervisorSettings,
    store: Arc<StreamConfigStore>,
    arbiter: Arc<dyn ResourceArbiter>,
    spawner: Arc<dyn PipelineSpawner>,
    slot: parking_lot::Mutex<Slot>,
    state_tx: watch::Sender<SupervisorState>,
    events: broadcast::Sender<StreamEvent>,
}

/// Supervises the pipeline process. Cheap to clone.
#[derive(Clone)]
pub struct StreamSupervisor {
    inner: Arc<Inner>,
}

impl StreamSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        store: Arc<StreamConfigStore>,
        arbiter: Arc<dyn ResourceArbiter>,
        spawner: Arc<dyn PipelineSpawner>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Stopped);
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                settings,
                store,
                arbiter,
                spawner,
                slot: parking_lot::Mutex::new(Slot::default()),
                state_tx,
                events,
            }),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        self.inner.slot.lock().state
    }

    fn emit(&self, event: StreamEvent) {
        let _ = self.inner.events.send(event);
    }

    fn set_state(&self, slot: &mut Slot, state: SupervisorState) {
        debug!("Supervisor {} -> {}", slot.state, state);
        slot.state = state;
        self.inner.state_tx.send_replace(state);
    }

    /// Start the pipeline, merging `patch` into the stream config first
    pub async fn start(&self, patch: StreamConfigPatch) -> Result<StreamStatus> {
        {
            let mut slot = self.inner.slot.lock();
            if slot.state != SupervisorState::Stopped {
                return Err(PtzError::AlreadyRunning);
            }
            slot.stop_requested = false;
            slot.keep_auto_start = false;
            self.set_state(&mut slot, SupervisorState::Starting);
        }

        let _guard = StartGuard { supervisor: self };
        self.launch(patch).await?;
        Ok(self.status())
    }

    async fn launch(&self, patch: StreamConfigPatch) -> Result<()> {
        let settings = &self.inner.settings;

        let config = if patch.is_empty() {
            self.inner.store.snapshot()
        } else {
            self.inner.store.merge_update(patch)
        };
        config.check_destination()?;

        // Build before evicting so a bad config never kills the preview
        let descriptor = pipeline::build(&config, &settings.device)?;

        self.inner
            .arbiter
            .free(&ResourceId::Device(settings.device.clone()))
            .await;
        if let Some(port) = settings.preview_port {
            self.inner.arbiter.free(&ResourceId::Port(port)).await;
        }

        let mut args = vec!["-e".to_string()];
        args.extend(descriptor.to_args());
        info!(
            "Starting {} stream to {:?}",
            config.protocol, config.destination
        );
        debug!("{} {}", settings.program, descriptor);

        let mut child = match self.inner.spawner.spawn(&settings.program, &args) {
            Ok(child) => child,
            Err(e) => {
                let err = PtzError::external(&settings.program, format!("failed to spawn: {}", e));
                error!("{}", err);
                self.emit(StreamEvent::Error {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };
        let pid = child.id().unwrap_or(0);

        let (line_tx, mut lines) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, false, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, true, line_tx);
        }

        match tokio::time::timeout(settings.startup_probe, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                let code = status.code();
                let diagnostics = self.collect_diagnostics(&mut lines).await;
                let message = if diagnostics.is_empty() {
                    format!("exited with {:?} during startup", code)
                } else {
                    diagnostics
                };
                error!("Pipeline failed to start: {}", message);
                self.emit(StreamEvent::Error {
                    message: message.clone(),
                });
                return Err(PtzError::external(&settings.program, message));
            }
            Ok(Err(e)) => {
                warn!("Failed to poll pipeline process {}: {}", pid, e);
            }
            // Exited cleanly or still running; the monitor takes it from here
            _ => {}
        }

        {
            let mut slot = self.inner.slot.lock();
            slot.handle = Some(ProcessHandle {
                pid,
                started_at: Instant::now(),
                config: config.clone(),
            });
            self.set_state(&mut slot, SupervisorState::Running);
        }
        self.inner.store.set_auto_start(true);
        info!("Stream started (pid {})", pid);
        self.emit(StreamEvent::Started { pid });

        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.monitor(child, lines).await;
        });

        Ok(())
    }

    /// Drain output captured during a failed start, publishing each line
    async fn collect_diagnostics(
        &self,
        lines: &mut mpsc::UnboundedReceiver<OutputLine>,
    ) -> String {
        let mut errors = Vec::new();
        // Readers hit EOF shortly after exit
        while let Ok(Some(line)) = recv_within(lines, Duration::from_millis(250)).await {
            if line.stderr && has_failure_marker(&line.text) {
                errors.push(line.text);
            } else {
                self.emit(StreamEvent::Log { message: line.text });
            }
        }
        errors.join("\n")
    }

    fn publish_line(&self, line: OutputLine) {
        let text = line.text.trim();
        if text.is_empty() {
            return;
        }
        if line.stderr && has_failure_marker(text) {
            warn!("pipeline: {}", text);
            self.emit(StreamEvent::Error {
                message: text.to_string(),
            });
        } else {
            debug!("pipeline: {}", text);
            self.emit(StreamEvent::Log {
                message: text.to_string(),
            });
        }
    }

    async fn monitor(&self, mut child: Child, mut lines: mpsc::UnboundedReceiver<OutputLine>) {
        let mut lines_open = true;
        let status = loop {
            tokio::select! {
                line = lines.recv(), if lines_open => match line {
                    Some(line) => self.publish_line(line),
                    None => lines_open = false,
                },
                status = child.wait() => break status,
            }
        };
        while let Ok(Some(line)) = recv_within(&mut lines, Duration::from_millis(100)).await {
            self.publish_line(line);
        }

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                error!("Error waiting for pipeline process: {}", e);
                None
            }
        };

        let (requested, keep_auto_start) = {
            let mut slot = self.inner.slot.lock();
            let requested = slot.stop_requested;
            let keep = slot.keep_auto_start;
            slot.handle = None;
            slot.stop_requested = false;
            slot.keep_auto_start = false;
            self.set_state(&mut slot, SupervisorState::Stopped);
            (requested, keep)
        };

        if requested {
            info!("Stream stopped (exit code {:?})", code);
        } else {
            warn!("Stream process exited unexpectedly (exit code {:?})", code);
        }
        if !keep_auto_start {
            self.inner.store.set_auto_start(false);
        }
        self.emit(StreamEvent::Stopped { code, requested });
    }

    /// Ask the running pipeline to finish. The exit itself completes the stop.
    pub fn stop(&self) -> Result<()> {
        let pid = {
            let mut slot = self.inner.slot.lock();
            if slot.state != SupervisorState::Running {
                return Err(PtzError::NotRunning);
            }
            let pid = slot.handle.as_ref().map(|h| h.pid).unwrap_or(0);
            slot.stop_requested = true;
            self.set_state(&mut slot, SupervisorState::Stopping);
            pid
        };

        info!("Stopping stream (pid {})", pid);
        if let Err(e) = reaper::interrupt(pid) {
            // Already gone; the monitor will observe the exit
            warn!("Failed to interrupt pipeline {}: {}", pid, e);
        }
        Ok(())
    }

    /// Stop for daemon exit, keeping `autoStart` so the stream resumes on restart
    pub async fn shutdown(&self) {
        let pid = {
            let mut slot = self.inner.slot.lock();
            slot.keep_auto_start = true;
            slot.handle.as_ref().map(|h| h.pid)
        };

        match self.stop() {
            Ok(()) => {}
            Err(PtzError::NotRunning) if self.state() == SupervisorState::Stopped => return,
            Err(_) => {}
        }

        let grace = self.inner.settings.shutdown_grace;
        if self.wait_stopped(grace).await {
            return;
        }
        if let Some(pid) = pid {
            warn!("Pipeline {} did not stop in {:?}, killing", pid, grace);
            if let Err(e) = LibcSignaller.kill(pid) {
                warn!("Failed to kill pipeline {}: {}", pid, e);
            }
        }
        if !self.wait_stopped(Duration::from_secs(1)).await {
            error!("Pipeline did not exit after SIGKILL");
        }
    }

    /// Wait until the supervisor reaches `Stopped`; false on timeout
    pub async fn wait_stopped(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.state_tx.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == SupervisorState::Stopped))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Merge and persist; never touches a running process
    pub fn update_config(&self, patch: StreamConfigPatch) -> StreamConfig {
        self.inner.store.merge_update(patch)
    }

    /// Merge overlay settings and persist; never touches a running process
    pub fn update_overlay(&self, patch: OverlayPatch) -> StreamConfig {
        self.inner.store.merge_overlay(patch)
    }

    /// Status snapshot, safe in any state
    pub fn status(&self) -> StreamStatus {
        let config = self.inner.store.snapshot();
        let slot = self.inner.slot.lock();
        let handle = slot.handle.as_ref();
        let active_config = handle.map(|h| h.config.clone());
        let restart_pending = active_config
            .as_ref()
            .is_some_and(|active| !same_pipeline(active, &config));

        StreamStatus {
            is_streaming: slot.state == SupervisorState::Running,
            state: slot.state,
            pid: handle.map(|h| h.pid),
            uptime_secs: handle.map(|h| h.started_at.elapsed().as_secs()),
            config,
            active_config,
            restart_pending,
        }
    }

    /// Resume a stream that was running at last shutdown. Returns whether a
    /// start was attempted.
    pub async fn reconcile_autostart(&self) -> bool {
        if !self.inner.store.snapshot().auto_start {
            debug!("Auto-start disabled");
            return false;
        }
        let delay = self.inner.settings.autostart_delay;
        info!("Auto-starting stream in {:?}", delay);
        tokio::time::sleep(delay).await;

        match self.start(StreamConfigPatch::default()).await {
            Ok(status) => info!("Auto-started stream (pid {:?})", status.pid),
            Err(e) => warn!("Auto-start failed: {}", e),
        }
        true
    }
}

/// Returns a start that never reached `Running` to `Stopped`, whether it
/// failed, was cancelled or panicked
struct StartGuard<'a> {
    supervisor: &'a StreamSupervisor,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.supervisor.inner.slot.lock();
        if slot.state == SupervisorState::Starting {
            slot.handle = None;
            self.supervisor.set_state(&mut slot, SupervisorState::Stopped);
        }
    }
}

/// Configs that would produce the same pipeline; `auto_start` is ignored
fn same_pipeline(a: &StreamConfig, b: &StreamConfig) -> bool {
    let mut a = a.clone();
    a.auto_start = b.auto_start;
    a == *b
}

async fn recv_within(
    lines: &mut mpsc::UnboundedReceiver<OutputLine>,
    timeout: Duration,
) -> std::result::Result<Option<OutputLine>, tokio::time::error::Elapsed> {
    tokio::time::timeout(timeout, lines.recv()).await
}

fn spawn_line_reader<R>(reader: R, stderr: bool, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(text)) = lines.next_line().await {
            if tx.send(OutputLine { text, stderr }).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_pipeline_ignores_auto_start() {
        let a = StreamConfig::default();
        let mut b = a.clone();
        b.auto_start = true;
        assert!(same_pipeline(&a, &b));
        b.bitrate += 1;
        assert!(!same_pipeline(&a, &b));
    }

    #[test]
    fn test_stream_event_serialization() {
        let json = serde_json::to_string(&StreamEvent::Stopped {
            code: Some(0),
            requested: true,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"stopped","code":0,"requested":true}"#);
    }
}
