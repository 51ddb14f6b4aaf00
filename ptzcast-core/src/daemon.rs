//! Daemon assembly
//!
//! Builds the long-lived services from the settings file once at startup and
//! serves them over IPC until asked to shut down.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::config::{CameraConfigStore, ConfigFile, DeviceSettings, StreamConfigStore};
use crate::device::DeviceControl;
use crate::error::{Result, ResultExt};
use crate::exec::{CommandRunner, SystemRunner};
use crate::ipc::IpcServer;
use crate::pipeline::EncoderDetector;
use crate::reaper::{ProcessReaper, ResourceArbiter};
use crate::supervisor::{CommandSpawner, PipelineSpawner, StreamSupervisor, SupervisorSettings};

/// Handles shared with every IPC connection
#[derive(Clone)]
pub struct Services {
    pub device: Arc<DeviceControl>,
    pub supervisor: StreamSupervisor,
    pub encoders: EncoderDetector,
}

/// The assembled daemon
pub struct Daemon {
    config: ConfigFile,
    services: Services,
    socket: Option<PathBuf>,
}

impl Daemon {
    /// Assemble against the real host: `v4l2-ctl`, `fuser`/`ps`/`ss`, the pipeline tool
    pub fn new(config: ConfigFile) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let arbiter = Arc::new(ProcessReaper::system(runner.clone(), &config.reaper));
        Self::with_parts(config, runner, arbiter, Arc::new(CommandSpawner))
    }

    /// Assemble with explicit collaborators
    pub fn with_parts(
        config: ConfigFile,
        runner: Arc<dyn CommandRunner>,
        arbiter: Arc<dyn ResourceArbiter>,
        spawner: Arc<dyn PipelineSpawner>,
    ) -> Self {
        let camera_store = Arc::new(CameraConfigStore::open(config.state.camera_config_path()));
        let stream_store = Arc::new(StreamConfigStore::open(config.state.stream_config_path()));

        let encoders = EncoderDetector::new(runner.clone(), config.stream.inspect_tool.clone());
        let device = Arc::new(DeviceControl::new(
            config.device.path.clone(),
            config.device.control_tool.clone(),
            runner,
            camera_store,
        ));
        let supervisor = StreamSupervisor::new(
            SupervisorSettings::from_config(&config),
            stream_store,
            arbiter,
            spawner,
        );

        Self {
            config,
            services: Services {
                device,
                supervisor,
                encoders,
            },
            socket: None,
        }
    }

    /// Listen on `path` instead of the default socket
    pub fn with_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket = Some(path.into());
        self
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Serve IPC until a client requests shutdown or the process is signalled
    pub async fn run(self) -> Result<()> {
        let mut server = match &self.socket {
            Some(path) => IpcServer::with_path(self.services.clone(), path),
            None => IpcServer::new(self.services.clone()),
        };
        server.start().await.context("Starting IPC server")?;

        let startup_task = tokio::spawn(startup(
            self.services.clone(),
            self.config.device.clone(),
        ));

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        loop {
            tokio::select! {
                result = server.accept_one() => {
                    if !result? {
                        info!("Shutdown requested via IPC");
                        break;
                    }
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received interrupt signal");
                    break;
                }
            }
        }

        // A start still in flight is dropped and returns to Stopped
        startup_task.abort();
        let _ = startup_task.await;
        self.services.supervisor.shutdown().await;
        server.cleanup();
        info!("Daemon stopped");
        Ok(())
    }
}

/// Wake the camera, restore its controls, then resume auto-start
async fn startup(services: Services, settings: DeviceSettings) {
    let device = &services.device;

    if settings.activate_on_start && !device.activate().await {
        warn!("Camera activation failed, continuing");
    }
    if settings.apply_on_start {
        let report = device.apply_config().await;
        info!(
            "Restored {} control(s), {} failed, {} skipped",
            report.results.len() - report.failures(),
            report.failures(),
            report.skipped.len()
        );
    }

    services.supervisor.reconcile_autostart().await;
}
