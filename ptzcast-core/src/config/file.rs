//! Configuration file loading
//!
//! Loads daemon settings from `~/.config/ptzcast/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PtzError, Result};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Camera device settings
    #[serde(default)]
    pub device: DeviceSettings,

    /// Outbound stream settings
    #[serde(default)]
    pub stream: StreamSettings,

    /// Preview transcoder side channel
    #[serde(default)]
    pub preview: PreviewSettings,

    /// Resource eviction settings
    #[serde(default)]
    pub reaper: ReaperSettings,

    /// Persisted state location
    #[serde(default)]
    pub state: StateSettings,
}

/// Camera device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// V4L2 device node
    #[serde(default = "default_device_path")]
    pub path: PathBuf,

    /// Control utility executable
    #[serde(default = "default_control_tool")]
    pub control_tool: String,

    /// Open the device once at startup to wake it
    #[serde(default = "default_true")]
    pub activate_on_start: bool,

    /// Apply the persisted camera config at startup
    #[serde(default = "default_true")]
    pub apply_on_start: bool,
}

/// Outbound stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Pipeline tool executable
    #[serde(default = "default_pipeline_tool")]
    pub pipeline_tool: String,

    /// Plugin inspector used to look for hardware encoders
    #[serde(default = "default_inspect_tool")]
    pub inspect_tool: String,

    /// Delay before an auto-start after daemon startup (ms)
    #[serde(default = "default_autostart_delay")]
    pub autostart_delay_ms: u64,

    /// Window after spawn in which a non-zero exit counts as a start failure (ms)
    #[serde(default = "default_startup_probe")]
    pub startup_probe_ms: u64,
}

/// Preview transcoder side channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSettings {
    /// TCP port the preview transcoder listens on (freed before every stream start)
    #[serde(default = "default_preview_port")]
    pub port: Option<u16>,
}

/// Resource eviction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperSettings {
    /// Grace period between SIGTERM and SIGKILL (ms)
    #[serde(default = "default_grace")]
    pub grace_ms: u64,

    /// Program names the process-list scan treats as device consumers
    #[serde(default = "default_consumers")]
    pub consumers: Vec<String>,
}

/// Persisted state location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSettings {
    /// Directory holding camera-config.json and stream-config.json
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

// Default value functions
fn default_device_path() -> PathBuf {
    PathBuf::from("/dev/video0")
}

fn default_control_tool() -> String {
    "v4l2-ctl".to_string()
}

fn default_pipeline_tool() -> String {
    "gst-launch-1.0".to_string()
}

fn default_inspect_tool() -> String {
    "gst-inspect-1.0".to_string()
}

fn default_autostart_delay() -> u64 {
    3000
}

fn default_startup_probe() -> u64 {
    500
}

fn default_preview_port() -> Option<u16> {
    Some(8081)
}

fn default_grace() -> u64 {
    1000
}

fn default_consumers() -> Vec<String> {
    vec!["ffmpeg".to_string(), "gst-launch-1.0".to_string()]
}

fn default_state_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("ptzcast")
    } else {
        PathBuf::from("/var/lib/ptzcast")
    }
}

fn default_true() -> bool {
    true
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: default_device_path(),
            control_tool: default_control_tool(),
            activate_on_start: true,
            apply_on_start: true,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            pipeline_tool: default_pipeline_tool(),
            inspect_tool: default_inspect_tool(),
            autostart_delay_ms: default_autostart_delay(),
            startup_probe_ms: default_startup_probe(),
        }
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            port: default_preview_port(),
        }
    }
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            grace_ms: default_grace(),
            consumers: default_consumers(),
        }
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

impl StreamSettings {
    /// Auto-start delay as a Duration
    pub fn autostart_delay(&self) -> Duration {
        Duration::from_millis(self.autostart_delay_ms)
    }

    /// Startup probe window as a Duration
    pub fn startup_probe(&self) -> Duration {
        Duration::from_millis(self.startup_probe_ms)
    }
}

impl ReaperSettings {
    /// Grace period as a Duration
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl StateSettings {
    /// Path of the persisted camera config
    pub fn camera_config_path(&self) -> PathBuf {
        self.dir.join("camera-config.json")
    }

    /// Path of the persisted stream config
    pub fn stream_config_path(&self) -> PathBuf {
        self.dir.join("stream-config.json")
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("ptzcast").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("ptzcast")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/ptzcast/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| PtzError::config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| PtzError::config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PtzError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PtzError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| PtzError::config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Write the commented sample to the default path if nothing is there yet
    pub fn create_default_if_missing() -> Result<bool> {
        Self::create_default_at(&Self::default_path())
    }

    /// Write the commented sample to `path` unless a file already exists
    pub fn create_default_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PtzError::config(format!("Failed to create config directory: {}", e))
            })?;
        }
        std::fs::write(path, sample_config())
            .map_err(|e| PtzError::config(format!("Failed to write config file: {}", e)))?;

        info!("Created settings file at {:?}", path);
        Ok(true)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# ptzcast configuration

[device]
# V4L2 camera device
path = "/dev/video0"

# Control utility (from v4l-utils)
control_tool = "v4l2-ctl"

# Open the device once at startup to wake it up
activate_on_start = true

# Re-apply the saved camera controls at startup
apply_on_start = true

[stream]
# GStreamer launcher used for the outbound stream
pipeline_tool = "gst-launch-1.0"

# Plugin inspector used by `ptzcast encoders`
inspect_tool = "gst-inspect-1.0"

# Delay before resuming a stream that was running at shutdown (ms)
autostart_delay_ms = 3000

# A pipeline exiting with an error inside this window counts as a failed start (ms)
startup_probe_ms = 500

[preview]
# Port of the MJPEG preview transcoder; it is evicted before streaming starts
port = 8081

[reaper]
# Time between SIGTERM and SIGKILL when evicting a device holder (ms)
grace_ms = 1000

# Programs that are known to hold the camera
consumers = ["ffmpeg", "gst-launch-1.0"]

[state]
# Where camera-config.json and stream-config.json are kept
# dir = "/var/lib/ptzcast"
"#
    .to_string()
}
