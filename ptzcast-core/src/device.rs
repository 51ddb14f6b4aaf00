//! Camera device control
//!
//! Gets and sets named V4L2 controls through the external control utility,
//! keeps the persisted camera config in step, and tracks pan/tilt position in
//! software because the hardware does not report it back reliably.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::CameraConfigStore;
use crate::controls::{
    self, CameraConfig, PAN_ABSOLUTE, POSITIONAL_ORDER, TILT_ABSOLUTE, UNITS_PER_DEGREE,
    ZOOM_ABSOLUTE,
};
use crate::error::{PtzError, Result};
use crate::exec::{CommandRunner, has_failure_marker};

/// Outcome of one control operation, as delivered to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResult {
    /// Control name
    pub control: String,
    /// Whether the operation succeeded
    pub success: bool,
    /// Value set or read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Informational output from the utility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResult {
    fn ok(control: &str, value: Option<i64>, message: Option<String>) -> Self {
        Self {
            control: control.to_string(),
            success: true,
            value,
            error: None,
            message,
        }
    }

    fn failed(control: &str, error: &PtzError) -> Self {
        Self {
            control: control.to_string(),
            success: false,
            value: None,
            error: Some(error.to_string()),
            message: None,
        }
    }
}

/// Result of applying a whole camera config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Per-control results in application order
    pub results: Vec<ControlResult>,
    /// Config keys skipped because they are not in the capability table
    pub skipped: Vec<String>,
}

impl ApplyReport {
    /// Number of failed applications
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Raw dump of every control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllControls {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Software-tracked pan/tilt position in device units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub pan: i64,
    pub tilt: i64,
}

/// Delays that let the hardware settle between commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    /// After an electronic adjustment (image, exposure, white balance, focus)
    pub control: Duration,
    /// After a physical move
    pub motion: Duration,
    /// After waking the device
    pub activate: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            control: Duration::from_millis(50),
            motion: Duration::from_millis(500),
            activate: Duration::from_secs(1),
        }
    }
}

impl SettleDelays {
    /// No waiting at all
    pub fn none() -> Self {
        Self {
            control: Duration::ZERO,
            motion: Duration::ZERO,
            activate: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Pan,
    Tilt,
}

impl Axis {
    fn control(self) -> &'static str {
        match self {
            Self::Pan => PAN_ABSOLUTE,
            Self::Tilt => TILT_ABSOLUTE,
        }
    }
}

/// Client for the camera's hardware controls
pub struct DeviceControl {
    device: PathBuf,
    tool: String,
    runner: Arc<dyn CommandRunner>,
    store: Arc<CameraConfigStore>,
    position: parking_lot::Mutex<TrackedPosition>,
    // Serialize relative moves per axis; other controls stay unblocked
    pan_lock: tokio::sync::Mutex<()>,
    tilt_lock: tokio::sync::Mutex<()>,
    settle: SettleDelays,
    events: broadcast::Sender<ControlResult>,
}

impl DeviceControl {
    /// Create a client for `device` using the control utility `tool`
    pub fn new(
        device: impl Into<PathBuf>,
        tool: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        store: Arc<CameraConfigStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            device: device.into(),
            tool: tool.into(),
            runner,
            store,
            position: parking_lot::Mutex::new(TrackedPosition::default()),
            pan_lock: tokio::sync::Mutex::new(()),
            tilt_lock: tokio::sync::Mutex::new(()),
            settle: SettleDelays::default(),
            events,
        }
    }

    /// Override the settle delays
    pub fn with_settle(mut self, settle: SettleDelays) -> Self {
        self.settle = settle;
        self
    }

    /// Device node this client controls
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Subscribe to every control result
    pub fn subscribe(&self) -> broadcast::Receiver<ControlResult> {
        self.events.subscribe()
    }

    /// Current tracked pan/tilt position
    pub fn position(&self) -> TrackedPosition {
        *self.position.lock()
    }

    /// Current camera config snapshot
    pub fn camera_config(&self) -> CameraConfig {
        self.store.snapshot()
    }

    fn publish(&self, result: ControlResult) -> ControlResult {
        // No subscribers is fine
        let _ = self.events.send(result.clone());
        result
    }

    fn device_arg(&self) -> String {
        self.device.display().to_string()
    }

    /// Wake the device by listing its formats, then give it a moment
    pub async fn activate(&self) -> bool {
        info!("Activating camera device {:?}", self.device);
        let args = vec![
            "-d".to_string(),
            self.device_arg(),
            "--list-formats-ext".to_string(),
        ];
        match self.runner.run(&self.tool, &args).await {
            Ok(out) if out.success() => {
                tokio::time::sleep(self.settle.activate).await;
                info!("Camera device activated");
                true
            }
            Ok(out) => {
                warn!("Failed to activate camera: {}", out.stderr.trim());
                false
            }
            Err(e) => {
                warn!("Failed to activate camera: {}", e);
                false
            }
        }
    }

    /// Set a control and persist it
    pub async fn set_control(&self, name: &str, value: i64) -> ControlResult {
        let result = match self.write_control(name, value, true).await {
            Ok(message) => ControlResult::ok(name, Some(value), message),
            Err(e) => {
                debug!("set {}={} failed: {}", name, value, e);
                ControlResult::failed(name, &e)
            }
        };
        self.publish(result)
    }

    /// Read a control's current value from the device
    pub async fn get_control(&self, name: &str) -> ControlResult {
        let result = match self.read_control(name).await {
            Ok(value) => ControlResult::ok(name, value, None),
            Err(e) => ControlResult::failed(name, &e),
        };
        self.publish(result)
    }

    /// Dump every control the device exposes
    pub async fn get_all_controls(&self) -> AllControls {
        let args = vec!["-d".to_string(), self.device_arg(), "--all".to_string()];
        match self.runner.run(&self.tool, &args).await {
            Ok(out) if out.success() => AllControls {
                success: true,
                output: Some(out.stdout),
                error: None,
            },
            Ok(out) => AllControls {
                success: false,
                output: None,
                error: Some(PtzError::external(&self.tool, out.stderr.trim()).to_string()),
            },
            Err(e) => AllControls {
                success: false,
                output: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Pan relative to the tracked position
    pub async fn pan(&self, degrees: f64) -> ControlResult {
        self.move_axis(Axis::Pan, degrees).await
    }

    /// Tilt relative to the tracked position
    pub async fn tilt(&self, degrees: f64) -> ControlResult {
        self.move_axis(Axis::Tilt, degrees).await
    }

    async fn move_axis(&self, axis: Axis, degrees: f64) -> ControlResult {
        let _guard = match axis {
            Axis::Pan => self.pan_lock.lock().await,
            Axis::Tilt => self.tilt_lock.lock().await,
        };

        let name = axis.control();
        let desc = match controls::require(name) {
            Ok(desc) => desc,
            Err(e) => return self.publish(ControlResult::failed(name, &e)),
        };

        // Never read back from the device; the tracked value is authoritative
        let current = match axis {
            Axis::Pan => self.position.lock().pan,
            Axis::Tilt => self.position.lock().tilt,
        };
        let delta = (degrees * UNITS_PER_DEGREE as f64).round() as i64;
        let target = desc.clamp(current.saturating_add(delta));
        debug!(
            "{}: current={}, degrees={}, target={}",
            name, current, degrees, target
        );

        let result = self.set_control(name, target).await;
        if result.success {
            self.track(axis, target);
        }
        result
    }

    fn track(&self, axis: Axis, value: i64) {
        let mut position = self.position.lock();
        match axis {
            Axis::Pan => position.pan = value,
            Axis::Tilt => position.tilt = value,
        }
    }

    /// Set the zoom level
    pub async fn zoom(&self, level: i64) -> ControlResult {
        self.set_control(ZOOM_ABSOLUTE, level).await
    }

    /// Move to the home position and zero the tracked position
    pub async fn reset_position(&self) -> ControlResult {
        let _pan = self.pan_lock.lock().await;
        let _tilt = self.tilt_lock.lock().await;

        let pan = self.set_control(PAN_ABSOLUTE, 0).await;
        let tilt = self.set_control(TILT_ABSOLUTE, 0).await;
        if !pan.success || !tilt.success {
            warn!("Home position reset was not fully confirmed by the device");
        }
        *self.position.lock() = TrackedPosition::default();

        self.publish(ControlResult::ok(
            "position",
            None,
            Some("Camera reset to home position".to_string()),
        ))
    }

    /// Overwrite the camera config with defaults, persist, and apply it
    pub async fn reset_to_defaults(&self) -> ApplyReport {
        info!("Resetting camera to default values");
        if !self.store.save(controls::defaults()) {
            warn!("Default camera config could not be persisted");
        }
        let report = self.apply_config().await;
        *self.position.lock() = TrackedPosition::default();
        report
    }

    /// Apply the current camera config to the hardware.
    ///
    /// Non-positional controls go first with a short settle delay, then the
    /// motion controls in [`POSITIONAL_ORDER`] with a longer one. A failure
    /// does not stop the remaining controls. Values are not re-persisted.
    pub async fn apply_config(&self) -> ApplyReport {
        let config = self.store.snapshot();
        let mut report = ApplyReport::default();
        info!("Applying camera configuration ({} controls)", config.len());

        for (name, value) in &config {
            if POSITIONAL_ORDER.contains(&name.as_str()) {
                continue;
            }
            if controls::descriptor(name).is_none() {
                warn!("Skipping unknown control: {}", name);
                report.skipped.push(name.clone());
                continue;
            }
            let result = self.apply_one(name, *value).await;
            report.results.push(result);
            tokio::time::sleep(self.settle.control).await;
        }

        let _pan = self.pan_lock.lock().await;
        let _tilt = self.tilt_lock.lock().await;

        for name in POSITIONAL_ORDER {
            let Some(value) = config.get(name) else {
                continue;
            };
            let result = self.apply_one(name, *value).await;
            if result.success {
                if name == PAN_ABSOLUTE {
                    self.track(Axis::Pan, *value);
                } else if name == TILT_ABSOLUTE {
                    self.track(Axis::Tilt, *value);
                }
            }
            report.results.push(result);
            tokio::time::sleep(self.settle.motion).await;
        }

        if report.failures() > 0 {
            warn!("{} control(s) failed to apply", report.failures());
        } else {
            info!("Camera configuration applied");
        }
        report
    }

    async fn apply_one(&self, name: &str, value: i64) -> ControlResult {
        let result = match self.write_control(name, value, false).await {
            Ok(message) => ControlResult::ok(name, Some(value), message),
            Err(e) => {
                warn!("{} failed: {}", name, e);
                ControlResult::failed(name, &e)
            }
        };
        self.publish(result)
    }

    /// Validate, run the utility, check its diagnostics, optionally persist
    async fn write_control(&self, name: &str, value: i64, persist: bool) -> Result<Option<String>> {
        let desc = controls::require(name)?;
        desc.validate(value)?;

        let args = vec![
            "-d".to_string(),
            self.device_arg(),
            format!("--set-ctrl={}={}", name, value),
        ];
        let out = self.runner.run(&self.tool, &args).await?;

        let stderr = out.stderr.trim();
        if !stderr.is_empty() {
            debug!("{} stderr: {}", self.tool, stderr);
            // The utility reports some failures on stderr with exit status 0
            if has_failure_marker(stderr) {
                return Err(PtzError::external(&self.tool, stderr));
            }
        }
        if !out.success() {
            return Err(PtzError::external(
                &self.tool,
                format!("exited with {:?}", out.code),
            ));
        }

        if persist && !self.store.set(name, value) {
            warn!("{}={} applied but could not be persisted", name, value);
        }

        let stdout = out.stdout.trim();
        Ok((!stdout.is_empty()).then(|| stdout.to_string()))
    }

    async fn read_control(&self, name: &str) -> Result<Option<i64>> {
        controls::require(name)?;
        let args = vec![
            "-d".to_string(),
            self.device_arg(),
            format!("--get-ctrl={}", name),
        ];
        let out = self.runner.run(&self.tool, &args).await?;
        if !out.success() {
            return Err(PtzError::external(&self.tool, out.stderr.trim()));
        }
        Ok(parse_control_value(&out.stdout))
    }
}

/// First signed integer following a colon, e.g. `brightness: 50`
pub fn parse_control_value(output: &str) -> Option<i64> {
    output.match_indices(':').find_map(|(idx, _)| {
        let rest = output[idx + 1..].trim_start();
        let (sign, digits) = match rest.strip_prefix('-') {
            Some(tail) => (-1, tail),
            None => (1, rest),
        };
        let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<i64>().ok().map(|v| sign * v)
    })
}
