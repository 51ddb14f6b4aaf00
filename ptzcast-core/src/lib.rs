//! ptzcast Core Library
//!
//! PTZ camera control and supervised hardware-encoded streaming for V4L2
//! devices.
//!
//! This library provides:
//! - A device control client over `v4l2-ctl` with software-tracked pan/tilt
//! - Persisted camera and stream configuration with repair on load
//! - Best-effort eviction of whatever holds the camera or preview port
//! - A pure GStreamer pipeline descriptor builder and hardware encoder detection
//! - A supervisor for the external pipeline process
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   IPC   ┌──────────────┐  v4l2-ctl  ┌────────┐
//! │ ptzcast  │────────▶│ DeviceControl│───────────▶│ camera │
//! │   CLI    │         ├──────────────┤            └────────┘
//! └──────────┘         │  Supervisor  │──reaper──▶ (prior holders)
//!                      │              │──spawn───▶ gst-launch-1.0
//!                      └──────────────┘
//! ```

pub mod config;
pub mod controls;
pub mod daemon;
pub mod device;
pub mod error;
pub mod exec;
pub mod ipc;
pub mod pipeline;
pub mod reaper;
pub mod supervisor;

pub use config::{ConfigFile, StreamConfig, StreamConfigPatch};
pub use controls::CameraConfig;
pub use daemon::{Daemon, Services};
pub use device::{ControlResult, DeviceControl};
pub use error::{PtzError, Result};
pub use supervisor::{StreamEvent, StreamStatus, StreamSupervisor, SupervisorState};
