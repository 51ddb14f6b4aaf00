//! Camera control capability table
//!
//! Static descriptors for every hardware control the device client knows
//! about, plus the in-memory camera configuration they constrain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{PtzError, Result};

/// Current camera configuration: control name to integer value
pub type CameraConfig = BTreeMap<String, i64>;

/// Device units per degree of pan or tilt
pub const UNITS_PER_DEGREE: i64 = 3600;

/// Pan position control
pub const PAN_ABSOLUTE: &str = "pan_absolute";
/// Tilt position control
pub const TILT_ABSOLUTE: &str = "tilt_absolute";
/// Zoom level control
pub const ZOOM_ABSOLUTE: &str = "zoom_absolute";
/// Pan motor speed control
pub const PAN_SPEED: &str = "pan_speed";
/// Tilt motor speed control
pub const TILT_SPEED: &str = "tilt_speed";

/// Motion controls in the order they must be applied.
///
/// Speeds go first so the following moves use them, zoom before position.
pub const POSITIONAL_ORDER: [&str; 5] =
    [PAN_SPEED, TILT_SPEED, ZOOM_ABSOLUTE, PAN_ABSOLUTE, TILT_ABSOLUTE];

/// Kind of a hardware control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    /// Integer range with a step
    Range,
    /// On/off, 0 or 1
    Bool,
    /// Enumerated menu indexed by integer
    Menu,
}

/// Static description of one named control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlDescriptor {
    /// Control name as understood by the control utility
    pub name: &'static str,
    /// V4L2 control id
    pub hardware_id: u32,
    /// Control kind
    pub kind: ControlKind,
    /// Minimum value
    pub min: i64,
    /// Maximum value
    pub max: i64,
    /// Step size
    pub step: i64,
    /// Default value
    pub default: i64,
}

impl ControlDescriptor {
    const fn range(
        name: &'static str,
        hardware_id: u32,
        min: i64,
        max: i64,
        step: i64,
        default: i64,
    ) -> Self {
        Self {
            name,
            hardware_id,
            kind: ControlKind::Range,
            min,
            max,
            step,
            default,
        }
    }

    const fn menu(name: &'static str, hardware_id: u32, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            hardware_id,
            kind: ControlKind::Menu,
            min,
            max,
            step: 1,
            default,
        }
    }

    const fn boolean(name: &'static str, hardware_id: u32, default: i64) -> Self {
        Self {
            name,
            hardware_id,
            kind: ControlKind::Bool,
            min: 0,
            max: 1,
            step: 1,
            default,
        }
    }

    /// Check that `value` satisfies this control's constraint
    pub fn validate(&self, value: i64) -> Result<()> {
        if value < self.min || value > self.max {
            return Err(PtzError::OutOfRange {
                control: self.name.to_string(),
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Clamp `value` into `[min, max]`
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    /// Whether this control moves the camera physically
    pub fn is_positional(&self) -> bool {
        POSITIONAL_ORDER.contains(&self.name)
    }
}

/// Capability table for the supported PTZ webcam
pub static CONTROLS: &[ControlDescriptor] = &[
    ControlDescriptor::range("brightness", 0x0098_0900, 0, 100, 1, 50),
    ControlDescriptor::range("contrast", 0x0098_0901, 0, 100, 1, 50),
    ControlDescriptor::range("saturation", 0x0098_0902, 0, 100, 1, 50),
    ControlDescriptor::range("hue", 0x0098_0903, 0, 100, 1, 50),
    ControlDescriptor::boolean("white_balance_temperature_auto", 0x0098_090c, 1),
    ControlDescriptor::range("white_balance_red_component", 0x0098_090e, 0, 2048, 1, 1024),
    ControlDescriptor::range("white_balance_blue_component", 0x0098_090f, 0, 2048, 1, 1024),
    ControlDescriptor::range("gain", 0x0098_0913, 1, 128, 1, 1),
    // 0=Disabled, 1=50Hz, 2=60Hz
    ControlDescriptor::menu("power_line_frequency", 0x0098_0918, 0, 2, 2),
    ControlDescriptor::range("white_balance_temperature", 0x0098_091a, 2000, 10000, 100, 5000),
    ControlDescriptor::range("sharpness", 0x0098_091b, 0, 100, 1, 50),
    ControlDescriptor::range("backlight_compensation", 0x0098_091c, 0, 18, 1, 9),
    ControlDescriptor::menu("exposure_auto", 0x009a_0901, 0, 3, 0),
    ControlDescriptor::range("exposure_absolute", 0x009a_0902, 1, 2500, 1, 330),
    ControlDescriptor::range(PAN_ABSOLUTE, 0x009a_0908, -468_000, 468_000, 3600, 0),
    ControlDescriptor::range(TILT_ABSOLUTE, 0x009a_0909, -324_000, 324_000, 3600, 0),
    ControlDescriptor::range("focus_absolute", 0x009a_090a, 0, 100, 1, 0),
    ControlDescriptor::boolean("focus_auto", 0x009a_090c, 1),
    ControlDescriptor::range(ZOOM_ABSOLUTE, 0x009a_090d, 0, 12, 1, 0),
    ControlDescriptor::range("zoom_continuous", 0x009a_090f, 0, 100, 1, 100),
    ControlDescriptor::range(PAN_SPEED, 0x009a_0920, -1, 160, 1, 20),
    ControlDescriptor::range(TILT_SPEED, 0x009a_0921, -1, 120, 1, 20),
];

/// Look up a control by name
pub fn descriptor(name: &str) -> Option<&'static ControlDescriptor> {
    CONTROLS.iter().find(|c| c.name == name)
}

/// Look up a control by name, failing with `UnknownControl`
pub fn require(name: &str) -> Result<&'static ControlDescriptor> {
    descriptor(name).ok_or_else(|| PtzError::UnknownControl(name.to_string()))
}

/// Every control at its declared default
pub fn defaults() -> CameraConfig {
    CONTROLS
        .iter()
        .map(|c| (c.name.to_string(), c.default))
        .collect()
}

/// Replace every known control whose value violates its descriptor with the default.
///
/// Unknown keys are left untouched. Returns the names that were repaired.
pub fn repair(config: &mut CameraConfig) -> Vec<String> {
    let mut repaired = Vec::new();
    for (name, value) in config.iter_mut() {
        if let Some(desc) = descriptor(name) {
            if desc.validate(*value).is_err() {
                warn!(
                    "Invalid value for {}: {} (range: {}-{}), using default: {}",
                    name,
                    value,
                    desc.min,
                    desc.max,
                    desc.default
                );
                *value = desc.default;
                repaired.push(name.clone());
            }
        }
    }
    repaired
}
