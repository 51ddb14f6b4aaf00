//! Hardware encoder availability

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Encoder;
use crate::exec::CommandRunner;

/// Hardware encoders in preference order
pub const HARDWARE_ENCODERS: [Encoder; 2] = [Encoder::Nvv4l2h264enc, Encoder::Omxh264enc];

/// Outcome of an encoder availability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderProbe {
    pub success: bool,
    /// First available hardware encoder
    pub encoder: Option<Encoder>,
    pub message: String,
}

fn found_message(encoder: &Encoder) -> &'static str {
    match encoder {
        Encoder::Omxh264enc => "OpenMAX encoder available",
        _ => "Hardware encoder available",
    }
}

/// Ask `inspect_tool` about each hardware encoder in turn, stopping at the
/// first one it knows. A missing inspector counts as no encoder.
pub async fn detect_encoder(runner: &dyn CommandRunner, inspect_tool: &str) -> EncoderProbe {
    for encoder in HARDWARE_ENCODERS {
        let name = encoder.to_string();
        match runner.run(inspect_tool, &[name.clone()]).await {
            Ok(output) if output.success() => {
                info!("Found hardware encoder {}", name);
                return EncoderProbe {
                    success: true,
                    message: found_message(&encoder).to_string(),
                    encoder: Some(encoder),
                };
            }
            Ok(output) => debug!("{} not available (exit {:?})", name, output.code),
            Err(e) => warn!("Cannot inspect {}: {}", name, e),
        }
    }

    warn!("No hardware encoder found");
    EncoderProbe {
        success: false,
        encoder: None,
        message: "No hardware encoder found".to_string(),
    }
}

/// Runs [`detect_encoder`] with a fixed runner and inspector
#[derive(Clone)]
pub struct EncoderDetector {
    runner: Arc<dyn CommandRunner>,
    inspect_tool: String,
}

impl EncoderDetector {
    pub fn new(runner: Arc<dyn CommandRunner>, inspect_tool: impl Into<String>) -> Self {
        Self {
            runner,
            inspect_tool: inspect_tool.into(),
        }
    }

    pub async fn detect(&self) -> EncoderProbe {
        detect_encoder(self.runner.as_ref(), &self.inspect_tool).await
    }
}
