//! Pipeline descriptors for the external media pipeline tool
//!
//! A [`PipelineDescriptor`] is the structured form of a GStreamer launch
//! line: an ordered list of [`Stage`]s, each an element or caps filter with
//! ordered key/value arguments. [`builder::build`] derives one from a
//! [`StreamConfig`](crate::config::StreamConfig); [`PipelineDescriptor::to_args`]
//! renders it into the argument list for `gst-launch-1.0`.
//!
//! ```text
//! v4l2src ! caps ! jpegdec ! [overlays] ! encoder ! h264parse ! mux ! sink
//! ```

mod builder;
mod encoders;

pub use builder::{
    DEFAULT_UDP_HOST, DEFAULT_UDP_PORT, RTMP_FALLBACK_URI, SRT_LATENCY_MS, build, color_to_argb,
    parse_udp_destination,
};
pub use encoders::{EncoderDetector, EncoderProbe, HARDWARE_ENCODERS, detect_encoder};

use serde::Serialize;

/// Separator between stages in a launch line
pub const LINK: &str = "!";

/// Whether a stage is an element or a caps filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// A GStreamer element with properties
    Element,
    /// A caps filter (`video/x-raw,width=...`)
    Caps,
}

/// One processing step in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Stage {
    /// Element factory name or caps media type
    pub name: String,
    /// Element or caps
    pub kind: StageKind,
    /// Ordered properties (elements) or fields (caps)
    pub args: Vec<(String, String)>,
}

impl Stage {
    /// A GStreamer element
    pub fn element(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Element,
            args: Vec::new(),
        }
    }

    /// A caps filter
    pub fn caps(media_type: impl Into<String>) -> Self {
        Self {
            name: media_type.into(),
            kind: StageKind::Caps,
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push((key.into(), value.to_string()));
        self
    }

    /// Value of the first argument named `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render this stage as launch-line tokens
    fn render(&self, out: &mut Vec<String>) {
        match self.kind {
            StageKind::Element => {
                out.push(self.name.clone());
                for (key, value) in &self.args {
                    out.push(format!("{}={}", key, quote(value)));
                }
            }
            StageKind::Caps => {
                let mut caps = self.name.clone();
                for (key, value) in &self.args {
                    caps.push(',');
                    caps.push_str(key);
                    caps.push('=');
                    caps.push_str(value);
                }
                out.push(caps);
            }
        }
    }
}

/// Quote a property value if the launch parser would split it
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '!' | '\'' | '(' | ')' | ','));
    if needs_quotes {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// An ordered list of pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PipelineDescriptor {
    stages: Vec<Stage>,
}

impl PipelineDescriptor {
    /// Empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Stages in order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage names in order
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// First stage with the given name
    pub fn find(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Last stage (the sink)
    pub fn sink(&self) -> Option<&Stage> {
        self.stages.last()
    }

    /// Render as the argument list for the pipeline tool
    pub fn to_args(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                out.push(LINK.to_string());
            }
            stage.render(&mut out);
        }
        out
    }
}

impl std::fmt::Display for PipelineDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}
