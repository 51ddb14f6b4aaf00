//! Error types for ptzcast

use thiserror::Error;

/// Result type alias using PtzError
pub type Result<T> = std::result::Result<T, PtzError>;

/// Main error type for ptzcast operations
#[derive(Debug, Error)]
pub enum PtzError {
    /// Control name is not in the capability table
    #[error("Unknown control: {0}")]
    UnknownControl(String),

    /// Control value violates the descriptor's range or kind
    #[error("Value {value} out of range [{min}, {max}] for {control}")]
    OutOfRange {
        control: String,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Streaming protocol the pipeline builder cannot render
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Encoder name the pipeline builder cannot render
    #[error("Unsupported encoder: {0}")]
    UnsupportedEncoder(String),

    /// Protocol requires a destination but none is configured
    #[error("No destination URL specified for {0} stream")]
    MissingDestination(String),

    /// Stream pipeline already running
    #[error("Stream already running")]
    AlreadyRunning,

    /// Stream pipeline not running
    #[error("No stream running")]
    NotRunning,

    /// External program failed (spawn error, non-zero exit, or error markers in output)
    #[error("{program} failed: {message}")]
    ExternalProcess { program: String, message: String },

    /// Persisted state could not be written
    #[error("Persist error: {0}")]
    Persist(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IPC transport error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The daemon rejected a request
    #[error("{0}")]
    Remote(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PtzError>,
    },
}

impl PtzError {
    /// Create an external process error
    pub fn external(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalProcess {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a persist error
    pub fn persist(msg: impl Into<String>) -> Self {
        Self::Persist(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an IPC error
    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::Ipc(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &PtzError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// A short hint on how the user might fix the problem
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::UnknownControl(_) => Some("Run `ptzcast controls` to list supported controls"),
            Self::OutOfRange { .. } => Some("Check the control's min/max in the capability table"),
            Self::UnsupportedProtocol(_) => Some("Supported protocols are srt, rtmp and udp"),
            Self::UnsupportedEncoder(_) => Some(
                "Supported encoders are nvv4l2h264enc, omxh264enc, v4l2h264enc and x264enc",
            ),
            Self::MissingDestination(_) => Some("Pass --destination or update the stream config"),
            Self::AlreadyRunning => Some("Stop the running stream first with `ptzcast stop`"),
            Self::NotRunning => Some("Start a stream with `ptzcast start`"),
            Self::ExternalProcess { .. } => {
                Some("Make sure v4l2-utils and GStreamer are installed and the device exists")
            }
            Self::Persist(_) => Some("Check permissions of the state directory"),
            Self::Config(_) => Some("Check ~/.config/ptzcast/config.toml"),
            Self::Ipc(_) => Some("Is the daemon running? Start it with `ptzcast serve`"),
            _ => None,
        }
    }

    /// Whether the user can fix this without code changes
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::UnknownControl(_)
                | Self::OutOfRange { .. }
                | Self::UnsupportedProtocol(_)
                | Self::UnsupportedEncoder(_)
                | Self::MissingDestination(_)
                | Self::AlreadyRunning
                | Self::NotRunning
                | Self::Config(_)
                | Self::Ipc(_)
                | Self::Remote(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
