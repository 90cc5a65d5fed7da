//! Error types for the voice command engine.

/// Top-level error type for command orchestration.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// No remote executor is attached to the broker.
    #[error("no remote executor connected")]
    NoExecutor,

    /// A function call exceeded the broker deadline.
    #[error("timed out waiting for '{action}' to complete")]
    FunctionTimeout {
        /// Name of the function that timed out.
        action: String,
    },

    /// The remote executor reported a failure for an invoked function.
    #[error("{0}")]
    Function(String),

    /// The model endpoint could not be reached.
    #[error("cannot reach the model service: {0}")]
    ModelUnreachable(String),

    /// The model call exceeded its deadline.
    #[error("the model service took too long to respond")]
    ModelTimeout,

    /// A decoded directive failed validation.
    #[error("directive error: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistError {
    /// Stable wire identifier for this error kind, used in `error` broadcast
    /// events and command responses.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoExecutor => "no_executor",
            Self::FunctionTimeout { .. } => "timeout",
            Self::Function(_) => "function_error",
            Self::ModelUnreachable(_) => "model_unreachable",
            Self::ModelTimeout => "model_timeout",
            Self::Decode(_) => "decode_error",
            Self::Config(_) => "config_error",
            Self::Channel(_) => "channel_error",
            Self::Io(_) => "io_error",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistError>;
