//! Unified error type for the relayforge gateway.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

/// Unified error type covering all failure modes in relayforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request parameters were missing or malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The admission limit for concurrent transcodes has been reached.
    #[error("Busy: {0}")]
    Busy(String),

    /// The transcoding engine could not be started.
    #[error("Engine spawn failed [{tool}]: {message}")]
    EngineSpawn {
        /// Name of the executable that failed to start.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The transcoding engine exited unsuccessfully.
    #[error("Engine failed [{tool}]: {message}")]
    EngineRuntime {
        /// Name of the executable that failed.
        tool: String,
        /// Human-readable error description (exit status, stderr tail).
        message: String,
    },

    /// An external helper tool (ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing produced unusable output.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::BadRequest(_) => 400,
            Error::Busy(_) => 503,
            Error::EngineSpawn { .. } => 500,
            Error::EngineRuntime { .. } => 500,
            Error::Tool { .. } => 500,
            Error::Probe(_) => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "bad_request",
            Error::Busy(_) => "busy",
            Error::EngineSpawn { .. } => "engine_spawn_failed",
            Error::EngineRuntime { .. } => "engine_failed",
            Error::Tool { .. } => "tool_error",
            Error::Probe(_) => "probe_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest(message.into())
    }

    /// Convenience constructor for [`Error::EngineSpawn`].
    pub fn engine_spawn(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::EngineSpawn {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::EngineRuntime`].
    pub fn engine_runtime(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::EngineRuntime {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
