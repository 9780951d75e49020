use thiserror::Error;

/// Unified error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error("{method} failed: {message}")]
    Invocation { method: String, message: String },

    #[error("unauthorised")]
    Unauthorized,

    #[error("{method}: {reason}")]
    ListenerMismatch { method: String, reason: String },

    #[error("descriptor error: {0}")]
    Descriptor(String),

    #[error("docs error: {0}")]
    Docs(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Stable machine-readable code, used in error bodies on both transports.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::UnknownMethod(_) => "unknown_method",
            GatewayError::InvalidArguments { .. } => "invalid_arguments",
            GatewayError::Invocation { .. } => "invocation_failed",
            GatewayError::Unauthorized => "unauthorised",
            GatewayError::ListenerMismatch { .. } => "listener_mismatch",
            GatewayError::Descriptor(_) => "descriptor",
            GatewayError::Docs(_) => "docs",
            GatewayError::Config(_) => "config",
            GatewayError::Io(_) => "io",
            GatewayError::Json(_) => "json",
        }
    }

    /// Whether the caller, not the gateway, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::UnknownMethod(_)
                | GatewayError::InvalidArguments { .. }
                | GatewayError::Invocation { .. }
                | GatewayError::Unauthorized
                | GatewayError::ListenerMismatch { .. }
        )
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, GatewayError>;
