//! Error types for the zerodha CLI.

/// Process exit codes reported by the binary.
pub mod exit_code {
    /// Malformed user input or data.
    pub const VALIDATION: i32 = 10;
    /// Local configuration problem (missing profile, bad config file).
    pub const CONFIG: i32 = 11;
    /// Authentication or permission failure.
    pub const AUTH: i32 = 12;
    /// Transport failure talking to a remote service.
    pub const NETWORK: i32 = 13;
    /// Remote service returned an error or an unusable response.
    pub const API: i32 = 14;
    /// Filesystem, state, or other local failure.
    pub const INTERNAL: i32 = 15;
}

/// Top-level error type for the CLI and the self-update manager.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Malformed input, e.g. an unparseable semantic version.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration or profile store error.
    #[error("config error: {0}")]
    Config(String),

    /// Authentication error.
    #[error("auth error: {0}")]
    Auth(String),

    /// Transport failure (connect, timeout, interrupted body).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status or malformed response from a remote API.
    #[error("API error: {0}")]
    Api(String),

    /// A required remote artifact does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem or state error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Exit code the binary reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => exit_code::VALIDATION,
            Self::Config(_) => exit_code::CONFIG,
            Self::Auth(_) => exit_code::AUTH,
            Self::Network(_) => exit_code::NETWORK,
            Self::Api(_) | Self::NotFound(_) => exit_code::API,
            Self::Internal(_) | Self::Io(_) => exit_code::INTERNAL,
        }
    }

    /// Classify a `reqwest` failure. Decode errors mean the server answered
    /// with something unusable; everything else is a transport problem.
    pub fn from_http(context: &str, err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_status() {
            Self::Api(format!("{context}: {err}"))
        } else {
            Self::Network(format!("{context}: {err}"))
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CliError>;
