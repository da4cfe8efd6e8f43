//! Error taxonomy for the agent
//!
//! Only [`AgentError::Config`] is fatal; everything else is caught at the
//! turn-loop boundary and reported to the user.

use thiserror::Error;

/// Classification of a failed completion call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Connection failures and timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (400)
    InvalidRequest,
    /// Response body could not be understood
    Malformed,
    /// The service kept requesting tools past the per-turn limit
    ToolLoop,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemoteErrorKind::Network => "network",
            RemoteErrorKind::RateLimit => "rate limit",
            RemoteErrorKind::ServerError => "server error",
            RemoteErrorKind::Auth => "auth",
            RemoteErrorKind::InvalidRequest => "invalid request",
            RemoteErrorKind::Malformed => "malformed response",
            RemoteErrorKind::ToolLoop => "tool loop",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Completion failed ({kind}): {message}")]
    RemoteCall {
        kind: RemoteErrorKind,
        message: String,
    },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    #[error("Tool not found: {0}")]
    NotFound(String),
}

impl AgentError {
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::RemoteCall {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::remote(RemoteErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::remote(RemoteErrorKind::Malformed, message)
    }

    /// Map an HTTP error status to the matching remote error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::remote(RemoteErrorKind::InvalidRequest, format!("Invalid request: {}", message)),
            401 | 403 => Self::remote(RemoteErrorKind::Auth, format!("Authentication failed: {}", message)),
            429 => Self::remote(RemoteErrorKind::RateLimit, format!("Rate limit exceeded: {}", message)),
            500..=599 => Self::remote(RemoteErrorKind::ServerError, format!("Server error: {}", message)),
            _ => Self::remote(RemoteErrorKind::Malformed, format!("HTTP {}: {}", status, message)),
        }
    }

    /// Whether the process must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Config(_))
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AgentError::network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            AgentError::network(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            AgentError::malformed(format!("Failed to decode response: {}", e))
        } else {
            AgentError::network(format!("Request failed: {}", e))
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
