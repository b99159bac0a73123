//! Error types for the netctl core
//!
//! Every action is scoped on its own: an error describes one failed
//! request and is never fatal to the process.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for netctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by callers to decide how to
/// present a failure (fix the form, re-enter secrets, retry later, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input, recoverable by correcting it
    Validation,
    /// Policy verdict, not a fault
    AccessDenied,
    /// Unreachable, timeout, interface or send failures
    Network,
    /// The provider rejected the credentials
    AuthRejected,
    /// The provider answered with an error other than an auth rejection
    Provider,
    /// Persistence collaborator failures
    Storage,
    /// Everything else
    Internal,
}

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// A record field failed validation
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Offending field (e.g. "entries[2]", "mac_address")
        field: String,
        /// Human-readable reason
        reason: String,
    },

    /// A required credential key is missing or malformed
    #[error("Invalid credential field: {field}")]
    InvalidCredential {
        /// Credential key to highlight in the form
        field: String,
    },

    /// The source address of a request could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A gate rule set denied the request
    #[error("Access denied by rule set {rule_set}")]
    AccessDenied {
        /// Rule set that produced the verdict
        rule_set: String,
    },

    /// The remote endpoint could not be reached
    #[error("{target} unreachable: {cause}")]
    Unreachable {
        /// Provider account or WOL target id
        target: String,
        /// Underlying cause
        cause: String,
    },

    /// The network call did not finish within its bound
    #[error("{target} timed out after {after:?}")]
    Timeout {
        /// Provider account or WOL target id
        target: String,
        /// Configured bound
        after: Duration,
    },

    /// The requested network interface does not exist
    #[error("{target}: network interface {interface} not found")]
    InterfaceNotFound {
        /// WOL target id
        target: String,
        /// Interface name
        interface: String,
    },

    /// The datagram could not be handed to the network stack
    #[error("{target}: send failed: {cause}")]
    SendFailed {
        /// WOL target id
        target: String,
        /// Underlying cause
        cause: String,
    },

    /// The provider rejected the credentials
    #[error("{target}: authentication rejected: {message}")]
    AuthRejected {
        /// Provider account id (or provider name before tagging)
        target: String,
        /// Provider message
        message: String,
    },

    /// The adapter does not know the requested action
    #[error("Provider {provider} does not support action '{action}'")]
    UnsupportedAction {
        /// Provider kind name
        provider: String,
        /// Requested action
        action: String,
    },

    /// Record or remote resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("{target}: rate limited: {message}")]
    RateLimited {
        /// Provider account id (or provider name before tagging)
        target: String,
        /// Provider message
        message: String,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Persistence collaborator errors
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid credential error
    pub fn invalid_credential(field: impl Into<String>) -> Self {
        Self::InvalidCredential {
            field: field.into(),
        }
    }

    /// Create an unreachable error
    pub fn unreachable(target: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Unreachable {
            target: target.into(),
            cause: cause.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(target: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            target: target.into(),
            after,
        }
    }

    /// Create an authentication rejection
    pub fn auth_rejected(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthRejected {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported action error
    pub fn unsupported_action(provider: impl Into<String>, action: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            provider: provider.into(),
            action: action.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status returned by a provider API.
    ///
    /// 401/403 mean the credentials were rejected, which callers must be
    /// able to tell apart from transient failures.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::auth_rejected(provider, format!("HTTP {}: {}", status, body)),
            404 => Self::not_found(format!("{}: HTTP 404: {}", provider, body)),
            429 => Self::RateLimited {
                target: provider.to_string(),
                message: format!("HTTP 429: {}", body),
            },
            500..=599 => Self::provider(
                provider,
                format!("server error (transient) HTTP {}: {}", status, body),
            ),
            _ => Self::provider(provider, format!("HTTP {}: {}", status, body)),
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } | Self::InvalidCredential { .. } | Self::InvalidAddress(_) => {
                ErrorCategory::Validation
            }
            Self::AccessDenied { .. } => ErrorCategory::AccessDenied,
            Self::Unreachable { .. }
            | Self::Timeout { .. }
            | Self::InterfaceNotFound { .. }
            | Self::SendFailed { .. } => ErrorCategory::Network,
            Self::AuthRejected { .. } => ErrorCategory::AuthRejected,
            Self::UnsupportedAction { .. }
            | Self::RateLimited { .. }
            | Self::Provider { .. }
            | Self::NotFound(_) => ErrorCategory::Provider,
            Self::Store(_) => ErrorCategory::Storage,
            Self::Config(_) | Self::Json(_) | Self::Io(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Replace the target identifier of network and auth errors.
    ///
    /// Adapters only know the provider name; the registry re-tags errors
    /// with the account id so the caller can tell which account failed.
    pub fn with_target(self, id: &str) -> Self {
        match self {
            Self::Unreachable { cause, .. } => Self::Unreachable {
                target: id.to_string(),
                cause,
            },
            Self::Timeout { after, .. } => Self::Timeout {
                target: id.to_string(),
                after,
            },
            Self::InterfaceNotFound { interface, .. } => Self::InterfaceNotFound {
                target: id.to_string(),
                interface,
            },
            Self::SendFailed { cause, .. } => Self::SendFailed {
                target: id.to_string(),
                cause,
            },
            Self::AuthRejected { message, .. } => Self::AuthRejected {
                target: id.to_string(),
                message,
            },
            Self::RateLimited { message, .. } => Self::RateLimited {
                target: id.to_string(),
                message,
            },
            other => other,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
