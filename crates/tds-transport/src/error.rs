//! Transport-level error types.

use std::fmt;

use thiserror::Error;

/// How an authentication failure should be treated by the retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The server rejected the supplied credentials. Never retried.
    BadCredentials,
    /// The account password has expired. Never retried.
    PasswordExpired,
    /// Any other login-time failure; retried within the deadline.
    Transient,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadCredentials => "bad credentials",
            Self::PasswordExpired => "password expired",
            Self::Transient => "transient login failure",
        };
        f.write_str(name)
    }
}

/// An authentication failure reported during the login exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed ({kind}): {message}")]
pub struct AuthError {
    /// Classification driving retry behavior.
    pub kind: AuthErrorKind,
    /// Server-supplied detail.
    pub message: String,
}

impl AuthError {
    /// A rejected-credentials failure.
    #[must_use]
    pub fn bad_credentials(message: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::BadCredentials,
            message: message.into(),
        }
    }

    /// An expired-password failure.
    #[must_use]
    pub fn password_expired(message: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::PasswordExpired,
            message: message.into(),
        }
    }

    /// A retryable login failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Whether this failure must never be retried.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            AuthErrorKind::BadCredentials | AuthErrorKind::PasswordExpired
        )
    }
}

/// Errors surfaced by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport could not be opened.
    #[error("failed to open transport to {host}: {reason}")]
    OpenFailed {
        /// Target extended server name.
        host: String,
        /// Underlying cause.
        reason: String,
    },

    /// The operation exceeded its deadline.
    #[error("transport operation timed out")]
    Timeout,

    /// The login exchange failed authentication.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The server raised an error mid-exchange.
    #[error("server error {number}: {message}")]
    Server {
        /// Server error number.
        number: i32,
        /// Severity class.
        class: u8,
        /// Server-supplied message.
        message: String,
    },

    /// The peer violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection closed underneath the operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// The process itself is unhealthy (out of memory, forced abort).
    ///
    /// Never retried; the connection dooms itself and rethrows unchanged.
    #[error("fatal resource failure: {0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether this is an authentication failure that must not be retried.
    #[must_use]
    pub fn is_terminal_auth(&self) -> bool {
        matches!(self, Self::Auth(auth) if auth.is_terminal())
    }

    /// Whether this indicates the process is unhealthy.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
