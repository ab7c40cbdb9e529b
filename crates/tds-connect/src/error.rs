//! Connection-layer error types.

use thiserror::Error;

use tds_transport::TransportError;

use crate::transaction::IsolationLevel;

/// Errors surfaced by the connection layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A failure reported by the transport collaborator.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The login deadline was reached.
    ///
    /// Carries the last transient failure rather than a generic timeout, so
    /// callers can distinguish "couldn't reach host" from "host reachable but
    /// login never completed".
    #[error("login timed out after {attempts} attempt(s): {source}")]
    LoginTimeout {
        /// Number of attempts made before the deadline.
        attempts: u32,
        /// The last transient failure observed.
        #[source]
        source: Box<Error>,
    },

    /// A mirror target accepted the login but never identified a partner.
    ///
    /// A standalone server that happens to accept the connection as if it
    /// were a mirror indicates misconfiguration, not success.
    #[error("server {host} is not a valid database-mirroring partner")]
    InvalidPartnerConfiguration {
        /// The host that posed as a mirror.
        host: String,
    },

    /// The requested isolation level has no transaction-manager encoding.
    #[error("isolation level {0} is not supported")]
    UnsupportedIsolationLevel(IsolationLevel),

    /// A delegated-transaction request found open result sets.
    #[error("cannot complete a delegated transaction while result sets are open")]
    OpenResultsPending,

    /// The connection has been doomed and cannot service the request.
    #[error("connection is doomed")]
    Doomed,

    /// The connection has no open session.
    #[error("connection is not open")]
    NotOpen,

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this indicates the process itself is unhealthy.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(t) if t.is_fatal())
    }

    /// Whether this is an authentication failure that must never be retried.
    #[must_use]
    pub fn is_terminal_auth(&self) -> bool {
        matches!(self, Self::Transport(t) if t.is_terminal_auth())
    }

    /// Whether the login loops may retry after this failure.
    #[must_use]
    pub fn is_transient_login_failure(&self) -> bool {
        match self {
            Self::Transport(t) => !t.is_fatal() && !t.is_terminal_auth(),
            _ => false,
        }
    }
}

/// Result type for connection-layer operations.
pub type Result<T> = std::result::Result<T, Error>;
