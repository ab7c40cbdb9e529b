//! Login records and acknowledgments.

use crate::version::TdsVersion;

/// Credentials carried in a login record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// SQL authentication with an explicit user and password.
    Sql {
        /// Login name.
        username: String,
        /// Login password.
        password: String,
    },
    /// Integrated (platform) authentication; no credentials on the wire.
    Integrated,
}

/// Everything the transport needs to assemble the wire-level login exchange.
///
/// The connection layer fills this from its configuration per attempt; the
/// byte-level layout is the transport's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    /// Client workstation identifier.
    pub host_name: String,
    /// Application name reported to the server.
    pub application_name: String,
    /// Authentication material.
    pub credentials: Credentials,
    /// Replacement password for the password-change flow.
    pub new_password: Option<String>,
    /// Target database; `None` in user-instance no-attach mode.
    pub database: Option<String>,
    /// Target language; `None` in user-instance no-attach mode.
    pub language: Option<String>,
    /// Requested packet size in bytes.
    pub packet_size: u32,
    /// Protocol version the client proposes.
    pub requested_version: TdsVersion,
    /// Read-only application intent.
    pub read_only_intent: bool,
}

/// The server's acknowledgment of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAck {
    /// Protocol version the server settled on.
    pub negotiated_version: TdsVersion,
    /// Server program name (e.g. "Microsoft SQL Server").
    pub program_name: String,
    /// Raw server build version.
    pub server_build: u32,
}
