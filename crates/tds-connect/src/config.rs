//! Connection configuration.

use tds_transport::{Credentials, EncryptionOptions, ServerInfo, TdsVersion};

use crate::error::{Error, Result};

/// Default connect timeout in seconds when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 15;

/// Default requested packet size in bytes.
pub const DEFAULT_PACKET_SIZE: u32 = 8000;

/// Configuration for a single backend connection.
///
/// Built with the chained setter pattern; `validate()` runs once before the
/// first login attempt.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Primary host name.
    pub host: String,
    /// Optional protocol prefix for the primary host (e.g. `tcp`).
    pub protocol: Option<String>,
    /// Statically configured mirror partner, if any.
    pub failover_partner: Option<String>,
    /// Authentication material.
    pub credentials: Credentials,
    /// Replacement password for the password-change flow.
    pub new_password: Option<String>,
    /// Target database.
    pub database: Option<String>,
    /// Target language.
    pub language: Option<String>,
    /// Requested packet size in bytes.
    pub packet_size: u32,
    /// Connect timeout in whole seconds; `0` means no deadline.
    pub connect_timeout_secs: u32,
    /// Application name reported at login.
    pub application_name: String,
    /// Workstation identifier reported at login.
    pub workstation_name: String,
    /// Enable multiplexed sub-sessions after login.
    pub multiplexing: bool,
    /// Automatically enlist in an ambient distributed transaction.
    pub auto_enlist: bool,
    /// Whether this connection belongs to a pool.
    pub pooled: bool,
    /// Reset server-side session state when the connection is reused.
    pub connection_reset: bool,
    /// User-instance mode: the login record omits database and language, and
    /// attachment happens after the real instance name is reported.
    pub user_instance: bool,
    /// Read-only application intent.
    pub read_only_intent: bool,
    /// Protocol version proposed at login.
    pub requested_version: TdsVersion,
    /// Encryption options handed to the transport.
    pub encryption: EncryptionOptions,
}

impl ConnectionConfig {
    /// Create a configuration for the given host with SQL authentication.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            protocol: None,
            failover_partner: None,
            credentials: Credentials::Sql {
                username: username.into(),
                password: password.into(),
            },
            new_password: None,
            database: None,
            language: None,
            packet_size: DEFAULT_PACKET_SIZE,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            application_name: "tds-connect".into(),
            workstation_name: "localhost".into(),
            multiplexing: false,
            auto_enlist: true,
            pooled: false,
            connection_reset: true,
            user_instance: false,
            read_only_intent: false,
            requested_version: TdsVersion::default(),
            encryption: EncryptionOptions::default(),
        }
    }

    /// Create a configuration using integrated authentication.
    #[must_use]
    pub fn integrated(host: impl Into<String>) -> Self {
        let mut config = Self::new(host, "", "");
        config.credentials = Credentials::Integrated;
        config
    }

    /// Set the protocol prefix for the primary host.
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Configure a static mirror partner.
    #[must_use]
    pub fn failover_partner(mut self, partner: impl Into<String>) -> Self {
        self.failover_partner = Some(partner.into());
        self
    }

    /// Set the target database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the target language.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the connect timeout in seconds (`0` = no deadline).
    #[must_use]
    pub fn connect_timeout_secs(mut self, seconds: u32) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn packet_size(mut self, bytes: u32) -> Self {
        self.packet_size = bytes;
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Set the workstation identifier.
    #[must_use]
    pub fn workstation_name(mut self, name: impl Into<String>) -> Self {
        self.workstation_name = name.into();
        self
    }

    /// Enable or disable multiplexed sub-sessions.
    #[must_use]
    pub fn multiplexing(mut self, enabled: bool) -> Self {
        self.multiplexing = enabled;
        self
    }

    /// Enable or disable ambient-transaction auto-enlistment.
    #[must_use]
    pub fn auto_enlist(mut self, enabled: bool) -> Self {
        self.auto_enlist = enabled;
        self
    }

    /// Mark this connection as pooled.
    #[must_use]
    pub fn pooled(mut self, pooled: bool) -> Self {
        self.pooled = pooled;
        self
    }

    /// Enable or disable reset-on-reuse.
    #[must_use]
    pub fn connection_reset(mut self, enabled: bool) -> Self {
        self.connection_reset = enabled;
        self
    }

    /// Enable user-instance mode.
    #[must_use]
    pub fn user_instance(mut self, enabled: bool) -> Self {
        self.user_instance = enabled;
        self
    }

    /// Set a replacement password for the password-change flow.
    #[must_use]
    pub fn change_password_to(mut self, new_password: impl Into<String>) -> Self {
        self.new_password = Some(new_password.into());
        self
    }

    /// Set read-only application intent.
    #[must_use]
    pub fn read_only_intent(mut self, read_only: bool) -> Self {
        self.read_only_intent = read_only;
        self
    }

    /// Set the proposed protocol version.
    #[must_use]
    pub fn requested_version(mut self, version: TdsVersion) -> Self {
        self.requested_version = version;
        self
    }

    /// Set the encryption options.
    #[must_use]
    pub fn encryption(mut self, options: EncryptionOptions) -> Self {
        self.encryption = options;
        self
    }

    /// Server info for the primary target.
    #[must_use]
    pub fn primary_server_info(&self) -> ServerInfo {
        match &self.protocol {
            Some(protocol) => ServerInfo::with_protocol(protocol.clone(), self.host.clone()),
            None => ServerInfo::new(self.host.clone()),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.packet_size < 512 {
            return Err(Error::Config(
                "packet_size must be at least 512 bytes".into(),
            ));
        }
        if let Some(partner) = &self.failover_partner {
            if partner.trim().is_empty() {
                return Err(Error::Config(
                    "failover_partner must not be empty when configured".into(),
                ));
            }
        }
        if self.new_password.is_some() && !matches!(self.credentials, Credentials::Sql { .. }) {
            return Err(Error::Config(
                "password change requires SQL authentication".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ConnectionConfig::new("db01", "sa", "pass");
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.packet_size, DEFAULT_PACKET_SIZE);
        assert!(config.auto_enlist);
        assert!(config.connection_reset);
        assert!(!config.multiplexing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods_chain() {
        let config = ConnectionConfig::new("db01", "sa", "pass")
            .protocol("tcp")
            .failover_partner("db02")
            .database("orders")
            .connect_timeout_secs(60)
            .multiplexing(true)
            .pooled(true);

        assert_eq!(config.protocol.as_deref(), Some("tcp"));
        assert_eq!(config.failover_partner.as_deref(), Some("db02"));
        assert_eq!(config.database.as_deref(), Some("orders"));
        assert_eq!(config.connect_timeout_secs, 60);
        assert!(config.multiplexing);
        assert!(config.pooled);
    }

    #[test]
    fn validation_rejects_empty_host() {
        let config = ConnectionConfig::new("  ", "sa", "pass");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_empty_partner() {
        let config = ConnectionConfig::new("db01", "sa", "pass").failover_partner("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_password_change_without_sql_auth() {
        let config = ConnectionConfig::integrated("db01").change_password_to("secret");
        assert!(config.validate().is_err());
    }

    #[test]
    fn primary_server_info_carries_protocol() {
        let config = ConnectionConfig::new("db01", "sa", "pass").protocol("tcp");
        let info = config.primary_server_info();
        assert_eq!(info.set_derived_names(), "tcp:db01");
    }
}
