//! Target server naming.

use once_cell::sync::OnceCell;

/// A user-supplied connection target and its derived canonical names.
///
/// The user supplies a host and an optional protocol prefix; the extended
/// server name handed to the transport is derived from them exactly once per
/// instance. Callers that need re-resolution (for example when the server
/// reports a different mirror partner than the one configured) construct a
/// fresh `ServerInfo` instead of mutating an existing one.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    user_protocol: Option<String>,
    user_server_name: String,
    derived: OnceCell<DerivedNames>,
}

#[derive(Debug, Clone)]
struct DerivedNames {
    resolved: String,
    extended: String,
}

impl ServerInfo {
    /// Create server info for a bare host name.
    #[must_use]
    pub fn new(user_server_name: impl Into<String>) -> Self {
        Self {
            user_protocol: None,
            user_server_name: user_server_name.into(),
            derived: OnceCell::new(),
        }
    }

    /// Create server info with an explicit protocol prefix (e.g. `tcp`).
    #[must_use]
    pub fn with_protocol(protocol: impl Into<String>, user_server_name: impl Into<String>) -> Self {
        Self {
            user_protocol: Some(protocol.into()),
            user_server_name: user_server_name.into(),
            derived: OnceCell::new(),
        }
    }

    /// The host name exactly as the user supplied it.
    #[must_use]
    pub fn user_server_name(&self) -> &str {
        &self.user_server_name
    }

    /// The protocol prefix, if one was supplied.
    #[must_use]
    pub fn user_protocol(&self) -> Option<&str> {
        self.user_protocol.as_deref()
    }

    /// Resolve and memoize the derived names, returning the extended name.
    ///
    /// The derivation runs at most once per instance; subsequent calls return
    /// the memoized value even if the inputs would now resolve differently.
    pub fn set_derived_names(&self) -> &str {
        let names = self.derived.get_or_init(|| {
            let trimmed = self.user_server_name.trim();
            let resolved = if trimmed.is_empty() {
                "localhost".to_string()
            } else {
                trimmed.to_string()
            };
            let extended = match &self.user_protocol {
                Some(protocol) => format!("{protocol}:{resolved}"),
                None => resolved.clone(),
            };
            DerivedNames { resolved, extended }
        });
        &names.extended
    }

    /// The resolved host name, if derivation has run.
    #[must_use]
    pub fn resolved_server_name(&self) -> Option<&str> {
        self.derived.get().map(|names| names.resolved.as_str())
    }

    /// The extended (protocol-qualified) server name, if derivation has run.
    #[must_use]
    pub fn extended_server_name(&self) -> Option<&str> {
        self.derived.get().map(|names| names.extended.as_str())
    }
}
