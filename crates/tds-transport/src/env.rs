//! Environment-change notifications.

/// A server-initiated environment change.
///
/// The transport decodes ENVCHANGE tokens into this narrow vocabulary; the
/// connection layer ingests them through its dispatch table. Kinds the
/// connection layer has no use for are represented as explicit no-op variants
/// so the transport never has to drop a token silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    /// The current database changed.
    Database(String),
    /// The session language changed.
    Language(String),
    /// The negotiated packet size changed.
    PacketSize(u32),
    /// The server reported its database-mirroring partner.
    FailoverPartner(String),
    /// A local transaction was promoted to a distributed one; carries the
    /// opaque coordinator token.
    PromotedTransaction(Vec<u8>),
    /// The server reported the real instance name of a user instance.
    UserInstance(String),
    /// Collation change; parser-only, ignored by the connection layer.
    SqlCollation,
    /// Acknowledgement of a connection reset; parser-only.
    ResetAck,
}

impl EnvChange {
    /// Short name of the change kind, for logging.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Language(_) => "language",
            Self::PacketSize(_) => "packet_size",
            Self::FailoverPartner(_) => "failover_partner",
            Self::PromotedTransaction(_) => "promoted_transaction",
            Self::UserInstance(_) => "user_instance",
            Self::SqlCollation => "sql_collation",
            Self::ResetAck => "reset_ack",
        }
    }
}
