//! Native transaction-manager request vocabulary.

/// Isolation level as encoded in a native transaction-manager request.
///
/// This is the protocol-level enum; the connection layer maps its own
/// isolation type onto it and rejects unsupported levels before any wire
/// traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TdsIsolation {
    /// Server default.
    #[default]
    Unspecified,
    /// READ COMMITTED.
    ReadCommitted,
    /// READ UNCOMMITTED.
    ReadUncommitted,
    /// REPEATABLE READ.
    RepeatableRead,
    /// SERIALIZABLE.
    Serializable,
    /// SNAPSHOT (row versioning).
    Snapshot,
}

/// Operation carried by a native transaction-manager request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmRequestKind {
    /// Begin a local transaction.
    Begin,
    /// Promote the current transaction to a distributed one.
    Promote,
    /// Commit the current transaction.
    Commit,
    /// Roll back the current transaction (or to a savepoint).
    Rollback,
    /// Create a savepoint.
    Save,
}

/// A structured transaction-manager request (TDS 7.2+).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmRequest {
    /// The operation.
    pub kind: TmRequestKind,
    /// Isolation level; only meaningful for [`TmRequestKind::Begin`].
    pub isolation: TdsIsolation,
    /// Transaction or savepoint name, if any.
    pub name: Option<String>,
}

impl TmRequest {
    /// A request with no name and default isolation.
    #[must_use]
    pub fn bare(kind: TmRequestKind) -> Self {
        Self {
            kind,
            isolation: TdsIsolation::Unspecified,
            name: None,
        }
    }
}
