//! Transaction request dispatch.
//!
//! A logical transaction request is encoded one of two ways depending on the
//! negotiated protocol version: legacy versions build a textual SQL batch,
//! modern versions issue a structured transaction-manager request. Requests
//! against a delegated (distributed) transaction additionally guard against
//! open result sets, borrowing the session exclusively for the duration of
//! the request.

use std::fmt;

use tds_transport::{
    Session, TdsIsolation, TmRequest, TmRequestKind, TransactionHandle, Transport,
};

use crate::connection::TdsConnection;
use crate::error::{Error, Result};

/// Transaction isolation level requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Server default.
    Unspecified,
    /// Chaos; accepted by no supported server, rejected before wire traffic.
    Chaos,
    /// READ UNCOMMITTED (dirty reads allowed).
    ReadUncommitted,
    /// READ COMMITTED (SQL Server default).
    #[default]
    ReadCommitted,
    /// REPEATABLE READ.
    RepeatableRead,
    /// SERIALIZABLE (highest isolation).
    Serializable,
    /// SNAPSHOT (row versioning).
    Snapshot,
}

impl IsolationLevel {
    /// The isolation level name as used in SQL Server.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Chaos => "CHAOS",
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
            Self::Snapshot => "SNAPSHOT",
        }
    }

    /// Map to the protocol-level enum used by native TM requests.
    pub fn to_tds(self) -> Result<TdsIsolation> {
        match self {
            Self::Unspecified => Ok(TdsIsolation::Unspecified),
            Self::Chaos => Err(Error::UnsupportedIsolationLevel(self)),
            Self::ReadUncommitted => Ok(TdsIsolation::ReadUncommitted),
            Self::ReadCommitted => Ok(TdsIsolation::ReadCommitted),
            Self::RepeatableRead => Ok(TdsIsolation::RepeatableRead),
            Self::Serializable => Ok(TdsIsolation::Serializable),
            Self::Snapshot => Ok(TdsIsolation::Snapshot),
        }
    }

    /// The `SET TRANSACTION ISOLATION LEVEL` prefix for the legacy encoding,
    /// or `None` when the server default applies.
    pub fn as_set_statement(self) -> Result<Option<&'static str>> {
        match self {
            Self::Unspecified => Ok(None),
            Self::Chaos => Err(Error::UnsupportedIsolationLevel(self)),
            Self::ReadUncommitted => {
                Ok(Some("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"))
            }
            Self::ReadCommitted => Ok(Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")),
            Self::RepeatableRead => Ok(Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")),
            Self::Serializable => Ok(Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")),
            Self::Snapshot => Ok(Some("SET TRANSACTION ISOLATION LEVEL SNAPSHOT")),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A logical transaction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRequest {
    /// Begin a local transaction.
    Begin {
        /// Requested isolation level.
        isolation: IsolationLevel,
        /// Optional transaction name.
        name: Option<String>,
    },
    /// Promote the current transaction to a distributed one.
    Promote,
    /// Commit the current transaction.
    Commit,
    /// Roll back the current transaction, or to a named savepoint.
    Rollback {
        /// Savepoint or transaction name, if any.
        name: Option<String>,
    },
    /// Roll back only if a transaction is active.
    IfRollback {
        /// Savepoint or transaction name, if any.
        name: Option<String>,
    },
    /// Create a savepoint.
    Save {
        /// Savepoint name.
        name: String,
    },
}

impl TransactionRequest {
    fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback { .. } | Self::IfRollback { .. })
    }

    fn completes_transaction(&self) -> bool {
        match self {
            Self::Commit => true,
            // A named rollback targets a savepoint; the transaction remains
            // active.
            Self::Rollback { name } | Self::IfRollback { name } => name.is_none(),
            _ => false,
        }
    }

    fn needs_delegated_guard(&self) -> bool {
        matches!(
            self,
            Self::Commit | Self::Promote | Self::Rollback { .. } | Self::IfRollback { .. }
        )
    }
}

/// Build the structured request for the native encoding.
///
/// `IfRollback` folds into `Rollback`: modern servers proactively report
/// completed transactions, making the conditional redundant.
pub(crate) fn native_request(request: &TransactionRequest) -> Result<TmRequest> {
    Ok(match request {
        TransactionRequest::Begin { isolation, name } => TmRequest {
            kind: TmRequestKind::Begin,
            isolation: isolation.to_tds()?,
            name: name.clone(),
        },
        TransactionRequest::Promote => TmRequest::bare(TmRequestKind::Promote),
        TransactionRequest::Commit => TmRequest::bare(TmRequestKind::Commit),
        TransactionRequest::Rollback { name } | TransactionRequest::IfRollback { name } => {
            TmRequest {
                kind: TmRequestKind::Rollback,
                isolation: TdsIsolation::Unspecified,
                name: name.clone(),
            }
        }
        TransactionRequest::Save { name } => TmRequest {
            kind: TmRequestKind::Save,
            isolation: TdsIsolation::Unspecified,
            name: Some(name.clone()),
        },
    })
}

/// Render the textual batch for the legacy encoding.
pub(crate) fn legacy_batch(request: &TransactionRequest) -> Result<String> {
    Ok(match request {
        TransactionRequest::Begin { isolation, name } => {
            let mut batch = String::new();
            if let Some(set_statement) = isolation.as_set_statement()? {
                batch.push_str(set_statement);
                batch.push_str("; ");
            }
            batch.push_str("BEGIN TRANSACTION");
            if let Some(name) = name {
                batch.push(' ');
                batch.push_str(name);
            }
            batch
        }
        TransactionRequest::Promote => {
            return Err(Error::Config(
                "transaction promotion requires a protocol version with \
                 transaction-manager requests"
                    .into(),
            ));
        }
        TransactionRequest::Commit => "COMMIT TRANSACTION".into(),
        TransactionRequest::Rollback { name: Some(name) } => {
            format!("ROLLBACK TRANSACTION {name}")
        }
        TransactionRequest::Rollback { name: None } => "ROLLBACK TRANSACTION".into(),
        TransactionRequest::IfRollback { name: Some(name) } => {
            format!("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION {name}")
        }
        TransactionRequest::IfRollback { name: None } => {
            "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION".into()
        }
        TransactionRequest::Save { name } => format!("SAVE TRANSACTION {name}"),
    })
}

impl<T: Transport> TdsConnection<T> {
    /// Dispatch a transaction request over the session.
    ///
    /// `caller_handle` is the caller's transaction handle, associated with
    /// the session optimistically after a legacy `Begin` (the legacy wire
    /// offers no transaction-token feedback). Returns the server-assigned
    /// handle for native begin requests.
    ///
    /// A doomed connection rejects everything except rollback, which is
    /// accepted as a no-op: there is nothing left to roll back, and cleanup
    /// paths should not have to special-case it.
    pub async fn execute_transaction(
        &self,
        request: TransactionRequest,
        caller_handle: Option<TransactionHandle>,
    ) -> Result<Option<TransactionHandle>> {
        if self.is_doomed() {
            return if request.is_rollback() {
                Ok(None)
            } else {
                Err(Error::Doomed)
            };
        }

        let delegated = request.needs_delegated_guard() && self.delegated.lock().is_some();
        if delegated {
            self.dispatch_delegated(request, caller_handle).await
        } else {
            let session_arc = self.session_arc()?;
            let mut session = session_arc.lock().await;
            self.dispatch_on_session(&mut session, &request, caller_handle)
                .await
        }
    }

    /// Complete a request against a delegated transaction.
    ///
    /// No result sets may be open. Under a multiplexed session the request
    /// borrows a dedicated sub-session for its exclusive duration; otherwise
    /// it takes the one shared session exclusively and re-checks the open
    /// result count after acquiring the lock, closing the race where results
    /// open between the first check and lock acquisition.
    async fn dispatch_delegated(
        &self,
        request: TransactionRequest,
        caller_handle: Option<TransactionHandle>,
    ) -> Result<Option<TransactionHandle>> {
        if self.open_result_count() > 0 {
            return Err(Error::OpenResultsPending);
        }
        let session_arc = self.session_arc()?;
        let multiplexed = { session_arc.lock().await.mars_enabled() };

        if multiplexed {
            let mut sub_session = {
                let session = session_arc.lock().await;
                self.transport.open_sub_session(&session).await?
            };
            let result = self
                .dispatch_on_session(&mut sub_session, &request, caller_handle)
                .await;
            self.transport.disconnect(&mut sub_session).await;
            if result.is_ok() && request.completes_transaction() {
                session_arc.lock().await.set_current_transaction(None);
            }
            result
        } else {
            let mut session = session_arc.lock().await;
            if self.open_result_count() > 0 {
                return Err(Error::OpenResultsPending);
            }
            self.dispatch_on_session(&mut session, &request, caller_handle)
                .await
        }
    }

    async fn dispatch_on_session(
        &self,
        session: &mut Session,
        request: &TransactionRequest,
        caller_handle: Option<TransactionHandle>,
    ) -> Result<Option<TransactionHandle>> {
        if session.version().supports_tm_requests() {
            let tm_request = native_request(request)?;
            tracing::debug!(kind = ?tm_request.kind, "issuing transaction-manager request");
            let handle = self.transport.send_tm_request(session, &tm_request).await?;
            self.transport.drain(session).await?;
            if matches!(request, TransactionRequest::Begin { .. }) {
                session.set_current_transaction(handle);
            } else if request.completes_transaction() {
                session.set_current_transaction(None);
            }
            Ok(handle)
        } else {
            let batch = legacy_batch(request)?;
            tracing::debug!(batch = %batch, "issuing transaction batch");
            self.transport.send_batch(session, &batch).await?;
            self.transport.drain(session).await?;
            if matches!(request, TransactionRequest::Begin { .. }) {
                // Optimistic: absence of an error is all the confirmation the
                // legacy wire can provide.
                session.set_current_transaction(caller_handle);
            } else if request.completes_transaction() {
                session.set_current_transaction(None);
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn legacy_begin_carries_isolation_prefix() {
        let batch = legacy_batch(&TransactionRequest::Begin {
            isolation: IsolationLevel::Serializable,
            name: Some("tx1".into()),
        })
        .unwrap();
        assert_eq!(
            batch,
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE; BEGIN TRANSACTION tx1"
        );
    }

    #[test]
    fn legacy_begin_without_isolation_or_name() {
        let batch = legacy_batch(&TransactionRequest::Begin {
            isolation: IsolationLevel::Unspecified,
            name: None,
        })
        .unwrap();
        assert_eq!(batch, "BEGIN TRANSACTION");
    }

    #[test]
    fn legacy_conditional_rollback_checks_trancount() {
        let batch = legacy_batch(&TransactionRequest::IfRollback { name: None }).unwrap();
        assert_eq!(batch, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION");

        let named = legacy_batch(&TransactionRequest::IfRollback {
            name: Some("sp1".into()),
        })
        .unwrap();
        assert_eq!(named, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION sp1");
    }

    #[test]
    fn legacy_save_and_commit() {
        assert_eq!(
            legacy_batch(&TransactionRequest::Save { name: "sp1".into() }).unwrap(),
            "SAVE TRANSACTION sp1"
        );
        assert_eq!(
            legacy_batch(&TransactionRequest::Commit).unwrap(),
            "COMMIT TRANSACTION"
        );
    }

    #[test]
    fn native_folds_conditional_rollback() {
        let request = native_request(&TransactionRequest::IfRollback {
            name: Some("sp1".into()),
        })
        .unwrap();
        assert_eq!(request.kind, TmRequestKind::Rollback);
        assert_eq!(request.name.as_deref(), Some("sp1"));
    }

    #[test]
    fn chaos_is_rejected_before_wire_traffic() {
        let begin = TransactionRequest::Begin {
            isolation: IsolationLevel::Chaos,
            name: None,
        };
        assert!(matches!(
            native_request(&begin),
            Err(Error::UnsupportedIsolationLevel(IsolationLevel::Chaos))
        ));
        assert!(matches!(
            legacy_batch(&begin),
            Err(Error::UnsupportedIsolationLevel(IsolationLevel::Chaos))
        ));
    }

    #[test]
    fn named_rollback_keeps_transaction_active() {
        assert!(
            !TransactionRequest::Rollback {
                name: Some("sp1".into())
            }
            .completes_transaction()
        );
        assert!(TransactionRequest::Rollback { name: None }.completes_transaction());
        assert!(TransactionRequest::Commit.completes_transaction());
        assert!(!TransactionRequest::Save { name: "s".into() }.completes_transaction());
    }

    #[test]
    fn isolation_mapping_covers_all_supported_levels() {
        assert_eq!(
            IsolationLevel::Snapshot.to_tds().unwrap(),
            TdsIsolation::Snapshot
        );
        assert_eq!(
            IsolationLevel::Unspecified.to_tds().unwrap(),
            TdsIsolation::Unspecified
        );
        assert!(IsolationLevel::Chaos.to_tds().is_err());
    }

    #[tokio::test]
    async fn delegated_recheck_catches_results_opened_before_lock() {
        use std::sync::Arc;

        use tds_testing::MockTransport;

        use crate::ambient::DistributedTransaction;
        use crate::config::ConnectionConfig;

        let transport = Arc::new(MockTransport::new());
        let config = ConnectionConfig::new("db01", "sa", "pass");
        let mut connection = TdsConnection::new(Arc::clone(&transport), config).unwrap();
        connection.open().await.unwrap();
        connection.enlist(&DistributedTransaction::new());

        // Hold the exclusive session lock so the commit parks after its
        // first open-results check.
        let session_arc = connection.session_arc().unwrap();
        let guard = session_arc.lock().await;

        let mut request = tokio_test::task::spawn(
            connection.execute_transaction(TransactionRequest::Commit, None),
        );
        assert!(request.poll().is_pending());

        // Results open between the first check and lock acquisition; the
        // recheck under the lock must catch them.
        connection.result_set_opened();
        drop(guard);

        match request.await {
            Err(Error::OpenResultsPending) => {}
            other => panic!("expected open-results failure, got {other:?}"),
        }
        assert!(transport.tm_requests().is_empty());
    }
}
