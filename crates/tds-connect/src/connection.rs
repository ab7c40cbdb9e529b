//! The backend connection object.
//!
//! `TdsConnection` owns one physical connection's session, identity, and
//! lifecycle state. The failover login loops, the transaction dispatcher, and
//! the pooling hooks are implemented in their own modules as further `impl`
//! blocks on this type.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tds_transport::{EnvChange, Session, Transport};

use crate::ambient::{AmbientTransactions, DelegatedTransaction, DistributedTransaction};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::lifecycle::LifecycleState;
use crate::pool_group::PoolGroup;
use crate::registry::PreparedCommandRegistry;

/// Handle slot for the session, swapped atomically on dispose.
///
/// The outer lock guards only the slot itself (take/store/clone are short
/// synchronous sections); the inner async mutex is the exclusive borrow used
/// for delegated-transaction requests. Because `take` is a single atomic
/// exchange under the slot lock, at most one caller ever observes a non-empty
/// slot to disconnect.
#[derive(Debug, Default)]
pub(crate) struct SessionSlot {
    inner: Mutex<Option<Arc<tokio::sync::Mutex<Session>>>>,
}

impl SessionSlot {
    pub(crate) fn store(&self, session: Session) {
        *self.inner.lock() = Some(Arc::new(tokio::sync::Mutex::new(session)));
    }

    pub(crate) fn take(&self) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        self.inner.lock().take()
    }

    pub(crate) fn get(&self) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        self.inner.lock().clone()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().is_none()
    }
}

/// Per-physical-connection identity.
///
/// Created together with the session on every login attempt and replaced as a
/// pair; an attempt never inherits identity state from a previous one.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionIdentity {
    pub(crate) original_database: Option<String>,
    pub(crate) current_database: Option<String>,
    pub(crate) original_language: Option<String>,
    pub(crate) current_language: Option<String>,
    pub(crate) packet_size: u32,
    pub(crate) server_provided_failover_partner: Option<String>,
    pub(crate) instance_name: Option<String>,
}

impl ConnectionIdentity {
    pub(crate) fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            original_database: config.database.clone(),
            current_database: config.database.clone(),
            original_language: config.language.clone(),
            current_language: config.language.clone(),
            packet_size: config.packet_size,
            server_provided_failover_partner: None,
            instance_name: None,
        }
    }
}

/// One backend TDS connection.
///
/// Owns the login/failover state machine (`failover` module), the transaction
/// dispatcher (`transaction` module), and the pooling lifecycle hooks
/// (`lifecycle` module). A single instance is driven sequentially: concurrent
/// logins on the same instance do not occur by contract. Doom and dispose are
/// the only operations that may race an in-flight call, and both go through
/// atomic state.
pub struct TdsConnection<T: Transport> {
    pub(crate) transport: Arc<T>,
    pub(crate) config: ConnectionConfig,
    pub(crate) pool_group: Option<Arc<PoolGroup>>,
    pub(crate) ambient: Option<Arc<AmbientTransactions>>,
    pub(crate) session: SessionSlot,
    pub(crate) identity: ConnectionIdentity,
    pub(crate) state: LifecycleState,
    pub(crate) login_complete: bool,
    pub(crate) current_data_source: Option<String>,
    pub(crate) failover_permission_checked: bool,
    pub(crate) doomed: AtomicBool,
    pub(crate) async_ops: AtomicUsize,
    pub(crate) open_results: AtomicUsize,
    pub(crate) registry: PreparedCommandRegistry,
    pub(crate) delegated: Mutex<Option<DelegatedTransaction>>,
    pub(crate) break_handler: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T: Transport> TdsConnection<T> {
    /// Create a closed connection from a transport and configuration.
    pub fn new(transport: Arc<T>, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let identity = ConnectionIdentity::from_config(&config);
        Ok(Self {
            transport,
            config,
            pool_group: None,
            ambient: None,
            session: SessionSlot::default(),
            identity,
            state: LifecycleState::Closed,
            login_complete: false,
            current_data_source: None,
            failover_permission_checked: false,
            doomed: AtomicBool::new(false),
            async_ops: AtomicUsize::new(0),
            open_results: AtomicUsize::new(0),
            registry: PreparedCommandRegistry::new(),
            delegated: Mutex::new(None),
            break_handler: None,
        })
    }

    /// Attach this connection to a pool group.
    #[must_use]
    pub fn with_pool_group(mut self, pool_group: Arc<PoolGroup>) -> Self {
        self.pool_group = Some(pool_group);
        self
    }

    /// Attach an ambient distributed-transaction context.
    #[must_use]
    pub fn with_ambient_transactions(mut self, ambient: Arc<AmbientTransactions>) -> Self {
        self.ambient = Some(ambient);
        self
    }

    /// Register a callback invoked when the connection breaks itself.
    pub fn set_break_handler(&mut self, handler: Arc<dyn Fn() + Send + Sync>) {
        self.break_handler = Some(handler);
    }

    /// The connection configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether the connection has been doomed.
    #[must_use]
    pub fn is_doomed(&self) -> bool {
        self.doomed.load(Ordering::Acquire)
    }

    /// The data source that ultimately won the login race.
    #[must_use]
    pub fn current_data_source(&self) -> Option<&str> {
        self.current_data_source.as_deref()
    }

    /// Current database as reported by the server.
    #[must_use]
    pub fn current_database(&self) -> Option<&str> {
        self.identity.current_database.as_deref()
    }

    /// Database captured at first login, restored on reset.
    #[must_use]
    pub fn original_database(&self) -> Option<&str> {
        self.identity.original_database.as_deref()
    }

    /// Current language as reported by the server.
    #[must_use]
    pub fn current_language(&self) -> Option<&str> {
        self.identity.current_language.as_deref()
    }

    /// Current packet size.
    #[must_use]
    pub fn current_packet_size(&self) -> u32 {
        self.identity.packet_size
    }

    /// The mirror partner the server reported, if any.
    #[must_use]
    pub fn server_provided_failover_partner(&self) -> Option<&str> {
        self.identity.server_provided_failover_partner.as_deref()
    }

    /// The real instance name reported for a user instance, if any.
    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        self.identity.instance_name.as_deref()
    }

    /// Registry of prepared commands attached to this connection.
    #[must_use]
    pub fn prepared_commands(&self) -> &PreparedCommandRegistry {
        &self.registry
    }

    /// Record that a result-set reader opened on this connection.
    pub fn result_set_opened(&self) {
        self.open_results.fetch_add(1, Ordering::AcqRel);
    }

    /// Record that a result-set reader closed.
    pub fn result_set_closed(&self) {
        self.open_results.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of currently open result sets.
    #[must_use]
    pub fn open_result_count(&self) -> usize {
        self.open_results.load(Ordering::Acquire)
    }

    /// Number of async operations the caller has started but not ended.
    #[must_use]
    pub fn pending_async_count(&self) -> usize {
        self.async_ops.load(Ordering::Acquire)
    }

    /// The delegated transaction this connection roots, if any.
    #[must_use]
    pub fn delegated_transaction(&self) -> Option<DelegatedTransaction> {
        self.delegated.lock().clone()
    }

    /// The transaction currently associated with the session.
    pub async fn current_transaction(&self) -> Result<Option<tds_transport::TransactionHandle>> {
        Ok(self.session_arc()?.lock().await.current_transaction())
    }

    /// Whether the next outgoing request will carry a reset instruction.
    pub async fn reset_pending(&self) -> Result<bool> {
        Ok(self.session_arc()?.lock().await.reset_pending())
    }

    /// Enlist in a distributed transaction.
    pub fn enlist(&self, transaction: &DistributedTransaction) {
        tracing::debug!(id = %transaction.id(), "enlisting in distributed transaction");
        *self.delegated.lock() = Some(DelegatedTransaction::from_distributed(transaction));
    }

    /// Explicitly un-enlist from whatever transaction was previously attached.
    pub fn unenlist(&self) {
        let mut slot = self.delegated.lock();
        if slot.is_some() {
            tracing::debug!("un-enlisting from distributed transaction");
            *slot = None;
        }
    }

    /// Mark the connection doomed. Absorbing; never un-done.
    pub fn doom(&mut self) {
        if !self.doomed.swap(true, Ordering::AcqRel) {
            tracing::warn!("connection doomed");
        }
        self.state = LifecycleState::Doomed;
    }

    pub(crate) fn session_arc(&self) -> Result<Arc<tokio::sync::Mutex<Session>>> {
        self.session.get().ok_or(Error::NotOpen)
    }

    /// Ingest buffered env changes from a session through the dispatch table.
    pub(crate) fn ingest_env_changes(&mut self, session: &mut Session) {
        for change in session.take_env_changes() {
            self.apply_environment_change(change);
        }
    }

    /// The env-change dispatch table.
    ///
    /// Database and language updates also refresh the "original" values, but
    /// only until the first login completes; afterwards the originals are
    /// frozen and only the current values track the server.
    pub(crate) fn apply_environment_change(&mut self, change: EnvChange) {
        tracing::trace!(kind = change.kind_name(), "environment change");
        match change {
            EnvChange::Database(database) => {
                if !self.login_complete {
                    self.identity.original_database = Some(database.clone());
                }
                self.identity.current_database = Some(database);
            }
            EnvChange::Language(language) => {
                if !self.login_complete {
                    self.identity.original_language = Some(language.clone());
                }
                self.identity.current_language = Some(language);
            }
            EnvChange::PacketSize(size) => {
                self.identity.packet_size = size;
            }
            EnvChange::FailoverPartner(partner) => {
                tracing::debug!(partner = %partner, "server reported failover partner");
                self.identity.server_provided_failover_partner = Some(partner);
            }
            EnvChange::PromotedTransaction(token) => {
                if let Some(delegated) = self.delegated.lock().as_mut() {
                    delegated.promoted_token = Some(token);
                }
            }
            EnvChange::UserInstance(name) => {
                self.identity.instance_name = Some(name);
            }
            EnvChange::SqlCollation | EnvChange::ResetAck => {
                // Parser-only kinds; nothing to track here.
            }
        }
    }
}
