//! The opaque per-connection session owned by the transport.

use crate::env::EnvChange;
use crate::version::TdsVersion;

/// Server-assigned handle identifying a transaction on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle(u64);

impl TransactionHandle {
    /// Wrap a raw transaction descriptor.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw transaction descriptor.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// State the transport keeps per physical connection.
///
/// A session is created by [`Transport::open`](crate::Transport::open) and
/// torn down by `disconnect`. The connection layer replaces its session and
/// identity together on every login retry; a session is never partially
/// reused across attempts.
///
/// Env changes the transport observes during an exchange are buffered here
/// (`push_env_change`) and drained by the connection layer afterwards — even
/// when the exchange itself failed, since a mirror server reports its partner
/// before rejecting a login.
#[derive(Debug)]
pub struct Session {
    version: TdsVersion,
    open: bool,
    mars_enabled: bool,
    current_transaction: Option<TransactionHandle>,
    pending_transaction: Option<TransactionHandle>,
    bulk_copy_locked: bool,
    pending_data: bool,
    reset_pending: bool,
    env_changes: Vec<EnvChange>,
}

impl Session {
    /// Create a session speaking the given protocol version.
    #[must_use]
    pub fn new(version: TdsVersion) -> Self {
        Self {
            version,
            open: false,
            mars_enabled: false,
            current_transaction: None,
            pending_transaction: None,
            bulk_copy_locked: false,
            pending_data: false,
            reset_pending: false,
            env_changes: Vec::new(),
        }
    }

    /// Negotiated protocol version.
    #[must_use]
    pub fn version(&self) -> TdsVersion {
        self.version
    }

    /// Whether login and post-login setup completed on this session.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Mark the session open.
    ///
    /// The connection layer calls this only after every post-login step
    /// (including multiplexing enablement) has succeeded.
    pub fn mark_open(&mut self) {
        self.open = true;
    }

    /// Mark the session closed.
    pub fn mark_closed(&mut self) {
        self.open = false;
    }

    /// Whether multiplexed sub-sessions are enabled.
    #[must_use]
    pub fn mars_enabled(&self) -> bool {
        self.mars_enabled
    }

    /// Record that multiplexing was enabled.
    pub fn set_mars_enabled(&mut self, enabled: bool) {
        self.mars_enabled = enabled;
    }

    /// The transaction currently associated with this session, if any.
    #[must_use]
    pub fn current_transaction(&self) -> Option<TransactionHandle> {
        self.current_transaction
    }

    /// Associate a transaction with this session.
    pub fn set_current_transaction(&mut self, handle: Option<TransactionHandle>) {
        self.current_transaction = handle;
    }

    /// A transaction the server has announced but not yet confirmed.
    #[must_use]
    pub fn pending_transaction(&self) -> Option<TransactionHandle> {
        self.pending_transaction
    }

    /// Record a pending transaction handle.
    pub fn set_pending_transaction(&mut self, handle: Option<TransactionHandle>) {
        self.pending_transaction = handle;
    }

    /// Whether a bulk-copy operation holds the session.
    #[must_use]
    pub fn bulk_copy_locked(&self) -> bool {
        self.bulk_copy_locked
    }

    /// Set the bulk-copy lock flag.
    pub fn set_bulk_copy_locked(&mut self, locked: bool) {
        self.bulk_copy_locked = locked;
    }

    /// Whether unread response bytes remain on the wire.
    #[must_use]
    pub fn has_pending_data(&self) -> bool {
        self.pending_data
    }

    /// Set the pending-data flag.
    pub fn set_pending_data(&mut self, pending: bool) {
        self.pending_data = pending;
    }

    /// Whether the next outgoing request must carry a reset instruction.
    #[must_use]
    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    /// Flag the session so the next outgoing request carries a reset.
    pub fn set_reset_pending(&mut self, pending: bool) {
        self.reset_pending = pending;
    }

    /// Buffer an env change observed by the transport.
    pub fn push_env_change(&mut self, change: EnvChange) {
        self.env_changes.push(change);
    }

    /// Drain the buffered env changes in arrival order.
    pub fn take_env_changes(&mut self) -> Vec<EnvChange> {
        std::mem::take(&mut self.env_changes)
    }
}
