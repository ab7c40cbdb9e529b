//! Ambient distributed-transaction context.
//!
//! The context is an explicitly constructed, injected object with a
//! documented process-wide lifetime; nothing in this crate reaches for an
//! ambient static.

use parking_lot::Mutex;
use uuid::Uuid;

/// A distributed transaction a connection may enlist in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedTransaction {
    id: Uuid,
    poolable: bool,
}

impl DistributedTransaction {
    /// A new poolable distributed transaction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            poolable: true,
        }
    }

    /// A distributed transaction whose rooting connection cannot be pooled
    /// until the transaction resolves.
    #[must_use]
    pub fn non_poolable() -> Self {
        Self {
            id: Uuid::new_v4(),
            poolable: false,
        }
    }

    /// Coordinator-assigned identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a connection rooting this transaction may return to the pool
    /// before the transaction resolves.
    #[must_use]
    pub fn is_poolable(&self) -> bool {
        self.poolable
    }
}

impl Default for DistributedTransaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide lookup for the ambient distributed transaction.
#[derive(Debug, Default)]
pub struct AmbientTransactions {
    current: Mutex<Option<DistributedTransaction>>,
}

impl AmbientTransactions {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ambient transaction.
    pub fn set_current(&self, transaction: DistributedTransaction) {
        *self.current.lock() = Some(transaction);
    }

    /// Clear the ambient transaction.
    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    /// The ambient transaction, if one is in scope.
    #[must_use]
    pub fn current(&self) -> Option<DistributedTransaction> {
        self.current.lock().clone()
    }
}

/// A transaction this connection has delegated to a distributed coordinator.
#[derive(Debug, Clone)]
pub struct DelegatedTransaction {
    /// Identity of the distributed transaction.
    pub id: Uuid,
    /// Whether the rooting connection may be pooled before resolution.
    pub poolable: bool,
    /// Coordinator token reported once the transaction was promoted.
    pub promoted_token: Option<Vec<u8>>,
}

impl DelegatedTransaction {
    /// Delegate to the given distributed transaction.
    #[must_use]
    pub fn from_distributed(transaction: &DistributedTransaction) -> Self {
        Self {
            id: transaction.id(),
            poolable: transaction.is_poolable(),
            promoted_token: None,
        }
    }
}
