//! Registry of prepared commands attached to a connection.
//!
//! The connection holds non-owning back-references to the prepared commands
//! created on it; each command owns its own lifetime and must call
//! [`PreparedCommandRegistry::unregister`] before its disposal completes.
//! Nothing here depends on garbage-collector-observable liveness.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Token identifying a registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandToken(u64);

#[derive(Debug)]
struct RegisteredCommand {
    token: CommandToken,
    statement_handle: i32,
}

/// Non-owning registry of prepared-command handles.
#[derive(Debug, Default)]
pub struct PreparedCommandRegistry {
    entries: Mutex<Vec<RegisteredCommand>>,
    next_token: AtomicU64,
}

impl PreparedCommandRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prepared command by its server-side statement handle.
    pub fn register(&self, statement_handle: i32) -> CommandToken {
        let token = CommandToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push(RegisteredCommand {
            token,
            statement_handle,
        });
        token
    }

    /// Remove a command; returns whether it was still registered.
    pub fn unregister(&self, token: CommandToken) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.token != token);
        entries.len() != before
    }

    /// Drain every surviving statement handle, emptying the registry.
    ///
    /// Called on dispose so the connection can unprepare what its commands
    /// left behind.
    pub fn drain(&self) -> Vec<i32> {
        self.entries
            .lock()
            .drain(..)
            .map(|entry| entry.statement_handle)
            .collect()
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn register_unregister_round_trip() {
        let registry = PreparedCommandRegistry::new();
        let a = registry.register(10);
        let b = registry.register(20);
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(b));
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_returns_surviving_handles() {
        let registry = PreparedCommandRegistry::new();
        let a = registry.register(10);
        registry.register(20);
        registry.register(30);
        registry.unregister(a);

        let handles = registry.drain();
        assert_eq!(handles, vec![20, 30]);
        assert!(registry.is_empty());
    }
}
