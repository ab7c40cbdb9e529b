//! Pool-group provider info shared across connection instances.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Which side of a mirrored pair a connection ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverSide {
    /// The configured primary.
    Primary,
    /// The configured (or server-reported) mirror partner.
    Mirror,
}

/// Read-only configuration plus failover hints shared by every connection in
/// a pool group.
///
/// Connections notify the group which side of a mirrored pair won their login
/// race so subsequent pooled connections try the winner first. Notifications
/// are fire-and-forget, idempotent, and safe to issue from multiple
/// connection instances concurrently.
#[derive(Debug, Default)]
pub struct PoolGroup {
    use_failover_partner: AtomicBool,
    reported_partner: Mutex<Option<String>>,
}

impl PoolGroup {
    /// Create a pool group with no failover hints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether new connections should try the failover partner first.
    #[must_use]
    pub fn use_failover_partner(&self) -> bool {
        self.use_failover_partner.load(Ordering::Acquire)
    }

    /// Record which side won a login race.
    pub fn designate_winner(&self, side: FailoverSide) {
        let use_partner = matches!(side, FailoverSide::Mirror);
        self.use_failover_partner
            .store(use_partner, Ordering::Release);
        tracing::debug!(use_failover_partner = use_partner, "pool group winner updated");
    }

    /// Record the partner name the server reported.
    pub fn record_reported_partner(&self, partner: &str) {
        let mut slot = self.reported_partner.lock();
        if slot.as_deref() != Some(partner) {
            *slot = Some(partner.to_string());
        }
    }

    /// The most recently reported partner name, if any.
    #[must_use]
    pub fn reported_partner(&self) -> Option<String> {
        self.reported_partner.lock().clone()
    }
}
