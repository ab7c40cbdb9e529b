//! Pooling lifecycle hooks.
//!
//! The pool and the public-facing connection object depend only on the
//! [`BackendConnection`] trait; `TdsConnection` is the concrete TDS
//! implementation. Activate runs at pool checkout, deactivate at checkin,
//! and dispose tears the physical connection down for good.

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tds_transport::{EnvChange, Transport};

use crate::ambient::DistributedTransaction;
use crate::connection::TdsConnection;
use crate::error::{Error, Result};

const RESET_BATCH: &str = "EXEC sp_reset_connection";

/// Lifecycle states of a backend connection.
///
/// `Doomed` is absorbing: a fatal resource error moves any state directly to
/// `Doomed`, and dispose is the only exit (to `Closed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No physical connection.
    Closed,
    /// The login state machine is running.
    Opening,
    /// Authenticated and idle.
    Open,
    /// Checked out of the pool.
    Activated,
    /// Returned to the pool.
    Deactivated,
    /// Unusable; awaiting dispose.
    Doomed,
}

impl LifecycleState {
    /// Whether the connection can service requests in this state.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Open | Self::Activated | Self::Deactivated)
    }
}

/// Pool-facing capability interface of a backend connection.
///
/// Object-safe so the pool can hold heterogeneous backends behind
/// `Box<dyn BackendConnection>`.
#[async_trait]
pub trait BackendConnection: Send {
    /// Pool checkout hook.
    ///
    /// Enlists in the handed ambient transaction when auto-enlist is
    /// configured; with no transaction handed, explicitly un-enlists from
    /// whatever was previously attached.
    async fn activate(&mut self, ambient: Option<DistributedTransaction>) -> Result<()>;

    /// Pool checkin hook; runs the reset sequence where applicable.
    async fn deactivate(&mut self) -> Result<()>;

    /// Tear down the physical connection. Idempotent; never fails.
    async fn dispose(&mut self);

    /// Ingest a server environment-change notification.
    fn on_environment_change(&mut self, change: EnvChange);

    /// Mark the connection doomed and request an owner-level close.
    fn break_connection(&mut self);

    /// Record the start of an async operation.
    fn increment_async_count(&self);

    /// Record the end of an async operation.
    fn decrement_async_count(&self);

    /// Whether the connection has been doomed.
    fn is_doomed(&self) -> bool;
}

impl<T: Transport> TdsConnection<T> {
    /// Pool checkout hook.
    pub async fn activate(&mut self, ambient: Option<DistributedTransaction>) -> Result<()> {
        if self.is_doomed() {
            return Err(Error::Doomed);
        }
        match ambient {
            Some(transaction) => {
                if self.config.auto_enlist {
                    self.enlist(&transaction);
                }
            }
            // A pooled connection must never silently carry a stale
            // transaction into its next checkout.
            None => self.unenlist(),
        }
        self.state = LifecycleState::Activated;
        Ok(())
    }

    /// Pool checkin hook.
    pub async fn deactivate(&mut self) -> Result<()> {
        let pending = self.pending_async_count();
        if pending != 0 {
            // An un-ended async operation leaves the wire state unknowable.
            tracing::warn!(pending, "deactivated with pending async operations; dooming");
            self.doom();
            return Ok(());
        }

        if let Some(delegated) = self.delegated_transaction() {
            if !delegated.poolable {
                // This deactivation will be invoked again once the
                // transaction resolves; defer all cleanup until then.
                tracing::debug!(
                    id = %delegated.id,
                    "deactivation deferred for non-poolable delegated transaction"
                );
                return Ok(());
            }
        }

        if self.config.connection_reset {
            self.reset_for_reuse().await;
        }
        if !self.is_doomed() {
            self.state = LifecycleState::Deactivated;
        }
        Ok(())
    }

    /// Reset server-side state ahead of pooled reuse.
    ///
    /// Modern protocol versions flag the transport so the next outgoing
    /// request carries the reset instruction; legacy versions execute the
    /// reset procedure synchronously, and only when not enlisted in a
    /// distributed transaction. A legacy reset failure dooms the connection
    /// instead of propagating: pool return must not fail.
    async fn reset_for_reuse(&mut self) {
        let Ok(session_arc) = self.session_arc() else {
            return;
        };
        let enlisted = self.delegated.lock().is_some();
        {
            let mut session = session_arc.lock().await;
            if session.version().supports_deferred_reset() {
                session.set_reset_pending(true);
            } else if !enlisted {
                let mut failure = None;
                if let Err(err) = self.transport.send_batch(&mut session, RESET_BATCH).await {
                    failure = Some(err);
                } else if let Err(err) = self.transport.drain(&mut session).await {
                    failure = Some(err);
                }
                if let Some(err) = failure {
                    tracing::warn!(error = %err, "connection reset failed; dooming");
                    drop(session);
                    self.doom();
                    return;
                }
            }
        }
        // Env-change notifications for a reset that hasn't round-tripped yet
        // won't arrive; restore the originals directly.
        self.identity.current_database = self.identity.original_database.clone();
        self.identity.current_language = self.identity.original_language.clone();
    }

    /// Tear down the physical connection.
    ///
    /// Unprepares every command still registered (best effort; dispose never
    /// fails), then swaps the session out atomically and disconnects it.
    pub async fn dispose(&mut self) {
        let handles = self.registry.drain();
        if let Some(session_arc) = self.session.take() {
            let mut session = session_arc.lock().await;
            if !self.is_doomed() {
                for handle in handles {
                    let batch = format!("EXEC sp_unprepare {handle}");
                    if self.transport.send_batch(&mut session, &batch).await.is_err() {
                        break;
                    }
                    if self.transport.drain(&mut session).await.is_err() {
                        break;
                    }
                }
            }
            self.transport.disconnect(&mut session).await;
            session.mark_closed();
        }
        *self.delegated.lock() = None;
        self.state = LifecycleState::Closed;
    }

    /// Mark the connection doomed and request an owner-level close.
    pub fn break_connection(&mut self) {
        tracing::warn!("connection break requested");
        self.doom();
        if let Some(handler) = self.break_handler.clone() {
            handler();
        }
    }

    /// Ingest a server environment-change notification.
    pub fn on_environment_change(&mut self, change: EnvChange) {
        self.apply_environment_change(change);
    }

    /// Record the start of an async operation.
    pub fn increment_async_count(&self) {
        self.async_ops.fetch_add(1, Ordering::AcqRel);
    }

    /// Record the end of an async operation.
    pub fn decrement_async_count(&self) {
        self.async_ops.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl<T: Transport> BackendConnection for TdsConnection<T> {
    async fn activate(&mut self, ambient: Option<DistributedTransaction>) -> Result<()> {
        TdsConnection::activate(self, ambient).await
    }

    async fn deactivate(&mut self) -> Result<()> {
        TdsConnection::deactivate(self).await
    }

    async fn dispose(&mut self) {
        TdsConnection::dispose(self).await;
    }

    fn on_environment_change(&mut self, change: EnvChange) {
        TdsConnection::on_environment_change(self, change);
    }

    fn break_connection(&mut self) {
        TdsConnection::break_connection(self);
    }

    fn increment_async_count(&self) {
        TdsConnection::increment_async_count(self);
    }

    fn decrement_async_count(&self) {
        TdsConnection::decrement_async_count(self);
    }

    fn is_doomed(&self) -> bool {
        TdsConnection::is_doomed(self)
    }
}
