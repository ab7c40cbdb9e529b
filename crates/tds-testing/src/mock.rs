//! Scripted mock transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tds_transport::{
    Deadline, EncryptionOptions, EnvChange, LoginAck, LoginRecord, Session, TdsVersion, TmRequest,
    TmRequestKind, TransactionHandle, Transport, TransportError,
};
use tokio::time::Instant;

/// Scripted outcome for one login attempt.
///
/// Outcomes are consumed front-to-back, one per `open` call; when the queue
/// runs dry every further attempt succeeds with no env changes.
#[derive(Debug, Clone)]
pub enum LoginScript {
    /// `open` itself fails.
    RefuseOpen(TransportError),
    /// `open` succeeds; the login exchange fails after the env changes have
    /// been delivered to the session (a mirror names its partner before it
    /// rejects a login).
    RefuseLogin {
        /// The login failure.
        error: TransportError,
        /// Env changes observed before the failure.
        env: Vec<EnvChange>,
    },
    /// The attempt succeeds; env changes arrive with the acknowledgment.
    Accept {
        /// Env changes delivered in the login response.
        env: Vec<EnvChange>,
    },
    /// Login succeeds but multiplexing enablement fails.
    RefuseMultiplexing(TransportError),
}

/// One recorded transport call.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An `open` call.
    Open {
        /// Extended server name targeted.
        server: String,
        /// Deadline budget observed at call time, in milliseconds.
        deadline_remaining_ms: i64,
        /// Monotonic timestamp of the call.
        at: Instant,
    },
    /// A `run_login` call.
    Login,
    /// A `drain` call.
    Drain,
    /// An `enable_multiplexing` call.
    EnableMultiplexing,
    /// An `open_sub_session` call.
    SubSession,
    /// A `send_batch` call with the batch text.
    Batch(String),
    /// A `send_tm_request` call with the request.
    Tm(TmRequest),
    /// A `disconnect` call.
    Disconnect,
}

/// A scripted [`Transport`] with an event log.
#[derive(Debug, Default)]
pub struct MockTransport {
    version: TdsVersion,
    script: Mutex<VecDeque<LoginScript>>,
    current: Mutex<Option<LoginScript>>,
    events: Mutex<Vec<TransportEvent>>,
    fail_next_batch: Mutex<Option<TransportError>>,
    fail_next_tm: Mutex<Option<TransportError>>,
    next_handle: AtomicU64,
}

impl MockTransport {
    /// A transport that accepts every attempt at the default version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose sessions speak the given protocol version.
    #[must_use]
    pub fn with_version(version: TdsVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Queue an outcome for the next unscripted attempt.
    pub fn push(&self, script: LoginScript) {
        self.script.lock().push_back(script);
    }

    /// Queue `count` identical failures followed by nothing.
    pub fn push_failures(&self, count: usize, error: TransportError) {
        let mut queue = self.script.lock();
        for _ in 0..count {
            queue.push_back(LoginScript::RefuseOpen(error.clone()));
        }
    }

    /// Arrange for the next `send_batch` to fail.
    pub fn fail_next_batch(&self, error: TransportError) {
        *self.fail_next_batch.lock() = Some(error);
    }

    /// Arrange for the next `send_tm_request` to fail.
    pub fn fail_next_tm_request(&self, error: TransportError) {
        *self.fail_next_tm.lock() = Some(error);
    }

    /// Everything recorded so far, in call order.
    #[must_use]
    pub fn events(&self) -> Vec<TransportEvent> {
        self.events.lock().clone()
    }

    /// Extended server names targeted by `open`, in order.
    #[must_use]
    pub fn open_targets(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Open { server, .. } => Some(server.clone()),
                _ => None,
            })
            .collect()
    }

    /// Timestamps of `open` calls, in order.
    #[must_use]
    pub fn open_instants(&self) -> Vec<Instant> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Open { at, .. } => Some(*at),
                _ => None,
            })
            .collect()
    }

    /// Deadline budgets observed by `open`, in milliseconds, in order.
    #[must_use]
    pub fn open_budgets_ms(&self) -> Vec<i64> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Open {
                    deadline_remaining_ms,
                    ..
                } => Some(*deadline_remaining_ms),
                _ => None,
            })
            .collect()
    }

    /// Batches sent, in order.
    #[must_use]
    pub fn batches(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Batch(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Transaction-manager requests sent, in order.
    #[must_use]
    pub fn tm_requests(&self) -> Vec<TmRequest> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Tm(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `open_sub_session` calls recorded.
    #[must_use]
    pub fn sub_session_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, TransportEvent::SubSession))
            .count()
    }

    fn record(&self, event: TransportEvent) {
        self.events.lock().push(event);
    }

    fn ack(&self) -> LoginAck {
        LoginAck {
            negotiated_version: self.version,
            program_name: "Mock SQL Server".into(),
            server_build: 0x0F00_0000,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        server: &str,
        deadline: Deadline,
        _encryption: EncryptionOptions,
    ) -> Result<Session, TransportError> {
        self.record(TransportEvent::Open {
            server: server.to_string(),
            deadline_remaining_ms: deadline.remaining_millis(),
            at: Instant::now(),
        });
        let script = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(LoginScript::Accept { env: Vec::new() });
        match script {
            LoginScript::RefuseOpen(error) => Err(error),
            other => {
                *self.current.lock() = Some(other);
                Ok(Session::new(self.version))
            }
        }
    }

    async fn run_login(
        &self,
        session: &mut Session,
        _record: &LoginRecord,
    ) -> Result<LoginAck, TransportError> {
        self.record(TransportEvent::Login);
        let current = self.current.lock().clone();
        match current {
            Some(LoginScript::RefuseLogin { error, env }) => {
                for change in env {
                    session.push_env_change(change);
                }
                Err(error)
            }
            Some(LoginScript::Accept { env }) => {
                for change in env {
                    session.push_env_change(change);
                }
                Ok(self.ack())
            }
            _ => Ok(self.ack()),
        }
    }

    async fn drain(&self, _session: &mut Session) -> Result<(), TransportError> {
        self.record(TransportEvent::Drain);
        Ok(())
    }

    async fn disconnect(&self, session: &mut Session) {
        self.record(TransportEvent::Disconnect);
        session.mark_closed();
    }

    async fn enable_multiplexing(
        &self,
        _session: &mut Session,
        _data_source: &str,
    ) -> Result<(), TransportError> {
        self.record(TransportEvent::EnableMultiplexing);
        let current = self.current.lock().clone();
        match current {
            Some(LoginScript::RefuseMultiplexing(error)) => Err(error),
            _ => Ok(()),
        }
    }

    async fn open_sub_session(&self, parent: &Session) -> Result<Session, TransportError> {
        self.record(TransportEvent::SubSession);
        let mut sub = Session::new(parent.version());
        sub.mark_open();
        Ok(sub)
    }

    async fn send_batch(
        &self,
        _session: &mut Session,
        batch: &str,
    ) -> Result<(), TransportError> {
        self.record(TransportEvent::Batch(batch.to_string()));
        match self.fail_next_batch.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn send_tm_request(
        &self,
        _session: &mut Session,
        request: &TmRequest,
    ) -> Result<Option<TransactionHandle>, TransportError> {
        self.record(TransportEvent::Tm(request.clone()));
        if let Some(error) = self.fail_next_tm.lock().take() {
            return Err(error);
        }
        Ok(match request.kind {
            TmRequestKind::Begin => Some(TransactionHandle::new(
                self.next_handle.fetch_add(1, Ordering::Relaxed) + 1,
            )),
            _ => None,
        })
    }
}
