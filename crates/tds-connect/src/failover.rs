//! The login/failover state machine.
//!
//! Two sub-protocols establish one authenticated session under a global
//! deadline: a single-target retry loop with exponential backoff, and a
//! dual-target loop alternating between a primary and a mirror partner with a
//! multiplicatively growing per-round timeout slice. The single-target loop
//! jumps into the dual-target protocol when a failed attempt reveals a
//! server-reported partner.

use std::time::Duration;

use tds_transport::{Deadline, ServerInfo, Transport};
use tokio::time::Instant;

use crate::config::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::connection::TdsConnection;
use crate::error::{Error, Result};
use crate::lifecycle::LifecycleState;
use crate::pool_group::FailoverSide;

/// Fraction of the overall timeout granted per dual-target round unit.
const FAILOVER_TIMEOUT_STEP: f64 = 0.08;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// The 100, 200, 400, 800, 1000, 1000, ... backoff ladder.
///
/// `peek` and `advance` are separate so a loop can verify the deadline
/// outlasts the interval before committing to the sleep.
#[derive(Debug)]
pub(crate) struct RetrySchedule {
    next: Duration,
}

impl RetrySchedule {
    pub(crate) fn new() -> Self {
        Self {
            next: INITIAL_BACKOFF,
        }
    }

    /// The interval the next sleep would use.
    pub(crate) fn peek(&self) -> Duration {
        self.next
    }

    /// Consume the current interval and double the next, pinned at 1000ms.
    pub(crate) fn advance(&mut self) -> Duration {
        let current = self.next;
        if current < MAX_BACKOFF {
            self.next = (current * 2).min(MAX_BACKOFF);
        }
        current
    }
}

/// Per-round timeout unit for the dual-target loop: 8% of the overall
/// budget, or of the default connect timeout when the budget is infinite.
pub(crate) fn failover_timeout_unit(connect_timeout_secs: u32) -> Duration {
    let total_secs = if connect_timeout_secs == 0 {
        u64::from(DEFAULT_CONNECT_TIMEOUT_SECS)
    } else {
        u64::from(connect_timeout_secs)
    };
    let unit_ms = (total_secs as f64 * 1000.0 * FAILOVER_TIMEOUT_STEP) as u64;
    Duration::from_millis(unit_ms)
}

/// Outcome of one single-target attempt, as seen by the retry loop.
enum AttemptOutcome {
    /// The session is open.
    Success,
    /// Transient failure; retry within the deadline.
    Continue(Error),
    /// The failed attempt revealed a mirror partner; switch protocols.
    SwitchToDualTarget {
        /// Partner host reported by the server.
        partner: String,
        /// The failure that ended the attempt.
        last: Error,
    },
    /// Authentication rejection or fatal failure; no further retries.
    Terminal(Error),
}

impl<T: Transport> TdsConnection<T> {
    /// Establish one authenticated session, honoring the configured deadline
    /// and failover topology.
    ///
    /// On failure the connection is doomed and the per-attempt cleanup
    /// (transport disconnect) has already run.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_doomed() {
            return Err(Error::Doomed);
        }
        if !self.session.is_empty() {
            return Ok(());
        }

        let deadline = Deadline::from_seconds(self.config.connect_timeout_secs, Instant::now());
        self.state = LifecycleState::Opening;
        tracing::info!(
            host = %self.config.host,
            failover_partner = ?self.config.failover_partner,
            timeout_secs = self.config.connect_timeout_secs,
            "establishing connection"
        );

        let primary = self.config.primary_server_info();
        let result = match self.config.failover_partner.clone() {
            Some(partner) => {
                let start_with_partner = self
                    .pool_group
                    .as_deref()
                    .is_some_and(crate::pool_group::PoolGroup::use_failover_partner);
                self.login_with_failover(primary, &partner, start_with_partner, deadline)
                    .await
            }
            None => self.login_no_failover(primary, deadline).await,
        };

        match result {
            Ok(()) => {
                self.state = LifecycleState::Open;
                Ok(())
            }
            Err(err) => {
                self.doom();
                Err(err)
            }
        }
    }

    /// Single-target retry loop.
    async fn login_no_failover(&mut self, server: ServerInfo, deadline: Deadline) -> Result<()> {
        // Resolve the target name once; retries reuse the memoized result.
        server.set_derived_names();

        let mut schedule = RetrySchedule::new();
        let mut attempts: u32 = 0;
        loop {
            let first_attempt = attempts == 0;
            attempts += 1;
            let result = self
                .attempt_one_login(&server, first_attempt, deadline)
                .await;

            match self.single_target_outcome(result) {
                AttemptOutcome::Success => {
                    self.register_success(&server, FailoverSide::Primary);
                    return Ok(());
                }
                AttemptOutcome::Terminal(err) => return Err(err),
                AttemptOutcome::SwitchToDualTarget { partner, last } => {
                    if deadline.is_expired() {
                        return Err(timeout_failure(attempts, last));
                    }
                    tracing::debug!(partner = %partner, "switching to dual-target login");
                    return self
                        .login_with_failover(server, &partner, true, deadline)
                        .await;
                }
                AttemptOutcome::Continue(err) => {
                    if deadline.is_expired() {
                        return Err(timeout_failure(attempts, err));
                    }
                    let interval = schedule.peek();
                    if !deadline.outlasts(interval) {
                        // Sleeping would carry the loop past the deadline;
                        // surface the last failure instead.
                        return Err(timeout_failure(attempts, err));
                    }
                    tracing::debug!(
                        attempt = attempts,
                        delay_ms = interval.as_millis() as u64,
                        error = %err,
                        "login attempt failed; backing off"
                    );
                    tokio::time::sleep(schedule.advance()).await;
                }
            }
        }
    }

    fn single_target_outcome(&self, result: Result<()>) -> AttemptOutcome {
        match result {
            Ok(()) => AttemptOutcome::Success,
            Err(err) if err.is_fatal() || err.is_terminal_auth() => AttemptOutcome::Terminal(err),
            Err(err) => match self.identity.server_provided_failover_partner.clone() {
                Some(partner) => AttemptOutcome::SwitchToDualTarget { partner, last: err },
                None => AttemptOutcome::Continue(err),
            },
        }
    }

    /// Dual-target loop alternating between primary and mirror.
    async fn login_with_failover(
        &mut self,
        primary: ServerInfo,
        failover_host: &str,
        start_with_failover: bool,
        deadline: Deadline,
    ) -> Result<()> {
        let unit = failover_timeout_unit(self.config.connect_timeout_secs);
        primary.set_derived_names();
        let mut failover_server = ServerInfo::new(failover_host.to_string());
        let mut schedule = RetrySchedule::new();
        let mut use_failover_host = start_with_failover;
        let mut attempt: u32 = 0;

        loop {
            // Round k grants each target a slice of unit * (k + 1), capped
            // at the overall deadline.
            let round = attempt / 2;
            let slice = deadline.slice(unit * (round + 1));

            if use_failover_host {
                self.demand_failover_permission(&failover_server)?;
                // The server-reported partner supersedes the configured one;
                // a fresh ServerInfo forces re-resolution.
                if let Some(reported) = self.identity.server_provided_failover_partner.clone() {
                    if reported != failover_server.user_server_name() {
                        tracing::debug!(
                            partner = %reported,
                            "re-resolving mirror target from server-reported partner"
                        );
                        failover_server = ServerInfo::new(reported);
                    }
                }
                failover_server.set_derived_names();
            }
            let target = if use_failover_host {
                &failover_server
            } else {
                &primary
            };

            match self.attempt_one_login(target, false, slice).await {
                Ok(()) => {
                    if use_failover_host
                        && self.identity.server_provided_failover_partner.is_none()
                    {
                        // The transport succeeded, but a real mirror names
                        // its partner during login; a standalone server that
                        // accepted this connection is misconfigured.
                        self.disconnect_session().await;
                        return Err(Error::InvalidPartnerConfiguration {
                            host: failover_server.user_server_name().to_string(),
                        });
                    }
                    let side = if use_failover_host {
                        FailoverSide::Mirror
                    } else {
                        FailoverSide::Primary
                    };
                    self.register_success(target, side);
                    return Ok(());
                }
                Err(err) => {
                    if err.is_fatal() || err.is_terminal_auth() {
                        return Err(err);
                    }
                    if deadline.is_expired() {
                        return Err(timeout_failure(attempt + 1, err));
                    }
                    // Back off only once a full round — one attempt at each
                    // target — has failed.
                    if attempt % 2 == 1 {
                        let interval = schedule.peek();
                        if !deadline.outlasts(interval) {
                            return Err(timeout_failure(attempt + 1, err));
                        }
                        tracing::debug!(
                            round = round,
                            delay_ms = interval.as_millis() as u64,
                            error = %err,
                            "dual-target round failed; backing off"
                        );
                        tokio::time::sleep(schedule.advance()).await;
                    }
                }
            }

            attempt += 1;
            use_failover_host = !use_failover_host;
        }
    }

    /// Authorization to use the mirror, checked lazily exactly once the
    /// first time the mirror is actually attempted.
    fn demand_failover_permission(&mut self, failover_server: &ServerInfo) -> Result<()> {
        if self.failover_permission_checked {
            return Ok(());
        }
        let host = failover_server.user_server_name();
        if host.trim().is_empty() || host.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "invalid failover partner name: {host:?}"
            )));
        }
        self.failover_permission_checked = true;
        Ok(())
    }

    /// Record the winning host and notify the pool group which side won.
    fn register_success(&mut self, server: &ServerInfo, side: FailoverSide) {
        let data_source = server.user_server_name().to_string();
        tracing::info!(data_source = %data_source, side = ?side, "login succeeded");
        self.current_data_source = Some(data_source);
        if let Some(group) = &self.pool_group {
            group.designate_winner(side);
            if let Some(partner) = &self.identity.server_provided_failover_partner {
                group.record_reported_partner(partner);
            }
        }
    }
}

fn timeout_failure(attempts: u32, last: Error) -> Error {
    Error::LoginTimeout {
        attempts,
        source: Box::new(last),
    }
}
