//! Failover state-machine tests driven by the scripted mock transport.
//!
//! Timing assertions run under the paused runtime clock, so sleeps advance
//! virtual time exactly and the backoff ladder can be asserted to the
//! millisecond.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tds_connect::{ConnectionConfig, Error, PoolGroup, TdsConnection};
use tds_testing::{LoginScript, MockTransport};
use tds_transport::{AuthError, AuthErrorKind, EnvChange, TransportError};
use tokio::time::Instant;

fn test_config(host: &str) -> ConnectionConfig {
    ConnectionConfig::new(host, "sa", "Password!123").connect_timeout_secs(60)
}

fn connect_to(transport: &Arc<MockTransport>, config: ConnectionConfig) -> TdsConnection<MockTransport> {
    TdsConnection::new(Arc::clone(transport), config).expect("valid config")
}

fn gaps_ms(instants: &[Instant]) -> Vec<u64> {
    instants
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn single_target_backoff_sequence_is_exact() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failures(6, TransportError::Timeout);

    let mut connection = connect_to(&transport, test_config("db01").connect_timeout_secs(0));
    connection.open().await.expect("seventh attempt succeeds");

    let instants = transport.open_instants();
    assert_eq!(instants.len(), 7);
    assert_eq!(gaps_ms(&instants), vec![100, 200, 400, 800, 1000, 1000]);
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_is_unbounded() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failures(20, TransportError::ConnectionClosed);

    let mut connection = connect_to(&transport, test_config("db01").connect_timeout_secs(0));
    connection
        .open()
        .await
        .expect("an infinite deadline never raises deadline-exceeded");
    assert_eq!(transport.open_instants().len(), 21);
}

#[tokio::test(start_paused = true)]
async fn primary_unreachable_twice_then_success() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failures(2, TransportError::ConnectionClosed);

    let mut connection = connect_to(&transport, test_config("db01"));
    connection.open().await.expect("third attempt succeeds");

    let instants = transport.open_instants();
    assert_eq!(instants.len(), 3);
    assert_eq!(gaps_ms(&instants), vec![100, 200]);
    assert_eq!(connection.current_data_source(), Some("db01"));

    // The very first attempt ignores the deadline for the open call; every
    // later attempt is bounded by it.
    let budgets = transport.open_budgets_ms();
    assert_eq!(budgets[0], i64::MAX);
    assert!(budgets[1] <= 60_000);
    assert!(budgets[2] <= 60_000);
}

#[tokio::test(start_paused = true)]
async fn password_expired_fails_immediately() {
    let transport = Arc::new(MockTransport::new());
    transport.push(LoginScript::RefuseLogin {
        error: AuthError::password_expired("password has expired").into(),
        env: Vec::new(),
    });

    let start = Instant::now();
    let mut connection = connect_to(&transport, test_config("db01"));
    let err = connection.open().await.expect_err("terminal failure");

    match err {
        Error::Transport(TransportError::Auth(auth)) => {
            assert_eq!(auth.kind, AuthErrorKind::PasswordExpired);
        }
        other => panic!("expected auth failure, got {other:?}"),
    }
    assert_eq!(transport.open_instants().len(), 1, "exactly one attempt");
    assert_eq!(start.elapsed(), Duration::ZERO, "zero sleeps");
    assert!(connection.is_doomed());
}

#[tokio::test(start_paused = true)]
async fn bad_credentials_never_retried() {
    let transport = Arc::new(MockTransport::new());
    transport.push(LoginScript::RefuseLogin {
        error: AuthError::bad_credentials("login failed for user 'sa'").into(),
        env: Vec::new(),
    });

    let mut connection = connect_to(&transport, test_config("db01"));
    let err = connection.open().await.expect_err("terminal failure");

    match err {
        Error::Transport(TransportError::Auth(auth)) => {
            assert_eq!(auth.kind, AuthErrorKind::BadCredentials);
            assert_eq!(auth.message, "login failed for user 'sa'");
        }
        other => panic!("expected auth failure, got {other:?}"),
    }
    assert_eq!(transport.open_instants().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_exceeded_preserves_last_failure() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failures(10, TransportError::ConnectionClosed);

    let start = Instant::now();
    let mut connection = connect_to(&transport, test_config("db01").connect_timeout_secs(1));
    let err = connection.open().await.expect_err("deadline exceeded");

    // Attempts at 0, 100, 300, 700ms; the next 800ms sleep would overrun the
    // one-second deadline, so the loop raises the last failure instead.
    match err {
        Error::LoginTimeout { attempts, source } => {
            assert_eq!(attempts, 4);
            assert!(matches!(
                *source,
                Error::Transport(TransportError::ConnectionClosed)
            ));
        }
        other => panic!("expected login timeout, got {other:?}"),
    }
    assert_eq!(transport.open_instants().len(), 4);
    assert!(start.elapsed() <= Duration::from_secs(1));
    assert!(connection.is_doomed());
}

#[tokio::test(start_paused = true)]
async fn fatal_resource_failure_dooms_without_retry() {
    let transport = Arc::new(MockTransport::new());
    transport.push(LoginScript::RefuseOpen(TransportError::Fatal(
        "out of memory".into(),
    )));

    let mut connection = connect_to(&transport, test_config("db01"));
    let err = connection.open().await.expect_err("fatal failure");

    // Rethrown unchanged, no retries, connection doomed.
    assert!(matches!(
        err,
        Error::Transport(TransportError::Fatal(ref message)) if message.as_str() == "out of memory"
    ));
    assert_eq!(transport.open_instants().len(), 1);
    assert!(connection.is_doomed());
}

#[tokio::test(start_paused = true)]
async fn discovered_partner_switches_to_dual_target() {
    let transport = Arc::new(MockTransport::new());
    // The primary is a mirror in the mirror role: it names its partner, then
    // rejects the login.
    transport.push(LoginScript::RefuseLogin {
        error: TransportError::Server {
            number: 983,
            class: 14,
            message: "database is acting as a mirror".into(),
        },
        env: vec![EnvChange::FailoverPartner("db02".into())],
    });
    // The discovered partner accepts and names its own partner back.
    transport.push(LoginScript::Accept {
        env: vec![EnvChange::FailoverPartner("db01".into())],
    });

    let group = Arc::new(PoolGroup::new());
    let mut connection = connect_to(&transport, test_config("db01")).with_pool_group(Arc::clone(&group));
    connection.open().await.expect("partner accepts");

    assert_eq!(transport.open_targets(), vec!["db01", "db02"]);
    assert_eq!(connection.current_data_source(), Some("db02"));
    assert!(group.use_failover_partner());
}

#[tokio::test(start_paused = true)]
async fn reported_partner_supersedes_configured_mirror() {
    let transport = Arc::new(MockTransport::new());
    transport.push(LoginScript::RefuseLogin {
        error: TransportError::ConnectionClosed,
        env: vec![EnvChange::FailoverPartner("db03".into())],
    });
    transport.push(LoginScript::Accept {
        env: vec![EnvChange::FailoverPartner("db01".into())],
    });

    let mut connection = connect_to(
        &transport,
        test_config("db01").failover_partner("db-stale"),
    );
    connection.open().await.expect("re-resolved partner accepts");

    // The next mirror attempt resolves against the server-reported partner,
    // not the configured one.
    assert_eq!(transport.open_targets(), vec!["db01", "db03"]);
    assert_eq!(connection.current_data_source(), Some("db03"));
}

#[tokio::test(start_paused = true)]
async fn standalone_server_posing_as_mirror_is_config_error() {
    let transport = Arc::new(MockTransport::new());
    transport.push(LoginScript::RefuseOpen(TransportError::ConnectionClosed));
    // The "mirror" accepts but never identifies a partner.
    transport.push(LoginScript::Accept { env: Vec::new() });

    let mut connection = connect_to(&transport, test_config("db01").failover_partner("db02"));
    let err = connection.open().await.expect_err("configuration error");

    match err {
        Error::InvalidPartnerConfiguration { host } => assert_eq!(host, "db02"),
        other => panic!("expected invalid-partner failure, got {other:?}"),
    }
    // The accepted session was torn down despite the transport success.
    assert!(
        transport
            .events()
            .iter()
            .any(|event| matches!(event, tds_testing::TransportEvent::Disconnect))
    );
    assert!(connection.is_doomed());
}

#[tokio::test(start_paused = true)]
async fn dual_target_round_slices_grow_multiplicatively() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failures(6, TransportError::ConnectionClosed);

    let mut connection = connect_to(
        &transport,
        test_config("db01")
            .failover_partner("db02")
            .connect_timeout_secs(100),
    );
    connection.open().await.expect("seventh attempt succeeds");

    // unit = 8% of 100s = 8s; round k grants unit * (k + 1) per target.
    let budgets = transport.open_budgets_ms();
    assert_eq!(
        budgets,
        vec![8_000, 8_000, 16_000, 16_000, 24_000, 24_000, 32_000]
    );
}

#[tokio::test(start_paused = true)]
async fn dual_target_sleeps_only_after_full_rounds() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failures(6, TransportError::ConnectionClosed);

    let mut connection = connect_to(
        &transport,
        test_config("db01")
            .failover_partner("db02")
            .connect_timeout_secs(100),
    );
    connection.open().await.expect("seventh attempt succeeds");

    let instants = transport.open_instants();
    // Primary and mirror attempts within a round are back to back; the
    // backoff ladder runs between rounds only.
    assert_eq!(gaps_ms(&instants), vec![0, 100, 0, 200, 0, 400]);
    // Alternation: primary, mirror, primary, ...
    assert_eq!(
        transport.open_targets(),
        vec!["db01", "db02", "db01", "db02", "db01", "db02", "db01"]
    );
}

#[tokio::test(start_paused = true)]
async fn winner_is_registered_with_pool_group() {
    let transport = Arc::new(MockTransport::new());
    transport.push(LoginScript::RefuseOpen(TransportError::ConnectionClosed));
    transport.push(LoginScript::Accept {
        env: vec![EnvChange::FailoverPartner("db01".into())],
    });

    let group = Arc::new(PoolGroup::new());
    let mut first = connect_to(&transport, test_config("db01").failover_partner("db02"))
        .with_pool_group(Arc::clone(&group));
    first.open().await.expect("mirror accepts");

    assert_eq!(first.current_data_source(), Some("db02"));
    assert!(group.use_failover_partner());
    assert_eq!(group.reported_partner(), Some("db01".to_string()));

    // A subsequent pooled connection tries the winning side first.
    transport.push(LoginScript::Accept {
        env: vec![EnvChange::FailoverPartner("db01".into())],
    });
    let mut second = connect_to(&transport, test_config("db01").failover_partner("db02"))
        .with_pool_group(Arc::clone(&group));
    second.open().await.expect("winner accepts immediately");
    assert_eq!(transport.open_targets().last().map(String::as_str), Some("db02"));
}
