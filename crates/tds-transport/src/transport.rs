//! The transport collaborator trait.

use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::error::TransportError;
use crate::login::{LoginAck, LoginRecord};
use crate::session::{Session, TransactionHandle};
use crate::tm::TmRequest;

/// Encryption negotiation options passed through to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptionOptions {
    /// Request full-channel encryption.
    pub encrypt: bool,
    /// Skip server certificate validation.
    pub trust_server_certificate: bool,
}

/// The wire-level packet layer, seen from the connection state machine.
///
/// Implementations own packet framing, the login record layout, and
/// encryption negotiation. The connection layer drives this interface
/// sequentially per connection instance; implementations must bound every
/// operation by the supplied deadline where one is given, and `disconnect`
/// must be idempotent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a transport to the given extended server name.
    async fn open(
        &self,
        server: &str,
        deadline: Deadline,
        encryption: EncryptionOptions,
    ) -> Result<Session, TransportError>;

    /// Run the protocol handshake and login exchange.
    ///
    /// Env changes observed during the exchange are buffered on the session
    /// whether or not the login succeeds.
    async fn run_login(
        &self,
        session: &mut Session,
        record: &LoginRecord,
    ) -> Result<LoginAck, TransportError>;

    /// Synchronously consume the remainder of the server's response.
    async fn drain(&self, session: &mut Session) -> Result<(), TransportError>;

    /// Tear down the transport. Idempotent; never fails.
    async fn disconnect(&self, session: &mut Session);

    /// Whether the underlying transport is closed.
    fn is_closed(&self, session: &Session) -> bool {
        !session.is_open()
    }

    /// Enable multiplexed sub-sessions on an authenticated session.
    async fn enable_multiplexing(
        &self,
        session: &mut Session,
        data_source: &str,
    ) -> Result<(), TransportError>;

    /// Borrow a dedicated sub-session multiplexed over an open session.
    ///
    /// Only valid when multiplexing was enabled; the caller disconnects the
    /// sub-session when done.
    async fn open_sub_session(&self, parent: &Session) -> Result<Session, TransportError>;

    /// Send a SQL batch on the session.
    async fn send_batch(&self, session: &mut Session, batch: &str)
    -> Result<(), TransportError>;

    /// Issue a native transaction-manager request.
    ///
    /// Returns the server-assigned transaction handle for begin requests.
    async fn send_tm_request(
        &self,
        session: &mut Session,
        request: &TmRequest,
    ) -> Result<Option<TransactionHandle>, TransportError>;
}
