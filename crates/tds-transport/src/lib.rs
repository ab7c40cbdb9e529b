//! # tds-transport
//!
//! Transport collaborator boundary for the TDS connection layer.
//!
//! This crate defines the seam between the connection-establishment state
//! machine (`tds-connect`) and the wire-level packet layer: the [`Transport`]
//! trait, the opaque per-connection [`Session`], and the shared protocol
//! vocabulary both sides speak ([`TdsVersion`], [`LoginRecord`],
//! [`EnvChange`], [`Deadline`], [`ServerInfo`]).
//!
//! No I/O happens here. Concrete transports (a real TDS packet codec, or the
//! scripted mock in `tds-testing`) implement [`Transport`]; everything above
//! this crate treats packet framing, encryption negotiation, and login-record
//! wire layout as a black box.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod deadline;
pub mod env;
pub mod error;
pub mod login;
pub mod server_info;
pub mod session;
pub mod tm;
pub mod transport;
pub mod version;

pub use deadline::Deadline;
pub use env::EnvChange;
pub use error::{AuthError, AuthErrorKind, TransportError};
pub use login::{Credentials, LoginAck, LoginRecord};
pub use server_info::ServerInfo;
pub use session::{Session, TransactionHandle};
pub use tm::{TdsIsolation, TmRequest, TmRequestKind};
pub use transport::{EncryptionOptions, Transport};
pub use version::TdsVersion;
