//! # tds-connect
//!
//! Client-side TDS connection establishment, mirrored-server failover, and
//! pooled-connection lifecycle.
//!
//! This crate implements the timed, retrying, dual-target login protocol a
//! TDS client runs before a session exists, and the lifecycle a pool drives
//! once one does. The wire-level packet layer stays behind the
//! [`Transport`](tds_transport::Transport) trait from `tds-transport`.
//!
//! ## Features
//!
//! - **Single-target retry**: exponential backoff (100ms doubling, pinned at
//!   1s) under a hard deadline derived from the connect timeout
//! - **Mirrored-server failover**: alternating dual-target attempts with
//!   multiplicatively growing per-round timeout slices, including mid-loop
//!   adoption of a server-reported partner
//! - **Transaction dispatch**: native transaction-manager requests on modern
//!   protocol versions, SQL-batch emulation on legacy ones, with the
//!   delegated-transaction open-results guard
//! - **Pooling hooks**: activate/deactivate/dispose via the
//!   [`BackendConnection`] capability trait, reset-on-reuse, and
//!   environment-change ingestion
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tds_connect::{ConnectionConfig, TdsConnection};
//!
//! let config = ConnectionConfig::new("db01", "sa", "secret")
//!     .failover_partner("db02")
//!     .database("orders")
//!     .connect_timeout_secs(30);
//!
//! let mut connection = TdsConnection::new(Arc::new(transport), config)?;
//! connection.open().await?;
//! assert_eq!(connection.current_data_source(), Some("db01"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod ambient;
mod attempt;
pub mod config;
pub mod connection;
pub mod error;
mod failover;
pub mod lifecycle;
pub mod pool_group;
pub mod registry;
pub mod transaction;

pub use ambient::{AmbientTransactions, DelegatedTransaction, DistributedTransaction};
pub use config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PACKET_SIZE};
pub use connection::TdsConnection;
pub use error::{Error, Result};
pub use lifecycle::{BackendConnection, LifecycleState};
pub use pool_group::{FailoverSide, PoolGroup};
pub use registry::{CommandToken, PreparedCommandRegistry};
pub use transaction::{IsolationLevel, TransactionRequest};
