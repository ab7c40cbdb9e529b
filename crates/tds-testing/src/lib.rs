//! # tds-testing
//!
//! Test infrastructure for the TDS connection layer.
//!
//! The centerpiece is [`MockTransport`]: a scripted implementation of the
//! [`Transport`](tds_transport::Transport) trait with a per-attempt outcome
//! queue and an event log. No sockets, no server — tests script exactly the
//! sequence of transport outcomes they need and assert on the recorded
//! activity (target hosts, deadline slices, batches, timing).
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_testing::{LoginScript, MockTransport};
//! use tds_transport::TransportError;
//!
//! let transport = MockTransport::new();
//! transport.push(LoginScript::RefuseOpen(TransportError::Timeout));
//! transport.push(LoginScript::Accept { env: vec![] });
//! // First attempt fails, second succeeds; assert on transport.open_targets().
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock;

pub use mock::{LoginScript, MockTransport, TransportEvent};
