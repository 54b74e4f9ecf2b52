//! # harbor-transport
//!
//! Drives the CLI inside an execution context.
//!
//! - [`Credentials`]: API key or OAuth token, redacted in logs
//! - [`ConnectOptions`] / [`SessionOptions`]: provisioning and per-turn knobs
//! - [`Transport`]: connect (fresh plus install, or from a snapshot), stream
//!   one CLI invocation per turn, snapshot, close

#![deny(unsafe_code)]

mod command;
pub mod credentials;
pub mod options;
pub mod transport;

pub use credentials::Credentials;
pub use options::{ConnectOptions, SessionOptions};
pub use transport::{ConnectionState, MessageStream, Transport};
