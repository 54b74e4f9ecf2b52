//! # harbor-core
//!
//! Foundation types, errors, IDs, and logging for the Harbor sandbox agent.
//!
//! This crate provides the shared vocabulary that all other Harbor crates depend on:
//!
//! - **IDs**: `MessageId`, `SessionId`, `SnapshotId` newtypes plus pure
//!   generators that take an explicit entropy source
//! - **Messages**: the closed `Message` union streamed out of a sandboxed CLI run
//! - **Content blocks**: `ContentBlock` covering text, thinking, tool use/results
//! - **Snapshots**: `SnapshotRecord` with its fixed expiry window
//! - **Errors**: `HarborError` taxonomy via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod content;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod policy;
pub mod snapshot;
pub mod text;

pub use errors::{ErrorKind, HarborError, Result, SetupStep};
pub use ids::{MessageId, SessionId, SnapshotId};
pub use messages::{Message, MessageBase, MessageType};
pub use policy::LineErrorPolicy;
pub use snapshot::SnapshotRecord;
