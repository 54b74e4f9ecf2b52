//! # harbor-sandbox
//!
//! The execution context a driven CLI runs in.
//!
//! - [`SandboxProvider`] creates contexts, fresh or from a snapshot
//! - [`Sandbox`] runs captured or detached commands, moves files in and out,
//!   stops, and snapshots
//! - [`LocalSandboxProvider`] backs contexts with directories on the host and
//!   `tokio::process`
//! - [`ScriptedSandboxProvider`] replays prepared output for tests and demos

#![deny(unsafe_code)]

pub mod errors;
pub mod local;
pub mod process;
pub mod scripted;
pub mod traits;
pub mod types;

pub use errors::SandboxError;
pub use local::LocalSandboxProvider;
pub use process::{CommandProcess, ProcessControl, ProcessDriver};
pub use scripted::{ScriptedSandboxProvider, ScriptedTurn};
pub use traits::{Sandbox, SandboxProvider};
pub use types::{
    Command, CommandOutput, SandboxFile, SandboxOptions, SandboxSnapshot, SandboxSource, Signal,
};
