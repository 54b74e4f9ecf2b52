//! # harbor-runtime
//!
//! Multi-turn orchestration of a CLI running inside an execution context.
//!
//! - [`query`]: connect, run setup, stream turns, dispatch tool calls found
//!   in assistant text, and tear down under the configured snapshot policy
//! - [`QueryOptions`]: tools, turn budget, setup, hooks, snapshot mode
//! - [`History`]: the role-labelled transcript replayed on later turns
//! - [`extract_tool_requests`]: fenced and inline JSON tool-call extraction
//! - [`collect_messages`] / [`query_text`]: drain a run

#![deny(unsafe_code)]

pub mod collect;
pub mod extract;
pub mod history;
pub mod hooks;
pub mod options;
pub mod query;
mod run;
pub mod setup;
pub mod snapshot;
pub mod state;

pub use collect::{collect_messages, final_text, query_text};
pub use extract::{ToolRequest, extract_tool_requests};
pub use history::{History, HistoryEntry, Role};
pub use hooks::{
    ErrorSummary, HookError, Hooks, RunOutcome, SandboxScope, SetupErrorHook, SetupHook,
    TeardownHook,
};
pub use options::QueryOptions;
pub use query::{QueryHandle, query};
pub use setup::{GitClone, SetupOptions};
pub use snapshot::{SnapshotCallback, SnapshotLedger, SnapshotMode, SnapshotOptions};
pub use state::QueryState;
