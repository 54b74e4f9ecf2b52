//! # harbor-stream
//!
//! Turns the raw stdout of a driven CLI process into typed messages.
//!
//! - **NDJSON parsing**: [`NdjsonCodec`] reassembles lines split across reads,
//!   skips blank lines, and flushes an unterminated final line
//! - **Enrichment**: [`enrich_message`] gates values on the closed message type
//!   set, fills missing identity fields, and applies per-type defaults
//! - **Live streams**: [`enrich_stream`] combines both under a
//!   [`LineErrorPolicy`](harbor_core::LineErrorPolicy)
//! - **Diagnostics**: [`StderrDrain`] collects a secondary stream concurrently

#![deny(unsafe_code)]

pub mod enrich;
pub mod errors;
pub mod ndjson;

pub use enrich::{enrich_message, enrich_stream};
pub use errors::StreamError;
pub use ndjson::{
    NdjsonCodec, StderrDrain, parse_ndjson_reader, parse_ndjson_str, parse_ndjson_stream,
    parse_process_output,
};
