//! Dump engine: id generation and per-database dump execution.

pub mod naming;
pub mod runner;

pub use naming::{dump_filename, dump_id, parse_dump_filename, ParsedDumpName};
pub use runner::{dump_all, resolve_databases};
