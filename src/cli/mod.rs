//! # Command-Line Interface
//!
//! The `procflow` binary: load a graph snapshot, propagate, report.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `check <graph>` | Re-derive cascades for stored statuses, list cycles |
//! | `status <graph> <node> <status>` | Apply one change, show what propagated (`--write` saves) |
//! | `report <graph>` | Metrics, critical path, bottlenecks, recommendations |
//! | `ready <graph>` | Nodes whose predecessors are all fulfilled |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Without the flag the format comes from configuration, then `text`.
//!
//! ## Logging
//!
//! Logs go to stderr. `PROCFLOW_LOG` takes an `EnvFilter` directive,
//! `PROCFLOW_LOG_FORMAT=json` emits JSON lines. `--verbose` raises the
//! default level to debug and prints progress notes.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod propagate;
mod query;

pub use app::{init_tracing, run, Cli, Commands};
pub use output::{Output, OutputFormat};
