//! # Storage Layer
//!
//! File-backed inputs for the `procflow` CLI.
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Graph snapshot | JSON `{ nodes, edges }` | any path given on the command line |
//! | Project config | TOML | `procflow.toml` beside the snapshot, or `--config` |
//! | Global config | TOML | platform config dir, `config.toml` |
//!
//! Snapshot reads take a shared `fs2` lock. Writes are atomic (locked
//! temp file + rename).

mod config;
mod snapshot;

pub use config::{
    Config, ConfigError, GlobalConfig, OutputConfig, OutputFormat, ProjectConfig,
    PROJECT_CONFIG_FILE,
};
pub use snapshot::{GraphSnapshot, SnapshotError, SnapshotStore};
