//! Command-line interface for note-forge.
//!
//! Provides commands for managing the topic queue, reviewing outlines,
//! running the pipeline and inspecting stored notes.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
