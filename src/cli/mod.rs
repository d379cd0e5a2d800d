//! Command-line interface for codeloop.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
