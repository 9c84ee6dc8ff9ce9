//! CLI module for quiesce - command-line interface and subcommands.
//!
//! Provides the entry point for inspecting the effective configuration and
//! running idle waits against a simulated queue.

pub mod commands;
pub mod simulate;

pub use commands::Cli;
