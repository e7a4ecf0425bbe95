//! Command-line interface
//!
//! Argument parsing and per-command handlers for the `signalrig` binary.

pub mod args;
pub mod commands;
