//! Plugwatch CLI library.
//!
//! This crate provides the `pw` command-line interface over `pw-core`:
//! config loading, the JSONL event store and the subcommands.

mod cli;
pub mod commands;
mod config;
pub mod store;

pub use cli::{Cli, Commands, SourceArgs};
pub use config::{Config, ConfiguredDevices, DeviceEntry};
pub use store::{JsonlEventStore, SkippedLine};
