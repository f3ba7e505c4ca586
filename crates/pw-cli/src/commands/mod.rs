//! CLI subcommand implementations.

pub mod demo;
pub mod report;
pub mod sessions;
pub mod util;
