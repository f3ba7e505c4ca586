//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Smart plug usage reports.
///
/// Reconstructs usage sessions from ON / OFF / AUTO_OFF event logs and
/// reports runtime, energy, cost and estimated auto-off savings.
#[derive(Debug, Parser)]
#[command(name = "pw", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where events come from and which instant counts as "now".
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Event log to read (defaults to `events_path` from the config).
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Evaluation time for running sessions (RFC 3339 or e.g. '2 hours ago').
    #[arg(long)]
    pub now: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show runtime, energy, cost and estimated savings.
    Report {
        /// Month to report (YYYY-MM). Defaults to the current month.
        #[arg(long, conflicts_with = "day")]
        month: Option<String>,

        /// Single day to report (YYYY-MM-DD).
        #[arg(long)]
        day: Option<String>,

        /// Include days without usage.
        #[arg(long)]
        calendar: bool,

        #[command(flatten)]
        source: SourceArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List reconstructed sessions and anomalies.
    Sessions {
        /// Only this device.
        #[arg(long)]
        device: Option<String>,

        /// Start of the window (defaults to one week before now).
        #[arg(long)]
        from: Option<String>,

        /// End of the window, exclusive (defaults to now).
        #[arg(long)]
        to: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print seeded demo events as JSONL.
    Demo {
        /// Random seed; the same seed always yields the same events.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// First day to generate (YYYY-MM-DD).
        #[arg(long, required_unless_present = "print_devices")]
        from: Option<String>,

        /// Last day to generate, inclusive (YYYY-MM-DD).
        #[arg(long, required_unless_present = "print_devices")]
        to: Option<String>,

        /// Print the demo fleet as a config `[devices]` table instead.
        #[arg(long)]
        print_devices: bool,
    },
}
