use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pw_cli::commands::util::parse_datetime;
use pw_cli::commands::{demo, report, sessions};
use pw_cli::{Cli, Commands, Config, SourceArgs};

/// Load config, optionally from an explicit file.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Resolves `--now` against the wall clock sampled at startup.
fn evaluation_time(source: &SourceArgs, wall_clock: DateTime<Utc>) -> Result<DateTime<Utc>> {
    source
        .now
        .as_deref()
        .map_or(Ok(wall_clock), |s| parse_datetime(s, wall_clock))
        .context("invalid --now")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let wall_clock = Utc::now();

    // Initialize tracing with verbose flag support; stdout is reserved for output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let stdout = std::io::stdout();

    match &cli.command {
        Some(Commands::Report {
            month,
            day,
            calendar,
            source,
            json,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let now = evaluation_time(source, wall_clock)?;
            let offset = config.usage.clone().validated().offset();
            let range = report::resolve_range(month.as_deref(), day.as_deref(), now, offset)?;
            let request = pw_core::ReportRequest::new(range).with_calendar(*calendar);
            report::run(
                &mut stdout.lock(),
                &config,
                source.events.as_deref(),
                &request,
                now,
                *json,
            )?;
        }
        Some(Commands::Sessions {
            device,
            from,
            to,
            source,
            json,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let now = evaluation_time(source, wall_clock)?;
            let from = match from {
                Some(s) => parse_datetime(s, now).context("invalid --from")?,
                None => now - Duration::days(7),
            };
            let to = match to {
                Some(s) => parse_datetime(s, now).context("invalid --to")?,
                None => now,
            };
            sessions::run(
                &mut stdout.lock(),
                &config,
                source.events.as_deref(),
                device.as_deref(),
                from,
                to,
                now,
                *json,
            )?;
        }
        Some(Commands::Demo {
            seed,
            from,
            to,
            print_devices,
        }) => {
            // Demo doesn't need config - output is fully determined by the seed
            if *print_devices {
                demo::print_devices(&mut stdout.lock())?;
            } else if let (Some(from), Some(to)) = (from, to) {
                demo::run(&mut stdout.lock(), *seed, from, to)?;
            }
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
