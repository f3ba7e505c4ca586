//! Demo command: seeded synthetic events for trying out reports.

use std::io::Write;

use anyhow::{Context, Result};
use pw_core::DateRange;
use pw_core::demo::{DemoFleet, generate_events};

use crate::commands::util::parse_date;

/// Writes the generated events for `from..=to` as JSON lines.
pub fn run<W: Write>(writer: &mut W, seed: u64, from: &str, to: &str) -> Result<()> {
    let range = DateRange::new(parse_date(from)?, parse_date(to)?)
        .context("--from must not be after --to")?;
    let fleet = DemoFleet::household();

    for event in generate_events(seed, range, &fleet) {
        writeln!(writer, "{}", serde_json::to_string(&event)?)?;
    }

    Ok(())
}

/// Writes the demo fleet as config TOML so generated logs get real names
/// and wattages.
pub fn print_devices<W: Write>(writer: &mut W) -> Result<()> {
    let fleet = DemoFleet::household();

    writeln!(writer, "[usage]")?;
    writeln!(writer, "default_unit_price = {:.2}", fleet.unit_price)?;
    for device in &fleet.devices {
        writeln!(writer)?;
        writeln!(writer, "[devices.{}]", device.id)?;
        writeln!(writer, "name = {:?}", device.name)?;
        writeln!(writer, "wattage = {:.1}", device.wattage_watts)?;
    }

    Ok(())
}
