//! Shared utilities for CLI commands.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use pw_core::DateRange;
use regex::Regex;

use crate::Config;
use crate::store::JsonlEventStore;

/// Opens the event log, preferring `--events` over the configured path.
///
/// Malformed lines are reported on stderr but do not stop the command.
pub fn open_store(config: &Config, events_path: Option<&Path>) -> anyhow::Result<JsonlEventStore> {
    let path = events_path.unwrap_or(&config.events_path);
    let store = JsonlEventStore::open(path)?;
    if !store.skipped().is_empty() {
        eprintln!(
            "Warning: skipped {} malformed line(s) in {}",
            store.skipped().len(),
            path.display()
        );
    }
    Ok(store)
}

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").expect("relative time pattern is valid")
});

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string as either an absolute timestamp or a time relative to `now`.
///
/// Supports:
/// - RFC 3339: "2025-01-15T10:30:00Z"
/// - Naive UTC: "2025-01-15 10:30:00"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = pw_core::event::parse_timestamp(s) {
        return Ok(dt);
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s.trim()) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use RFC 3339 (e.g., 2025-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {s}. Expected YYYY-MM-DD"))
}

/// Parse a `YYYY-MM` month into the range of its days.
pub fn parse_month(s: &str) -> anyhow::Result<DateRange> {
    let invalid = || format!("Invalid month: {s}. Expected YYYY-MM");
    let (year, month) = s.trim().split_once('-').with_context(invalid)?;
    let year: i32 = year.parse().with_context(invalid)?;
    let month: u32 = month.parse().with_context(invalid)?;
    DateRange::month(year, month).with_context(invalid)
}

/// Formats minutes as "Xh Ym" if >= 1 hour, "Xm" otherwise.
///
/// Fractional minutes are floored; negative values render as 0m.
#[allow(clippy::cast_possible_truncation)]
pub fn format_duration(minutes: f64) -> String {
    if !minutes.is_finite() || minutes < 0.0 {
        return "0m".to_string();
    }
    let total_minutes = minutes.floor() as i64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
