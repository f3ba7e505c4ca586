//! Report command for usage, cost and savings.
//!
//! This module implements `pw report` for a month (`--month`, default the
//! current month) or a single day (`--day`), in human-readable or JSON form.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc};
use pw_core::{DateRange, EventStore, ReportRequest, UsageConfig, UsageReport, reconstruct_and_aggregate};

use crate::Config;
use crate::commands::util::{format_duration, open_store, parse_date, parse_month};

// ========== Period Selection ==========

/// Picks the reported range from `--month` / `--day`, defaulting to the
/// month containing `now` in the configured offset.
pub fn resolve_range(
    month: Option<&str>,
    day: Option<&str>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<DateRange> {
    if let Some(day) = day {
        return Ok(DateRange::day(parse_date(day)?));
    }
    if let Some(month) = month {
        return parse_month(month);
    }
    let today = now.with_timezone(&offset).date_naive();
    Ok(DateRange::month(today.year(), today.month())?)
}

/// Instant window of events needed for `range` as seen at `now`.
///
/// Widened by the maximum session length on both sides so that sessions
/// crossing the range boundaries still find both of their events. The end
/// never falls before `now`, so a device switched off since then is not
/// mistaken for a running one. Bounds saturate at the representable range.
#[allow(clippy::cast_possible_truncation)]
pub fn event_window(
    range: DateRange,
    usage: &UsageConfig,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = Duration::minutes(i64::from(usage.utc_offset_minutes));
    let margin = Duration::try_minutes(usage.max_session_minutes.ceil() as i64).unwrap_or(Duration::MAX);

    let start = (range.start.and_time(NaiveTime::MIN).and_utc() - offset)
        .checked_sub_signed(margin)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let end = (range.end_exclusive().and_time(NaiveTime::MIN).and_utc() - offset)
        .checked_add_signed(margin)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end.max(now))
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn progress_bar(value: f64, max: f64) -> String {
    if max <= 0.0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value / max;
    let filled = if ratio < 0.05 && value > 0.0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

// ========== Report Generation ==========

/// Fetches events around `request.range` and builds the report.
pub fn generate_report<S>(
    store: &S,
    config: &Config,
    request: &ReportRequest,
    now: DateTime<Utc>,
) -> Result<UsageReport>
where
    S: EventStore,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let usage = config.usage.clone().validated();
    let (start, end) = event_window(request.range, &usage, now);
    let events = store.get_events(None, start, end)?;
    tracing::debug!(events = events.len(), %start, %end, "fetched events for report");

    Ok(reconstruct_and_aggregate(
        &events,
        &usage,
        &config.resolver(),
        now,
        request,
    ))
}

/// Formats the human-readable report output.
pub fn format_report(report: &UsageReport) -> String {
    let stats = report.monthly_stats.rounded();
    let mut output = String::new();

    writeln!(output, "USAGE REPORT: {}", stats.label).unwrap();
    writeln!(
        output,
        "Evaluated at {}",
        report.evaluation_time.format("%Y-%m-%d %H:%M UTC")
    )
    .unwrap();

    if stats.total_records == 0 {
        writeln!(output).unwrap();
        writeln!(output, "No usage recorded for this period.").unwrap();
        if !report.anomalies.is_empty() {
            writeln!(output, "{} anomalies found.", report.anomalies.len()).unwrap();
        }
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'pw sessions' to inspect raw events.").unwrap();
        return output;
    }

    // DAILY section
    writeln!(output).unwrap();
    writeln!(output, "DAILY").unwrap();
    writeln!(output, "─────").unwrap();
    let max_cost = stats
        .daily_summaries
        .iter()
        .map(|d| d.total_cost)
        .fold(0.0, f64::max);
    for day in &stats.daily_summaries {
        writeln!(
            output,
            "{}  {:>7}  {:>7.3} kWh  {:>7.2}  {}",
            day.date,
            format_duration(day.total_duration_minutes),
            day.total_units_kwh,
            day.total_cost,
            progress_bar(day.total_cost, max_cost)
        )
        .unwrap();
    }

    // DEVICES section
    writeln!(output).unwrap();
    writeln!(output, "DEVICES").unwrap();
    writeln!(output, "───────").unwrap();
    for device in &stats.device_totals {
        writeln!(
            output,
            "{:<20}{:>7}  {:>3} sessions  {:>7.3} kWh  {:>7.2}",
            device.device_name,
            format_duration(device.total_duration_minutes),
            device.session_count,
            device.total_units_kwh,
            device.total_cost
        )
        .unwrap();
    }

    if !report.running.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "RUNNING NOW").unwrap();
        writeln!(output, "───────────").unwrap();
        for session in &report.running {
            writeln!(
                output,
                "{:<20}since {} ({})",
                session.device_id.as_str(),
                session.start.format("%Y-%m-%d %H:%M"),
                format_duration(session.duration_minutes)
            )
            .unwrap();
        }
    }

    // SAVINGS section, kept apart from measured figures
    let savings = &stats.energy_savings;
    writeln!(output).unwrap();
    writeln!(
        output,
        "SAVINGS (estimate, {} h per auto-off)",
        savings.avg_hours_saved_per_event
    )
    .unwrap();
    writeln!(output, "───────").unwrap();
    if savings.rows.is_empty() {
        writeln!(output, "(no auto-offs)").unwrap();
    }
    for row in &savings.rows {
        writeln!(
            output,
            "{:<20}{:>3} auto-offs  {:>7.3} kWh  {:>7.2}",
            row.device_name, row.total_auto_offs, row.energy_saved_kwh, row.cost_saved
        )
        .unwrap();
    }

    // SUMMARY section
    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(output, "───────").unwrap();
    writeln!(
        output,
        "Total runtime:   {}",
        format_duration(stats.total_duration_minutes)
    )
    .unwrap();
    writeln!(output, "Energy:          {:.3} kWh", stats.total_units_kwh).unwrap();
    writeln!(output, "Cost:            {:.2}", stats.total_cost).unwrap();
    writeln!(output, "Days with usage: {}", stats.days_with_usage).unwrap();
    writeln!(
        output,
        "Sessions:        {} ({} ON events)",
        stats.total_sessions, stats.total_on_events
    )
    .unwrap();
    writeln!(
        output,
        "Est. savings:    {:.3} kWh, {:.2}",
        savings.total_energy_saved_kwh, savings.total_cost_saved
    )
    .unwrap();
    writeln!(output, "Anomalies:       {}", report.anomalies.len()).unwrap();
    if !report.anomalies.is_empty() {
        writeln!(output, "  Tip: Run 'pw sessions' to see details").unwrap();
    }

    output
}

// ========== JSON Output ==========

/// Formats the report as JSON with presentation rounding applied.
pub fn format_report_json(report: &UsageReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(&report.rounded())?)
}

// ========== Public Interface ==========

/// Runs the report command.
pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    events_path: Option<&Path>,
    request: &ReportRequest,
    now: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let store = open_store(config, events_path)?;
    let report = generate_report(&store, config, request, now)?;

    if json {
        writeln!(writer, "{}", format_report_json(&report)?)?;
    } else {
        write!(writer, "{}", format_report(&report))?;
    }

    Ok(())
}
