//! Sessions command: reconstructed sessions and anomalies for a window.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pw_core::{Anomaly, DeviceId, EventStore, Reconstruction, Session, TerminalState, Validity, reconstruct_sessions};

use crate::Config;
use crate::commands::util::{format_duration, open_store};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Fetches events in `[from, to)` and reconstructs their sessions.
pub fn list_sessions<S>(
    store: &S,
    config: &Config,
    device: Option<&str>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Reconstruction>
where
    S: EventStore,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    if from >= to {
        anyhow::bail!("--from ({from}) must be before --to ({to})");
    }
    let device_id = device
        .map(DeviceId::new)
        .transpose()
        .context("invalid --device")?;

    let events = store.get_events(device_id.as_ref(), from, to)?;
    tracing::debug!(events = events.len(), %from, %to, "fetched events for sessions");

    let usage = config.usage.clone().validated();
    Ok(reconstruct_sessions(&events, &usage, now))
}

const fn ended_label(state: TerminalState) -> &'static str {
    match state {
        TerminalState::Off => "off",
        TerminalState::AutoOff => "auto-off",
        TerminalState::Ongoing => "running",
        TerminalState::Abandoned => "abandoned",
    }
}

const fn validity_label(validity: Validity) -> &'static str {
    match validity {
        Validity::Valid => "valid",
        Validity::InvalidOrder => "invalid order",
        Validity::TooLong => "too long",
        Validity::Incomplete => "incomplete",
    }
}

fn format_session(session: &Session) -> String {
    let end = session.end.map_or_else(
        || "(running)".to_string(),
        |end| end.format(TIME_FORMAT).to_string(),
    );
    format!(
        "{:<20}{:<18}{:<18}{:>8}  {:<10}{}",
        session.device_id.as_str(),
        session.start.format(TIME_FORMAT),
        end,
        format_duration(session.duration_minutes),
        ended_label(session.terminal_state),
        validity_label(session.validity)
    )
}

/// One-line description of an anomaly.
pub fn describe_anomaly(anomaly: &Anomaly) -> String {
    match anomaly {
        Anomaly::InvalidEvent {
            index,
            event_id,
            reason,
        } => match event_id {
            Some(id) => format!("event #{index} ({id}) skipped: {reason}"),
            None => format!("event #{index} skipped: {reason}"),
        },
        Anomaly::OrphanOff {
            device_id,
            state,
            timestamp,
        } => format!(
            "{device_id}: {state} at {} with no open ON",
            timestamp.format(TIME_FORMAT)
        ),
        Anomaly::AbandonedOn {
            device_id,
            timestamp,
            superseded_at,
        } => format!(
            "{device_id}: ON at {} superseded by ON at {}",
            timestamp.format(TIME_FORMAT),
            superseded_at.format(TIME_FORMAT)
        ),
        Anomaly::DuplicateEvent {
            device_id,
            timestamp,
            ..
        } => format!(
            "{device_id}: duplicate event at {} ignored",
            timestamp.format(TIME_FORMAT)
        ),
        Anomaly::OutOfRangeSession {
            device_id,
            start,
            duration_minutes,
            validity,
            ..
        } => format!(
            "{device_id}: session from {} ({}) excluded, {}",
            start.format(TIME_FORMAT),
            format_duration(*duration_minutes),
            validity_label(*validity)
        ),
        Anomaly::MissingMetadata { device_id } => {
            format!("{device_id}: not registered, using default wattage and price")
        }
    }
}

/// Formats sessions as a table followed by any anomalies.
pub fn format_sessions(reconstruction: &Reconstruction) -> String {
    let mut output = String::new();

    if reconstruction.sessions.is_empty() {
        writeln!(output, "No sessions in this window.").unwrap();
    } else {
        writeln!(
            output,
            "{:<20}{:<18}{:<18}{:>8}  {:<10}VALIDITY",
            "DEVICE", "START", "END", "DURATION", "ENDED"
        )
        .unwrap();
        for session in &reconstruction.sessions {
            writeln!(output, "{}", format_session(session)).unwrap();
        }
    }

    if !reconstruction.anomalies.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "ANOMALIES ({})", reconstruction.anomalies.len()).unwrap();
        for anomaly in &reconstruction.anomalies {
            writeln!(output, "  {}", describe_anomaly(anomaly)).unwrap();
        }
    }

    output
}

/// Runs the sessions command.
#[allow(clippy::too_many_arguments)]
pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    events_path: Option<&Path>,
    device: Option<&str>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let store = open_store(config, events_path)?;
    let reconstruction = list_sessions(&store, config, device, from, to, now)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&reconstruction)?)?;
    } else {
        write!(writer, "{}", format_sessions(&reconstruction))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pw_core::{MemoryEventStore, RawDeviceEvent};

    fn ev(id: &str, device: &str, state: &str, timestamp: &str) -> RawDeviceEvent {
        RawDeviceEvent {
            id: Some(id.to_string()),
            device_id: device.to_string(),
            state: state.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, h, m, 0).unwrap()
    }

    fn store() -> MemoryEventStore {
        MemoryEventStore::new(vec![
            ev("1", "lamp", "ON", "2025-01-15T09:00:00Z"),
            ev("2", "lamp", "ON", "2025-01-15T10:00:00Z"),
            ev("3", "lamp", "AUTO_OFF", "2025-01-15T10:30:00Z"),
            ev("3", "lamp", "AUTO_OFF", "2025-01-15T10:30:00Z"),
            ev("4", "fan", "OFF", "2025-01-15T07:00:00Z"),
            ev("5", "fan", "ON", "2025-01-15T11:00:00Z"),
        ])
    }

    #[test]
    fn test_lists_sessions_and_anomalies() {
        let reconstruction = list_sessions(
            &store(),
            &Config::default(),
            None,
            at(15, 0, 0),
            at(16, 0, 0),
            at(15, 12, 0),
        )
        .unwrap();

        assert_eq!(reconstruction.sessions.len(), 3);
        assert_eq!(reconstruction.anomalies.len(), 3);

        let output = format_sessions(&reconstruction);
        assert!(output.starts_with("DEVICE"));
        assert!(output.contains("fan                 2025-01-15 11:00  (running)            1h 0m  running   valid"));
        assert!(output.contains("lamp                2025-01-15 10:00  2025-01-15 10:30       30m  auto-off  valid"));
        assert!(output.contains("lamp                2025-01-15 09:00  2025-01-15 09:00        0m  abandoned incomplete"));
        assert!(output.contains("ANOMALIES (3)"));
        assert!(output.contains("fan: OFF at 2025-01-15 07:00 with no open ON"));
        assert!(output.contains("lamp: ON at 2025-01-15 09:00 superseded by ON at 2025-01-15 10:00"));
        assert!(output.contains("lamp: duplicate event at 2025-01-15 10:30 ignored"));
    }

    #[test]
    fn test_device_filter() {
        let reconstruction = list_sessions(
            &store(),
            &Config::default(),
            Some("fan"),
            at(15, 0, 0),
            at(16, 0, 0),
            at(15, 12, 0),
        )
        .unwrap();
        assert_eq!(reconstruction.sessions.len(), 1);
        assert!(reconstruction.sessions[0].is_ongoing());
        assert!(
            reconstruction
                .anomalies
                .iter()
                .all(|a| a.device_id().map(DeviceId::as_str) == Some("fan"))
        );
    }

    #[test]
    fn test_empty_window() {
        let reconstruction = list_sessions(
            &store(),
            &Config::default(),
            None,
            at(1, 0, 0),
            at(2, 0, 0),
            at(15, 12, 0),
        )
        .unwrap();
        assert_eq!(format_sessions(&reconstruction), "No sessions in this window.\n");
    }

    #[test]
    fn test_rejects_inverted_window_and_bad_device() {
        let config = Config::default();
        assert!(list_sessions(&store(), &config, None, at(16, 0, 0), at(15, 0, 0), at(15, 12, 0)).is_err());
        assert!(list_sessions(&store(), &config, Some("  "), at(15, 0, 0), at(16, 0, 0), at(15, 12, 0)).is_err());
    }

    #[test]
    fn test_describe_missing_metadata() {
        let anomaly = Anomaly::MissingMetadata {
            device_id: DeviceId::new("kettle").unwrap(),
        };
        assert_eq!(
            describe_anomaly(&anomaly),
            "kettle: not registered, using default wattage and price"
        );
    }
}
