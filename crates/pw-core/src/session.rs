//! Session reconstruction.
//!
//! Pairs each ON transition with the next terminating OFF/AUTO_OFF of the same
//! device and classifies the resulting interval.
//!
//! # Algorithm Summary
//!
//! 1. Validate raw events; a malformed event is recorded and skipped
//! 2. Group by device and sort each device's events by timestamp
//! 3. Walk the events keeping a seen-set (duplicates are ignored) and at most
//!    one open ON per device
//! 4. Close the open ON on OFF/AUTO_OFF; a second ON abandons the first
//! 5. An ON still open at the end becomes an `Ongoing` session measured up to
//!    the supplied evaluation time

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::anomaly::Anomaly;
use crate::config::UsageConfig;
use crate::event::{DeviceEvent, PowerState, RawDeviceEvent};
use crate::types::DeviceId;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalState {
    Off,
    AutoOff,
    /// Still open at the evaluation time.
    Ongoing,
    /// Superseded by a later ON before any OFF arrived.
    Abandoned,
}

/// Classification of a session against policy bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    /// Zero or negative duration.
    InvalidOrder,
    /// Longer than `max_session_minutes`.
    TooLong,
    /// An abandoned ON; always zero length.
    Incomplete,
}

impl Validity {
    /// Classifies a duration against the configured maximum.
    #[must_use]
    pub fn classify(duration_minutes: f64, max_session_minutes: f64) -> Self {
        if duration_minutes <= 0.0 {
            Self::InvalidOrder
        } else if duration_minutes > max_session_minutes {
            Self::TooLong
        } else {
            Self::Valid
        }
    }
}

/// A reconstructed usage interval for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub device_id: DeviceId,
    pub start: DateTime<Utc>,
    /// `None` while the session is ongoing.
    pub end: Option<DateTime<Utc>>,
    pub duration_minutes: f64,
    pub terminal_state: TerminalState,
    pub validity: Validity,
}

impl Session {
    /// Only `Valid` sessions (closed or ongoing) contribute to totals.
    #[must_use]
    pub fn counts_toward_totals(&self) -> bool {
        self.validity == Validity::Valid
    }

    #[must_use]
    pub fn is_ongoing(&self) -> bool {
        self.terminal_state == TerminalState::Ongoing
    }

    /// The closing instant, or `start + duration` for an ongoing session.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end.unwrap_or_else(|| {
            self.start + Duration::milliseconds((self.duration_minutes * 60_000.0).round() as i64)
        })
    }
}

/// Output of [`reconstruct_sessions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconstruction {
    /// All sessions, grouped by ascending device ID, chronological within a device.
    pub sessions: Vec<Session>,
    /// Diagnostics in the order they were found.
    pub anomalies: Vec<Anomaly>,
}

impl Reconstruction {
    /// Sessions still running at the evaluation time, at most one per device.
    pub fn ongoing(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().filter(|s| s.is_ongoing())
    }
}

/// Reconstructs sessions from raw, unordered events.
///
/// `evaluation_time` is the instant treated as "now" for ongoing sessions.
/// It is never sampled internally, so two calls with the same inputs return
/// identical results.
pub fn reconstruct_sessions(
    events: &[RawDeviceEvent],
    config: &UsageConfig,
    evaluation_time: DateTime<Utc>,
) -> Reconstruction {
    let mut anomalies = Vec::new();
    let mut valid = Vec::with_capacity(events.len());

    for (index, raw) in events.iter().enumerate() {
        match raw.validate() {
            Ok(event) => valid.push(event),
            Err(err) => anomalies.push(Anomaly::InvalidEvent {
                index,
                event_id: raw.id.clone(),
                reason: err.to_string(),
            }),
        }
    }

    for anomaly in &anomalies {
        anomaly.log();
    }

    let mut result = reconstruct_validated(valid, config, evaluation_time);
    anomalies.append(&mut result.anomalies);
    result.anomalies = anomalies;
    result
}

/// Reconstructs sessions from already-validated events.
pub fn reconstruct_validated(
    events: Vec<DeviceEvent>,
    config: &UsageConfig,
    evaluation_time: DateTime<Utc>,
) -> Reconstruction {
    let mut by_device: BTreeMap<DeviceId, Vec<DeviceEvent>> = BTreeMap::new();
    for event in events {
        by_device
            .entry(event.device_id.clone())
            .or_default()
            .push(event);
    }

    let groups: Vec<(DeviceId, Vec<DeviceEvent>)> = by_device.into_iter().collect();
    let per_device: Vec<(Vec<Session>, Vec<Anomaly>)> = groups
        .into_par_iter()
        .map(|(device_id, events)| reconstruct_device(&device_id, events, config, evaluation_time))
        .collect();

    let mut result = Reconstruction::default();
    for (mut sessions, mut anomalies) in per_device {
        result.sessions.append(&mut sessions);
        result.anomalies.append(&mut anomalies);
    }

    for anomaly in &result.anomalies {
        anomaly.log();
    }
    tracing::debug!(
        sessions = result.sessions.len(),
        anomalies = result.anomalies.len(),
        "reconstructed sessions"
    );

    result
}

/// Walks one device's events. Never fails.
fn reconstruct_device(
    device_id: &DeviceId,
    mut events: Vec<DeviceEvent>,
    config: &UsageConfig,
    evaluation_time: DateTime<Utc>,
) -> (Vec<Session>, Vec<Anomaly>) {
    // State and key break timestamp ties so input order never matters.
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.state.cmp(&b.state))
            .then_with(|| a.key().cmp(&b.key()))
    });

    let mut seen = HashSet::with_capacity(events.len());
    let mut open_on: Option<DateTime<Utc>> = None;
    let mut sessions = Vec::new();
    let mut anomalies = Vec::new();

    for event in events {
        if !seen.insert(event.key()) {
            anomalies.push(Anomaly::DuplicateEvent {
                device_id: device_id.clone(),
                timestamp: event.timestamp,
                event_id: event.id.as_ref().map(ToString::to_string),
            });
            continue;
        }

        match event.state {
            PowerState::On => {
                if let Some(previous) = open_on.replace(event.timestamp) {
                    sessions.push(Session {
                        device_id: device_id.clone(),
                        start: previous,
                        end: Some(previous),
                        duration_minutes: 0.0,
                        terminal_state: TerminalState::Abandoned,
                        validity: Validity::Incomplete,
                    });
                    anomalies.push(Anomaly::AbandonedOn {
                        device_id: device_id.clone(),
                        timestamp: previous,
                        superseded_at: event.timestamp,
                    });
                }
            }
            PowerState::Off | PowerState::AutoOff => {
                let Some(start) = open_on.take() else {
                    anomalies.push(Anomaly::OrphanOff {
                        device_id: device_id.clone(),
                        state: event.state,
                        timestamp: event.timestamp,
                    });
                    continue;
                };

                let terminal_state = if event.state == PowerState::AutoOff {
                    TerminalState::AutoOff
                } else {
                    TerminalState::Off
                };
                let session = close_session(
                    device_id,
                    start,
                    Some(event.timestamp),
                    minutes_between(start, event.timestamp),
                    terminal_state,
                    config,
                );
                record_out_of_range(&session, &mut anomalies);
                sessions.push(session);
            }
        }
    }

    if let Some(start) = open_on {
        let session = close_session(
            device_id,
            start,
            None,
            minutes_between(start, evaluation_time),
            TerminalState::Ongoing,
            config,
        );
        record_out_of_range(&session, &mut anomalies);
        sessions.push(session);
    }

    (sessions, anomalies)
}

fn close_session(
    device_id: &DeviceId,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    duration_minutes: f64,
    terminal_state: TerminalState,
    config: &UsageConfig,
) -> Session {
    Session {
        device_id: device_id.clone(),
        start,
        end,
        duration_minutes,
        terminal_state,
        validity: Validity::classify(duration_minutes, config.max_session_minutes),
    }
}

fn record_out_of_range(session: &Session, anomalies: &mut Vec<Anomaly>) {
    if matches!(session.validity, Validity::InvalidOrder | Validity::TooLong) {
        anomalies.push(Anomaly::OutOfRangeSession {
            device_id: session.device_id.clone(),
            start: session.start,
            duration_minutes: session.duration_minutes,
            validity: session.validity,
            ongoing: session.is_ongoing(),
        });
    }
}

/// Minutes from `start` to `end`, exact to the millisecond.
#[allow(clippy::cast_precision_loss)]
fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}
