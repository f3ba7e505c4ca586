//! Diagnostics recorded while reconstructing and pricing sessions.
//!
//! Nothing in the pipeline aborts on bad input. Each problem is recorded as an
//! [`Anomaly`] and processing continues with the rest of the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::PowerState;
use crate::session::Validity;
use crate::types::DeviceId;

/// Broad class of an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
    /// One malformed event was skipped.
    Validation,
    /// Orphan OFF, abandoned ON or duplicate event.
    Warning,
    /// A session fell outside policy bounds and was left out of totals.
    OutOfRange,
    /// A device had no registered metadata; defaults were used.
    MissingMetadata,
}

/// A single diagnostic entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// An event could not be validated and was skipped.
    InvalidEvent {
        /// Position of the event in the input batch.
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        reason: String,
    },
    /// An OFF/AUTO_OFF arrived with no open ON for the device.
    OrphanOff {
        device_id: DeviceId,
        state: PowerState,
        timestamp: DateTime<Utc>,
    },
    /// An ON was superseded by a later ON before being closed.
    AbandonedOn {
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
        superseded_at: DateTime<Utc>,
    },
    /// An event with an already-seen identity was ignored.
    DuplicateEvent {
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },
    /// A session was classified `InvalidOrder` or `TooLong`.
    OutOfRangeSession {
        device_id: DeviceId,
        start: DateTime<Utc>,
        duration_minutes: f64,
        validity: Validity,
        ongoing: bool,
    },
    /// The resolver had no metadata for a device.
    MissingMetadata { device_id: DeviceId },
}

impl Anomaly {
    #[must_use]
    pub const fn category(&self) -> AnomalyCategory {
        match self {
            Self::InvalidEvent { .. } => AnomalyCategory::Validation,
            Self::OrphanOff { .. } | Self::AbandonedOn { .. } | Self::DuplicateEvent { .. } => {
                AnomalyCategory::Warning
            }
            Self::OutOfRangeSession { .. } => AnomalyCategory::OutOfRange,
            Self::MissingMetadata { .. } => AnomalyCategory::MissingMetadata,
        }
    }

    /// The device this anomaly concerns, if it could be determined.
    #[must_use]
    pub const fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::InvalidEvent { .. } => None,
            Self::OrphanOff { device_id, .. }
            | Self::AbandonedOn { device_id, .. }
            | Self::DuplicateEvent { device_id, .. }
            | Self::OutOfRangeSession { device_id, .. }
            | Self::MissingMetadata { device_id } => Some(device_id),
        }
    }

    /// The instant this anomaly is anchored at, if it has one.
    ///
    /// Out-of-range sessions are anchored at their start.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::InvalidEvent { .. } | Self::MissingMetadata { .. } => None,
            Self::OrphanOff { timestamp, .. }
            | Self::AbandonedOn { timestamp, .. }
            | Self::DuplicateEvent { timestamp, .. } => Some(*timestamp),
            Self::OutOfRangeSession { start, .. } => Some(*start),
        }
    }

    /// Emits this anomaly as a `tracing` warning.
    pub(crate) fn log(&self) {
        match self {
            Self::InvalidEvent {
                index,
                event_id,
                reason,
            } => tracing::warn!(index, ?event_id, %reason, "skipping invalid event"),
            Self::OrphanOff {
                device_id,
                state,
                timestamp,
            } => tracing::warn!(%device_id, %state, %timestamp, "orphan off event"),
            Self::AbandonedOn {
                device_id,
                timestamp,
                superseded_at,
            } => tracing::warn!(%device_id, %timestamp, %superseded_at, "abandoned on event"),
            Self::DuplicateEvent {
                device_id,
                timestamp,
                event_id,
            } => tracing::warn!(%device_id, %timestamp, ?event_id, "duplicate event ignored"),
            Self::OutOfRangeSession {
                device_id,
                start,
                duration_minutes,
                validity,
                ongoing,
            } => tracing::warn!(
                %device_id,
                %start,
                duration_minutes,
                ?validity,
                ongoing,
                "session excluded from totals"
            ),
            Self::MissingMetadata { device_id } => {
                tracing::warn!(%device_id, "no device metadata, using defaults");
            }
        }
    }
}
