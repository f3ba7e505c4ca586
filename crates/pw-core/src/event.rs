//! Device power-state events as they arrive from the event store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, EventId, ValidationError};

/// A power-state transition reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PowerState {
    On,
    Off,
    /// Switched off by an automation rule rather than by hand.
    AutoOff,
}

impl PowerState {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::AutoOff => "AUTO_OFF",
        }
    }

    /// Returns true for `OFF` and `AUTO_OFF`.
    #[must_use]
    pub const fn is_off(self) -> bool {
        matches!(self, Self::Off | Self::AutoOff)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            "AUTO_OFF" | "AUTO-OFF" | "AUTOOFF" => Ok(Self::AutoOff),
            _ => Err(ValidationError::UnknownPowerState {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for PowerState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PowerState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A validated device event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    pub device_id: DeviceId,
    pub state: PowerState,
    pub timestamp: DateTime<Utc>,
}

impl DeviceEvent {
    /// Identity used for de-duplication: the `id` when present, otherwise
    /// the `(device_id, timestamp)` pair.
    #[must_use]
    pub fn key(&self) -> EventKey {
        self.id.as_ref().map_or_else(
            || EventKey::DeviceTime(self.device_id.clone(), self.timestamp),
            |id| EventKey::Id(id.clone()),
        )
    }
}

/// Identity of an event for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKey {
    Id(EventId),
    DeviceTime(DeviceId, DateTime<Utc>),
}

/// An event exactly as supplied by an event store, before validation.
///
/// Fields default to empty so that a record missing a field surfaces as a
/// [`ValidationError`] for that one event instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDeviceEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, alias = "created_at", alias = "event_time")]
    pub timestamp: String,
}

impl RawDeviceEvent {
    /// Validates the raw record into a [`DeviceEvent`].
    pub fn validate(&self) -> Result<DeviceEvent, ValidationError> {
        let device_id = DeviceId::new(self.device_id.clone())?;
        let state: PowerState = self.state.parse()?;
        let timestamp = parse_timestamp(&self.timestamp)?;
        let id = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(EventId::new)
            .transpose()?;

        Ok(DeviceEvent {
            id,
            device_id,
            state,
            timestamp,
        })
    }
}

impl From<&DeviceEvent> for RawDeviceEvent {
    fn from(event: &DeviceEvent) -> Self {
        Self {
            id: event.id.as_ref().map(ToString::to_string),
            device_id: event.device_id.to_string(),
            state: event.state.to_string(),
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Parses an RFC 3339 timestamp. Timestamps without an offset are read as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidTimestamp {
            value: s.to_string(),
        })
}
