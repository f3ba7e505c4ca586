//! Event source abstraction.

use chrono::{DateTime, Utc};

use crate::event::{RawDeviceEvent, parse_timestamp};
use crate::types::DeviceId;

/// Supplies device events for a time window.
///
/// Windows are half-open: `start <= timestamp < end`. Order is not
/// guaranteed. Events whose timestamp cannot be parsed are still returned so
/// that validation can report them.
pub trait EventStore {
    /// Error raised when the backing source cannot be read.
    type Error;

    fn get_events(
        &self,
        device_id: Option<&DeviceId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawDeviceEvent>, Self::Error>;
}

/// Whether `event` belongs in the window for `device_id`.
#[must_use]
pub fn in_window(
    event: &RawDeviceEvent,
    device_id: Option<&DeviceId>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    if device_id.is_some_and(|id| id.as_str() != event.device_id.trim()) {
        return false;
    }
    parse_timestamp(&event.timestamp).map_or(true, |ts| start <= ts && ts < end)
}

/// An event store over a vector held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    events: Vec<RawDeviceEvent>,
}

impl MemoryEventStore {
    #[must_use]
    pub const fn new(events: Vec<RawDeviceEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: RawDeviceEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventStore for MemoryEventStore {
    type Error = std::convert::Infallible;

    fn get_events(
        &self,
        device_id: Option<&DeviceId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawDeviceEvent>, Self::Error> {
        Ok(self
            .events
            .iter()
            .filter(|event| in_window(event, device_id, start, end))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::minutes(minutes)
    }

    fn ev(device: &str, state: &str, minutes: i64) -> RawDeviceEvent {
        RawDeviceEvent {
            id: None,
            device_id: device.to_string(),
            state: state.to_string(),
            timestamp: ts(minutes).to_rfc3339(),
        }
    }

    fn store() -> MemoryEventStore {
        let mut store = MemoryEventStore::new(vec![
            ev("A", "ON", 0),
            ev("A", "OFF", 30),
            ev("B", "ON", 10),
        ]);
        store.push(ev("B", "OFF", 60));
        store
    }

    #[test]
    fn window_is_half_open() {
        let events = store().get_events(None, ts(10), ts(60)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.timestamp != ts(60).to_rfc3339()));
    }

    #[test]
    fn filters_by_device() {
        let b = DeviceId::new("B").unwrap();
        let events = store().get_events(Some(&b), ts(0), ts(120)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.device_id == "B"));
    }

    #[test]
    fn padded_device_ids_match_the_same_device() {
        let mut store = store();
        store.push(ev(" B ", "ON", 90));
        let b = DeviceId::new("B").unwrap();

        let events = store.get_events(Some(&b), ts(0), ts(120)).unwrap();
        assert_eq!(events.len(), 3);

        let reconstruction =
            crate::reconstruct_sessions(&events, &crate::UsageConfig::default(), ts(120));
        assert!(reconstruction.sessions.iter().all(|s| s.device_id == b));
        assert_eq!(reconstruction.sessions.len(), 2);
    }

    #[test]
    fn unparseable_timestamps_are_passed_through() {
        let mut store = store();
        store.push(RawDeviceEvent {
            timestamp: "yesterday".into(),
            ..ev("A", "ON", 0)
        });
        assert_eq!(store.len(), 5);

        let events = store.get_events(None, ts(500), ts(600)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, "yesterday");
    }
}
