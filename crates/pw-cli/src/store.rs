//! JSONL-backed event store.
//!
//! One JSON object per line: `{"id": ..., "device_id": ..., "state": ..., "timestamp": ...}`.
//! `created_at` and `event_time` are accepted in place of `timestamp`.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pw_core::store::in_window;
use pw_core::{DeviceId, EventStore, RawDeviceEvent};

/// A line that could not be parsed as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line: usize,
    pub error: String,
}

/// Events read from a JSONL file.
///
/// The file is read once when opened. Lines that are not valid JSON objects
/// are skipped and remembered; a readable file never fails to load.
#[derive(Debug)]
pub struct JsonlEventStore {
    path: PathBuf,
    events: Vec<RawDeviceEvent>,
    skipped: Vec<SkippedLine>,
}

impl JsonlEventStore {
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read events from {}", path.display()))?;
        Ok(Self::parse(path, &content))
    }

    fn parse(path: &Path, content: &str) -> Self {
        let mut events = Vec::new();
        let mut skipped = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawDeviceEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(path = %path.display(), line = index + 1, error = %e, "skipping malformed event line");
                    skipped.push(SkippedLine {
                        line: index + 1,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(path = %path.display(), events = events.len(), skipped = skipped.len(), "loaded events");
        Self {
            path: path.to_path_buf(),
            events,
            skipped,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn skipped(&self) -> &[SkippedLine] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventStore for JsonlEventStore {
    type Error = Infallible;

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
