//! Tunable assumptions for session classification and cost accounting.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Configuration shared by every stage of the usage pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Sessions longer than this are tagged `TooLong` and left out of totals.
    /// Default: 4320 (72 hours).
    pub max_session_minutes: f64,

    /// Wattage assumed for devices the resolver does not know. Default: 60 W.
    pub default_wattage: f64,

    /// Price per kWh assumed for devices without one. Default: 7.50.
    pub default_unit_price: f64,

    /// Hours of runtime assumed saved by each auto-off. Default: 2.1.
    pub avg_hours_saved_per_auto_off: f64,

    /// Offset from UTC, in minutes, that defines civil day boundaries.
    /// Default: 0.
    pub utc_offset_minutes: i32,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            max_session_minutes: 4320.0,
            default_wattage: 60.0,
            default_unit_price: 7.50,
            avg_hours_saved_per_auto_off: 2.1,
            utc_offset_minutes: 0,
        }
    }
}

impl UsageConfig {
    /// Replaces non-finite or negative values with their defaults.
    #[must_use]
    pub fn validated(self) -> Self {
        let defaults = Self::default();
        let pick = |name: &str, value: f64, fallback: f64| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                tracing::warn!(option = name, value, fallback, "ignoring invalid usage option");
                fallback
            }
        };

        let utc_offset_minutes = if self.utc_offset_minutes.abs() < 24 * 60 {
            self.utc_offset_minutes
        } else {
            tracing::warn!(
                value = self.utc_offset_minutes,
                "ignoring out-of-range utc offset"
            );
            defaults.utc_offset_minutes
        };

        Self {
            max_session_minutes: pick(
                "max_session_minutes",
                self.max_session_minutes,
                defaults.max_session_minutes,
            ),
            default_wattage: pick(
                "default_wattage",
                self.default_wattage,
                defaults.default_wattage,
            ),
            default_unit_price: pick(
                "default_unit_price",
                self.default_unit_price,
                defaults.default_unit_price,
            ),
            avg_hours_saved_per_auto_off: pick(
                "avg_hours_saved_per_auto_off",
                self.avg_hours_saved_per_auto_off,
                defaults.avg_hours_saved_per_auto_off,
            ),
            utc_offset_minutes,
        }
    }

    /// The fixed offset used to turn instants into civil dates.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}
