//! Estimated savings from automatic switch-offs.
//!
//! Each AUTO_OFF is assumed to have saved a fixed number of hours of runtime.
//! That is an assumption, not a measurement, so results carry an explicit
//! `basis` tag and are never folded into measured totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cost::CostModel;
use crate::session::{Session, TerminalState};
use crate::types::DeviceId;

/// How a figure was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SavingsBasis {
    #[default]
    Estimate,
}

/// Estimated savings for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySaving {
    pub device_id: DeviceId,
    pub device_name: String,
    pub total_auto_offs: usize,
    pub energy_saved_kwh: f64,
    pub cost_saved: f64,
}

/// Savings across devices together with the assumption behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsEstimate {
    pub basis: SavingsBasis,
    pub avg_hours_saved_per_event: f64,
    pub rows: Vec<EnergySaving>,
    pub total_auto_offs: usize,
    pub total_energy_saved_kwh: f64,
    pub total_cost_saved: f64,
}

impl SavingsEstimate {
    /// An estimate with no rows.
    #[must_use]
    pub const fn empty(avg_hours_saved_per_event: f64) -> Self {
        Self {
            basis: SavingsBasis::Estimate,
            avg_hours_saved_per_event,
            rows: Vec::new(),
            total_auto_offs: 0,
            total_energy_saved_kwh: 0.0,
            total_cost_saved: 0.0,
        }
    }
}

/// Estimates savings from sessions terminated by AUTO_OFF.
///
/// Every such session counts, whatever its validity: the automation fired
/// even if the session itself is excluded from runtime totals. Rows are
/// ordered by device.
#[allow(clippy::cast_precision_loss)]
pub fn estimate_savings<'s>(
    sessions: impl IntoIterator<Item = &'s Session>,
    cost: &CostModel<'_>,
    avg_hours_saved_per_event: f64,
) -> SavingsEstimate {
    let mut counts: BTreeMap<&DeviceId, usize> = BTreeMap::new();
    for session in sessions {
        if session.terminal_state == TerminalState::AutoOff {
            *counts.entry(&session.device_id).or_default() += 1;
        }
    }

    let mut estimate = SavingsEstimate::empty(avg_hours_saved_per_event);
    for (device_id, total_auto_offs) in counts {
        let profile = cost.resolve(device_id).profile;
        let energy_saved_kwh =
            total_auto_offs as f64 * avg_hours_saved_per_event * profile.wattage_watts / 1000.0;
        let cost_saved = CostModel::cost(energy_saved_kwh, profile.unit_price);

        estimate.total_auto_offs += total_auto_offs;
        estimate.total_energy_saved_kwh += energy_saved_kwh;
        estimate.total_cost_saved += cost_saved;
        estimate.rows.push(EnergySaving {
            device_id: device_id.clone(),
            device_name: profile.name,
            total_auto_offs,
            energy_saved_kwh,
            cost_saved,
        });
    }

    tracing::debug!(
        devices = estimate.rows.len(),
        auto_offs = estimate.total_auto_offs,
        "estimated auto-off savings"
    );
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UsageConfig;
    use crate::cost::{DeviceProfile, NoDevices};
    use crate::event::RawDeviceEvent;
    use crate::session::reconstruct_sessions;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashMap;

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

    fn hundred_watt_lamp() -> HashMap<String, DeviceProfile> {
        let mut devices = HashMap::new();
        devices.insert(
            "lamp".to_string(),
            DeviceProfile {
                name: "Desk Lamp".into(),
                wattage_watts: 100.0,
                unit_price: 7.50,
            },
        );
        devices
    }

    #[test]
    fn one_auto_off_at_hundred_watts() {
        let config = UsageConfig::default();
        let result = reconstruct_sessions(
            &[ev("lamp", "ON", 0), ev("lamp", "AUTO_OFF", 40)],
            &config,
            ts(60),
        );
        let devices = hundred_watt_lamp();
        let cost = CostModel::new(&devices, &config);

        let estimate = estimate_savings(&result.sessions, &cost, 2.1);

        assert_eq!(estimate.basis, SavingsBasis::Estimate);
        assert_eq!(estimate.rows.len(), 1);
        let row = &estimate.rows[0];
        assert_eq!(row.device_name, "Desk Lamp");
        assert_eq!(row.total_auto_offs, 1);
        assert!((row.energy_saved_kwh - 0.21).abs() < 1e-12);
        assert!((row.cost_saved - 1.575).abs() < 1e-12);
        assert!((estimate.total_energy_saved_kwh - 0.21).abs() < 1e-12);
    }

    #[test]
    fn manual_offs_and_ongoing_sessions_save_nothing() {
        let config = UsageConfig::default();
        let result = reconstruct_sessions(
            &[ev("A", "ON", 0), ev("A", "OFF", 10), ev("B", "ON", 0)],
            &config,
            ts(60),
        );
        let resolver = NoDevices;
        let cost = CostModel::new(&resolver, &config);

        let estimate = estimate_savings(&result.sessions, &cost, 2.1);
        assert!(estimate.rows.is_empty());
        assert_eq!(estimate.total_auto_offs, 0);
        assert!(estimate.total_cost_saved.abs() < f64::EPSILON);
    }

    #[test]
    fn orphan_auto_off_is_not_counted() {
        let config = UsageConfig::default();
        let result = reconstruct_sessions(&[ev("A", "AUTO_OFF", 10)], &config, ts(60));
        let resolver = NoDevices;
        let cost = CostModel::new(&resolver, &config);

        assert!(estimate_savings(&result.sessions, &cost, 2.1).rows.is_empty());
    }

    #[test]
    fn counts_per_device_with_default_wattage() {
        let config = UsageConfig::default();
        let result = reconstruct_sessions(
            &[
                ev("A", "ON", 0),
                ev("A", "AUTO_OFF", 10),
                ev("A", "ON", 20),
                ev("A", "AUTO_OFF", 30),
                ev("B", "ON", 0),
                ev("B", "AUTO_OFF", 5),
            ],
            &config,
            ts(60),
        );
        let resolver = NoDevices;
        let cost = CostModel::new(&resolver, &config);

        let estimate = estimate_savings(&result.sessions, &cost, 2.1);
        assert_eq!(estimate.total_auto_offs, 3);
        assert_eq!(estimate.rows[0].total_auto_offs, 2);
        // 2 * 2.1 h * 60 W
        assert!((estimate.rows[0].energy_saved_kwh - 0.252).abs() < 1e-12);
        assert!((estimate.total_energy_saved_kwh - 0.378).abs() < 1e-12);
    }

    #[test]
    fn estimate_serializes_its_basis() {
        let json = serde_json::to_value(SavingsEstimate::empty(2.1)).unwrap();
        assert_eq!(json["basis"], "estimate");
        assert_eq!(json["avg_hours_saved_per_event"], 2.1);
    }
}
