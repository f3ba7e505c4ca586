//! Energy and cost accounting.
//!
//! `kWh = wattage / 1000 * minutes / 60` and `cost = kWh * unit_price`.
//! Values keep full precision; rounding belongs to presentation.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

use crate::aggregate::{DailyRuntime, DeviceUsage};
use crate::config::UsageConfig;
use crate::period::PeriodKey;
use crate::types::DeviceId;

/// Registered metadata for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub wattage_watts: f64,
    pub unit_price: f64,
}

/// Looks up device metadata. Absence is not an error: the cost model falls
/// back to configured defaults.
pub trait DeviceResolver {
    fn resolve_device(&self, device_id: &DeviceId) -> Option<DeviceProfile>;
}

impl<S: BuildHasher> DeviceResolver for HashMap<String, DeviceProfile, S> {
    fn resolve_device(&self, device_id: &DeviceId) -> Option<DeviceProfile> {
        self.get(device_id.as_str()).cloned()
    }
}

impl DeviceResolver for BTreeMap<String, DeviceProfile> {
    fn resolve_device(&self, device_id: &DeviceId) -> Option<DeviceProfile> {
        self.get(device_id.as_str()).cloned()
    }
}

/// A resolver that knows no devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevices;

impl DeviceResolver for NoDevices {
    fn resolve_device(&self, _device_id: &DeviceId) -> Option<DeviceProfile> {
        None
    }
}

/// A resolved profile and whether it came from defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProfile {
    pub profile: DeviceProfile,
    pub is_fallback: bool,
}

/// Converts runtime into energy and cost.
#[derive(Clone, Copy)]
pub struct CostModel<'a> {
    resolver: &'a dyn DeviceResolver,
    default_wattage: f64,
    default_unit_price: f64,
}

impl std::fmt::Debug for CostModel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostModel")
            .field("default_wattage", &self.default_wattage)
            .field("default_unit_price", &self.default_unit_price)
            .finish_non_exhaustive()
    }
}

impl<'a> CostModel<'a> {
    pub fn new(resolver: &'a dyn DeviceResolver, config: &UsageConfig) -> Self {
        Self {
            resolver,
            default_wattage: config.default_wattage,
            default_unit_price: config.default_unit_price,
        }
    }

    /// Resolves a device, substituting defaults when it is unregistered.
    pub fn resolve(&self, device_id: &DeviceId) -> ResolvedProfile {
        self.resolver.resolve_device(device_id).map_or_else(
            || ResolvedProfile {
                profile: DeviceProfile {
                    name: device_id.to_string(),
                    wattage_watts: self.default_wattage,
                    unit_price: self.default_unit_price,
                },
                is_fallback: true,
            },
            |profile| ResolvedProfile {
                profile,
                is_fallback: false,
            },
        )
    }

    /// Energy in kWh for `duration_minutes` at `wattage_watts`.
    #[must_use]
    pub fn energy_kwh(wattage_watts: f64, duration_minutes: f64) -> f64 {
        (wattage_watts / 1000.0) * (duration_minutes / 60.0)
    }

    /// Cost of `kwh` at `unit_price`.
    #[must_use]
    pub fn cost(kwh: f64, unit_price: f64) -> f64 {
        kwh * unit_price
    }

    /// Prices day rows, producing `DeviceUsage` in the same order.
    pub fn price_daily(&self, daily: &[DailyRuntime]) -> Vec<DeviceUsage> {
        let mut profiles: BTreeMap<&DeviceId, DeviceProfile> = BTreeMap::new();

        daily
            .iter()
            .map(|row| {
                let profile = profiles
                    .entry(&row.device_id)
                    .or_insert_with(|| self.resolve(&row.device_id).profile);
                let kwh = Self::energy_kwh(profile.wattage_watts, row.total_duration_minutes);
                DeviceUsage {
                    device_id: row.device_id.clone(),
                    device_name: profile.name.clone(),
                    period: PeriodKey::Day(row.date),
                    total_duration_minutes: row.total_duration_minutes,
                    session_count: row.session_count,
                    on_events_count: row.on_events_count,
                    auto_off_count: row.auto_off_count,
                    total_units_kwh: kwh,
                    total_cost: Self::cost(kwh, profile.unit_price),
                    last_used: row.last_used,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn runtime(device: &str, minutes: f64) -> DailyRuntime {
        DailyRuntime {
            device_id: DeviceId::new(device).unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            total_duration_minutes: minutes,
            session_count: 1,
            on_events_count: 1,
            auto_off_count: 0,
            last_used: None,
        }
    }

    #[test]
    fn forty_five_minutes_at_sixty_watts() {
        let kwh = CostModel::energy_kwh(60.0, 45.0);
        assert!((kwh - 0.045).abs() < 1e-12);
        assert!((CostModel::cost(kwh, 7.50) - 0.3375).abs() < 1e-12);
    }

    #[test]
    fn unknown_device_uses_defaults() {
        let resolver = NoDevices;
        let model = CostModel::new(&resolver, &UsageConfig::default());

        let resolved = model.resolve(&DeviceId::new("garage").unwrap());
        assert!(resolved.is_fallback);
        assert_eq!(resolved.profile.name, "garage");
        assert!((resolved.profile.wattage_watts - 60.0).abs() < f64::EPSILON);
        assert!((resolved.profile.unit_price - 7.50).abs() < f64::EPSILON);
    }

    #[test]
    fn registered_device_uses_its_profile() {
        let mut devices = HashMap::new();
        devices.insert(
            "ac_living_001".to_string(),
            DeviceProfile {
                name: "Living Room AC".into(),
                wattage_watts: 1800.0,
                unit_price: 8.0,
            },
        );
        let model = CostModel::new(&devices, &UsageConfig::default());

        let rows = model.price_daily(&[runtime("ac_living_001", 90.0), runtime("other", 60.0)]);
        assert_eq!(rows[0].device_name, "Living Room AC");
        // 1.8 kW * 1.5 h
        assert!((rows[0].total_units_kwh - 2.7).abs() < 1e-12);
        assert!((rows[0].total_cost - 21.6).abs() < 1e-9);

        assert_eq!(rows[1].device_name, "other");
        assert!((rows[1].total_units_kwh - 0.06).abs() < 1e-12);
    }

    #[test]
    fn no_rounding_before_presentation() {
        let resolver = NoDevices;
        let model = CostModel::new(&resolver, &UsageConfig::default());
        let rows = model.price_daily(&[runtime("A", 1.0)]);
        // 60 W for one minute
        assert!((rows[0].total_units_kwh - 0.001).abs() < 1e-15);
        assert!((rows[0].total_cost - 0.0075).abs() < 1e-15);
    }
}
