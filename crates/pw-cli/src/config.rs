//! Configuration loading and management.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pw_core::{DeviceId, DeviceProfile, DeviceResolver, UsageConfig};
use serde::{Deserialize, Serialize};

/// A device registered in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    /// Rated power draw in watts.
    pub wattage: f64,
    /// Price per kWh; `usage.default_unit_price` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the JSONL event log.
    pub events_path: PathBuf,

    /// Session bounds, cost defaults and day boundaries.
    #[serde(default)]
    pub usage: UsageConfig,

    /// Registered devices keyed by device ID.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("events_path", &self.events_path)
            .field("usage", &self.usage)
            .field("devices", &self.devices.len())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            events_path: data_dir.join("events.jsonl"),
            usage: UsageConfig::default(),
            devices: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PW_*, nested keys split on `__`)
        figment = figment.merge(Env::prefixed("PW_").split("__"));

        figment.extract()
    }

    /// Device lookup backed by the `devices` table.
    ///
    /// Defaults come from the validated `usage` section.
    pub fn resolver(&self) -> ConfiguredDevices<'_> {
        let usage = self.usage.clone().validated();
        ConfiguredDevices {
            devices: &self.devices,
            default_wattage: usage.default_wattage,
            default_unit_price: usage.default_unit_price,
        }
    }
}

/// Resolves devices from the config file.
///
/// A negative or non-finite `wattage` or `unit_price` on an entry is
/// replaced by the configured default.
#[derive(Debug, Clone, Copy)]
pub struct ConfiguredDevices<'a> {
    devices: &'a BTreeMap<String, DeviceEntry>,
    default_wattage: f64,
    default_unit_price: f64,
}

fn usable(device_id: &DeviceId, option: &str, value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        tracing::warn!(%device_id, option, value, fallback, "ignoring invalid device option");
        fallback
    }
}

impl DeviceResolver for ConfiguredDevices<'_> {
    fn resolve_device(&self, device_id: &DeviceId) -> Option<DeviceProfile> {
        self.devices
            .get(device_id.as_str())
            .map(|entry| DeviceProfile {
                name: entry.name.clone(),
                wattage_watts: usable(device_id, "wattage", entry.wattage, self.default_wattage),
                unit_price: entry.unit_price.map_or(self.default_unit_price, |price| {
                    usable(device_id, "unit_price", price, self.default_unit_price)
                }),
            })
    }
}

/// Returns the platform-specific config directory for pw.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("plugwatch"))
}

/// Returns the platform-specific data directory for pw.
///
/// On Linux: `~/.local/share/plugwatch`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("plugwatch"))
}
