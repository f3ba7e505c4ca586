//! Seeded demo data.
//!
//! [`generate_events`] is a pure function of `(seed, range, fleet)`: the same
//! inputs always produce the same events. Callers that want a live feed run
//! it on their own schedule.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cost::{DeviceProfile, DeviceResolver};
use crate::event::{PowerState, RawDeviceEvent};
use crate::period::DateRange;
use crate::types::DeviceId;

/// Broad appliance category; drives usage patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Light,
    Fan,
    Ac,
    Tv,
    Heater,
    Other,
}

impl DeviceKind {
    /// UTC hour at which a session starts.
    fn start_hour(self, rng: &mut impl Rng) -> u32 {
        match self {
            Self::Light if rng.gen_bool(0.3) => rng.gen_range(6..9),
            Self::Light => rng.gen_range(17..23),
            Self::Ac if rng.gen_bool(0.7) => rng.gen_range(11..16),
            Self::Ac => rng.gen_range(21..24),
            Self::Tv => rng.gen_range(18..23),
            Self::Fan => rng.gen_range(8..23),
            Self::Heater if rng.gen_bool(0.6) => rng.gen_range(5..9),
            Self::Heater => rng.gen_range(18..21),
            Self::Other => rng.gen_range(6..23),
        }
    }

    fn duration_minutes(self, start_hour: u32, rng: &mut impl Rng) -> i64 {
        match self {
            Self::Light => {
                let minutes = rng.gen_range(15..480);
                // daytime lights are short
                if (9..=17).contains(&start_hour) {
                    minutes.min(90)
                } else {
                    minutes
                }
            }
            Self::Ac => rng.gen_range(30..360),
            Self::Tv => rng.gen_range(30..240),
            Self::Fan => rng.gen_range(60..480),
            Self::Heater => rng.gen_range(10..45),
            Self::Other => rng.gen_range(20..180),
        }
    }

    /// Probability that a session of this shape ends with AUTO_OFF.
    fn auto_off_probability(self, start_hour: u32, duration_minutes: i64) -> f64 {
        match self {
            Self::Light if (9..=15).contains(&start_hour) && duration_minutes > 60 => 0.7,
            Self::Light if start_hour <= 6 && duration_minutes > 240 => 0.8,
            Self::Light if duration_minutes > 360 => 0.6,
            Self::Ac if duration_minutes > 240 => 0.5,
            Self::Fan if duration_minutes > 360 => 0.4,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoDevice {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub wattage_watts: f64,
}

impl DemoDevice {
    fn new(id: &str, name: &str, kind: DeviceKind, wattage_watts: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            wattage_watts,
        }
    }
}

/// A set of demo devices sharing one tariff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoFleet {
    pub devices: Vec<DemoDevice>,
    pub unit_price: f64,
}

impl DemoFleet {
    /// Sixteen appliances of a typical household.
    #[must_use]
    pub fn household() -> Self {
        use DeviceKind::{Ac, Fan, Heater, Light, Other, Tv};

        Self {
            devices: vec![
                DemoDevice::new("living_light_001", "Living Room Light", Light, 12.0),
                DemoDevice::new("kitchen_light_001", "Kitchen Light", Light, 9.0),
                DemoDevice::new("porch_light_001", "Porch Light", Light, 15.0),
                DemoDevice::new("bedroom_lamp_001", "Bedroom Lamp", Light, 8.0),
                DemoDevice::new("bathroom_light_001", "Bathroom Light", Light, 10.0),
                DemoDevice::new("study_light_001", "Study Light", Light, 14.0),
                DemoDevice::new("garage_light_001", "Garage Light", Light, 18.0),
                DemoDevice::new("bedroom_fan_001", "Bedroom Fan", Fan, 75.0),
                DemoDevice::new("living_fan_001", "Living Room Fan", Fan, 70.0),
                DemoDevice::new("ac_bedroom_001", "Bedroom AC", Ac, 1500.0),
                DemoDevice::new("ac_living_001", "Living Room AC", Ac, 1800.0),
                DemoDevice::new("tv_hall_001", "Hall TV", Tv, 120.0),
                DemoDevice::new("tv_bedroom_001", "Bedroom TV", Tv, 95.0),
                DemoDevice::new("water_heater_001", "Water Heater", Heater, 2000.0),
                DemoDevice::new("washing_machine_001", "Washing Machine", Other, 500.0),
                DemoDevice::new("refrigerator_001", "Refrigerator", Other, 150.0),
            ],
            unit_price: 7.50,
        }
    }

    fn get(&self, id: &str) -> Option<&DemoDevice> {
        self.devices.iter().find(|d| d.id == id)
    }
}

impl DeviceResolver for DemoFleet {
    fn resolve_device(&self, device_id: &DeviceId) -> Option<DeviceProfile> {
        self.get(device_id.as_str()).map(|device| DeviceProfile {
            name: device.name.clone(),
            wattage_watts: device.wattage_watts,
            unit_price: self.unit_price,
        })
    }
}

/// Number of ON/OFF pairs generated for `date`.
///
/// Summer and winter months are busier, weekends quieter.
fn sessions_on(date: NaiveDate, rng: &mut impl Rng) -> u32 {
    let base: u32 = match date.month() {
        6..=8 => 35,
        11 | 12 | 1 | 2 => 30,
        _ => 25,
    };
    let events = if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        base * 4 / 5 + rng.gen_range(0..10)
    } else {
        base + rng.gen_range(0..15)
    };
    events / 2
}

type Generated = (DateTime<Utc>, u64, RawDeviceEvent);

/// Generates demo events for every day of `range`.
///
/// Events are sorted by timestamp and carry IDs `demo-<n>` in generation
/// order. Events after the end of the range are dropped, so a session
/// crossing the final midnight is left open.
pub fn generate_events(seed: u64, range: DateRange, fleet: &DemoFleet) -> Vec<RawDeviceEvent> {
    if fleet.devices.is_empty() {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let window_end = range.end_exclusive().and_time(chrono::NaiveTime::MIN).and_utc();
    let mut next_id: u64 = 1;
    let mut events: Vec<Generated> = Vec::new();
    let mut push = |events: &mut Vec<Generated>,
                    device: &DemoDevice,
                    state: PowerState,
                    at: DateTime<Utc>| {
        if at < window_end {
            events.push((
                at,
                next_id,
                RawDeviceEvent {
                    id: Some(format!("demo-{next_id}")),
                    device_id: device.id.clone(),
                    state: state.to_string(),
                    timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
                },
            ));
        }
        next_id += 1;
    };

    for date in range.days() {
        for _ in 0..sessions_on(date, &mut rng) {
            let device = &fleet.devices[rng.gen_range(0..fleet.devices.len())];
            let hour = device.kind.start_hour(&mut rng);
            let minute = rng.gen_range(0..60);
            let second = rng.gen_range(0..60);
            let Some(start) = date.and_hms_opt(hour, minute, second) else {
                continue;
            };
            let start = start.and_utc();

            let duration = device.kind.duration_minutes(hour, &mut rng);
            let probability = device.kind.auto_off_probability(hour, duration);
            let closing = if probability > 0.0 && rng.gen_bool(probability) {
                PowerState::AutoOff
            } else {
                PowerState::Off
            };

            push(&mut events, device, PowerState::On, start);
            push(
                &mut events,
                device,
                closing,
                start + chrono::Duration::minutes(duration),
            );
        }
    }

    events.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    tracing::debug!(seed, events = events.len(), range = %range.label(), "generated demo events");
    events.into_iter().map(|(_, _, event)| event).collect()
}
