//! Report assembly.
//!
//! Turns priced day rows into per-date summaries and range-level statistics.
//! Range totals are sums of the day summaries they contain; rounding happens
//! only in the `rounded()` presentation copies.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{DeviceUsage, roll_up_range};
use crate::period::{DateRange, PeriodKey};
use crate::savings::{EnergySaving, SavingsEstimate};

/// All devices for one civil date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_duration_minutes: f64,
    pub total_units_kwh: f64,
    pub total_cost: f64,
    pub total_sessions: usize,
    pub total_on_events: usize,
    /// Sorted by device ID.
    pub devices: Vec<DeviceUsage>,
}

impl DailySummary {
    /// Placeholder for a date without usage.
    #[must_use]
    pub const fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_duration_minutes: 0.0,
            total_units_kwh: 0.0,
            total_cost: 0.0,
            total_sessions: 0,
            total_on_events: 0,
            devices: Vec::new(),
        }
    }

    /// Copy with kWh rounded to 3 decimals and cost to 2.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            total_units_kwh: round_kwh(self.total_units_kwh),
            total_cost: round_cost(self.total_cost),
            devices: self.devices.iter().map(round_usage).collect(),
            ..self.clone()
        }
    }
}

/// Totals across a date range, usually one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    /// `YYYY-MM` for a calendar month, otherwise the range.
    pub label: String,
    pub range: DateRange,
    /// Device-day rows that went into the totals.
    pub total_records: usize,
    pub total_sessions: usize,
    pub total_on_events: usize,
    pub total_duration_minutes: f64,
    pub total_units_kwh: f64,
    pub total_cost: f64,
    pub days_with_usage: usize,
    /// Ascending by date.
    pub daily_summaries: Vec<DailySummary>,
    pub device_totals: Vec<DeviceUsage>,
    pub energy_savings: SavingsEstimate,
}

impl MonthlyStats {
    /// Copy with every kWh figure rounded to 3 decimals and cost to 2.
    #[must_use]
    pub fn rounded(&self) -> Self {
        let savings = &self.energy_savings;
        Self {
            label: self.label.clone(),
            range: self.range,
            total_records: self.total_records,
            total_sessions: self.total_sessions,
            total_on_events: self.total_on_events,
            total_duration_minutes: self.total_duration_minutes,
            total_units_kwh: round_kwh(self.total_units_kwh),
            total_cost: round_cost(self.total_cost),
            days_with_usage: self.days_with_usage,
            daily_summaries: self.daily_summaries.iter().map(DailySummary::rounded).collect(),
            device_totals: self.device_totals.iter().map(round_usage).collect(),
            energy_savings: SavingsEstimate {
                rows: savings
                    .rows
                    .iter()
                    .map(|row| EnergySaving {
                        energy_saved_kwh: round_kwh(row.energy_saved_kwh),
                        cost_saved: round_cost(row.cost_saved),
                        ..row.clone()
                    })
                    .collect(),
                total_energy_saved_kwh: round_kwh(savings.total_energy_saved_kwh),
                total_cost_saved: round_cost(savings.total_cost_saved),
                ..savings.clone()
            },
        }
    }
}

/// A date that had measurable usage, for calendar highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageDay {
    pub date: NaiveDate,
    /// Rounded to 2 decimals.
    pub total_runtime_hours: f64,
    /// Rounded to 2 decimals.
    pub total_cost: f64,
}

/// Groups priced day rows into one summary per date, ascending.
///
/// Rows that are not day rows are ignored. Dates without rows are absent.
pub fn build_daily_summaries(daily: &[DeviceUsage]) -> Vec<DailySummary> {
    let mut by_date: BTreeMap<NaiveDate, DailySummary> = BTreeMap::new();

    for row in daily {
        let PeriodKey::Day(date) = row.period else {
            continue;
        };
        let summary = by_date
            .entry(date)
            .or_insert_with(|| DailySummary::empty(date));
        summary.total_duration_minutes += row.total_duration_minutes;
        summary.total_units_kwh += row.total_units_kwh;
        summary.total_cost += row.total_cost;
        summary.total_sessions += row.session_count;
        summary.total_on_events += row.on_events_count;
        summary.devices.push(row.clone());
    }

    by_date
        .into_values()
        .map(|mut summary| {
            summary.devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
            summary
        })
        .collect()
}

/// Inserts an empty summary for every date of `range` that has none.
///
/// Summaries outside the range are dropped.
pub fn fill_calendar(summaries: Vec<DailySummary>, range: DateRange) -> Vec<DailySummary> {
    let mut by_date: BTreeMap<NaiveDate, DailySummary> = summaries
        .into_iter()
        .filter(|s| range.contains(s.date))
        .map(|s| (s.date, s))
        .collect();

    range
        .days()
        .map(|date| {
            by_date
                .remove(&date)
                .unwrap_or_else(|| DailySummary::empty(date))
        })
        .collect()
}

/// Builds statistics for `range` from priced day rows.
///
/// With `calendar_complete` every date of the range gets a summary; the
/// placeholders add nothing to the totals.
pub fn build_monthly_stats(
    range: DateRange,
    daily: &[DeviceUsage],
    energy_savings: SavingsEstimate,
    calendar_complete: bool,
) -> MonthlyStats {
    let inside: Vec<DeviceUsage> = daily
        .iter()
        .filter(|row| matches!(row.period, PeriodKey::Day(date) if range.contains(date)))
        .cloned()
        .collect();

    let mut daily_summaries = build_daily_summaries(&inside);
    if calendar_complete {
        daily_summaries = fill_calendar(daily_summaries, range);
    }

    let mut stats = MonthlyStats {
        label: range.label(),
        range,
        total_records: inside.len(),
        total_sessions: 0,
        total_on_events: 0,
        total_duration_minutes: 0.0,
        total_units_kwh: 0.0,
        total_cost: 0.0,
        days_with_usage: 0,
        daily_summaries: Vec::new(),
        device_totals: roll_up_range(&inside, range),
        energy_savings,
    };
    for day in &daily_summaries {
        stats.total_sessions += day.total_sessions;
        stats.total_on_events += day.total_on_events;
        stats.total_duration_minutes += day.total_duration_minutes;
        stats.total_units_kwh += day.total_units_kwh;
        stats.total_cost += day.total_cost;
        if day.total_duration_minutes > 0.0 {
            stats.days_with_usage += 1;
        }
    }
    stats.daily_summaries = daily_summaries;
    stats
}

/// Dates with usage, with runtime in hours.
pub fn usage_days(stats: &MonthlyStats) -> Vec<UsageDay> {
    stats
        .daily_summaries
        .iter()
        .filter(|day| day.total_duration_minutes > 0.0)
        .map(|day| UsageDay {
            date: day.date,
            total_runtime_hours: round_cost(day.total_duration_minutes / 60.0),
            total_cost: round_cost(day.total_cost),
        })
        .collect()
}

/// Rounds to 3 decimals.
#[must_use]
pub fn round_kwh(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Rounds to 2 decimals.
#[must_use]
pub fn round_cost(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_usage(row: &DeviceUsage) -> DeviceUsage {
    DeviceUsage {
        total_units_kwh: round_kwh(row.total_units_kwh),
        total_cost: round_cost(row.total_cost),
        ..row.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceId;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn row(device: &str, day: u32, minutes: f64) -> DeviceUsage {
        // 60 W at 7.50 per kWh
        let kwh = minutes / 1000.0;
        DeviceUsage {
            device_id: DeviceId::new(device).unwrap(),
            device_name: device.to_string(),
            period: PeriodKey::Day(date(day)),
            total_duration_minutes: minutes,
            session_count: 1,
            on_events_count: 2,
            auto_off_count: 0,
            total_units_kwh: kwh,
            total_cost: kwh * 7.5,
            last_used: None,
        }
    }

    #[test]
    fn summaries_group_by_date_and_sort_devices() {
        let rows = vec![row("tv", 2, 30.0), row("fan", 2, 10.0), row("tv", 1, 45.0)];
        let summaries = build_daily_summaries(&rows);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].date, date(1));
        let second = &summaries[1];
        assert!((second.total_duration_minutes - 40.0).abs() < f64::EPSILON);
        assert_eq!(second.total_sessions, 2);
        assert_eq!(second.total_on_events, 4);
        let ids: Vec<&str> = second.devices.iter().map(|d| d.device_id.as_str()).collect();
        assert_eq!(ids, vec!["fan", "tv"]);
    }

    #[test]
    fn absent_days_are_absent_unless_calendar_requested() {
        let range = DateRange::new(date(1), date(4)).unwrap();
        let rows = vec![row("tv", 2, 30.0)];

        let sparse = build_monthly_stats(range, &rows, SavingsEstimate::empty(2.1), false);
        assert_eq!(sparse.daily_summaries.len(), 1);

        let full = build_monthly_stats(range, &rows, SavingsEstimate::empty(2.1), true);
        let dates: Vec<NaiveDate> = full.daily_summaries.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date(1), date(2), date(3), date(4)]);
        assert_eq!(full.daily_summaries[0], DailySummary::empty(date(1)));
        assert_eq!(full.days_with_usage, 1);
        assert_eq!(full.total_duration_minutes.to_bits(), sparse.total_duration_minutes.to_bits());
    }

    #[test]
    fn range_totals_are_sums_of_day_totals() {
        let range = DateRange::month(2025, 1).unwrap();
        let rows = vec![
            row("tv", 1, 45.0),
            row("fan", 1, 17.0),
            row("tv", 9, 33.0),
            row("tv", 31, 91.0),
        ];
        let stats = build_monthly_stats(range, &rows, SavingsEstimate::empty(2.1), false);

        assert_eq!(stats.label, "2025-01");
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.total_sessions, 4);
        assert_eq!(stats.days_with_usage, 3);

        let day_cost: f64 = stats.daily_summaries.iter().map(|d| d.total_cost).sum();
        let day_kwh: f64 = stats.daily_summaries.iter().map(|d| d.total_units_kwh).sum();
        assert_eq!(stats.total_cost.to_bits(), day_cost.to_bits());
        assert_eq!(stats.total_units_kwh.to_bits(), day_kwh.to_bits());

        assert_eq!(stats.device_totals.len(), 2);
        let tv = &stats.device_totals[1];
        assert_eq!(tv.device_id.as_str(), "tv");
        assert!((tv.total_duration_minutes - 169.0).abs() < 1e-9);
        assert_eq!(tv.session_count, 3);
    }

    #[test]
    fn rows_outside_range_are_ignored() {
        let range = DateRange::new(date(2), date(3)).unwrap();
        let rows = vec![row("tv", 1, 45.0), row("tv", 3, 15.0), row("tv", 4, 5.0)];
        let stats = build_monthly_stats(range, &rows, SavingsEstimate::empty(2.1), false);

        assert_eq!(stats.label, "2025-01-02..2025-01-03");
        assert_eq!(stats.total_records, 1);
        assert!((stats.total_duration_minutes - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_applies_only_to_presentation_copy() {
        let range = DateRange::month(2025, 1).unwrap();
        let stats = build_monthly_stats(range, &[row("A", 15, 45.0)], SavingsEstimate::empty(2.1), false);

        assert!((stats.total_cost - 0.3375).abs() < 1e-12);
        let rounded = stats.rounded();
        assert!((rounded.total_cost - 0.34).abs() < 1e-12);
        assert!((rounded.total_units_kwh - 0.045).abs() < 1e-12);
        assert!((rounded.daily_summaries[0].devices[0].total_cost - 0.34).abs() < 1e-12);
        assert_eq!(rounded.label, "2025-01");
        assert_eq!(rounded.total_records, 1);
    }

    #[test]
    fn usage_days_skip_empty_dates() {
        let range = DateRange::new(date(1), date(3)).unwrap();
        let stats = build_monthly_stats(range, &[row("A", 2, 60.0)], SavingsEstimate::empty(2.1), true);

        let days = usage_days(&stats);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, date(2));
        assert!((days[0].total_runtime_hours - 1.0).abs() < f64::EPSILON);
        assert!((days[0].total_cost - 0.45).abs() < 1e-12);
    }

    #[test]
    fn rounding_helpers() {
        assert!((round_kwh(0.123_456) - 0.123).abs() < 1e-12);
        assert!((round_cost(1.575_01) - 1.58).abs() < 1e-12);
        assert!(round_cost(0.0).abs() < f64::EPSILON);
    }
}
