//! End-to-end usage computation.
//!
//! [`reconstruct_and_aggregate`] is a pure function of its arguments. It
//! never reads the clock and never fails: problems are returned as
//! [`Anomaly`] values next to a best-effort report.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate_daily, session_date};
use crate::anomaly::Anomaly;
use crate::config::UsageConfig;
use crate::cost::{CostModel, DeviceResolver};
use crate::event::RawDeviceEvent;
use crate::period::DateRange;
use crate::report::{DailySummary, MonthlyStats, build_monthly_stats};
use crate::savings::estimate_savings;
use crate::session::{Session, reconstruct_sessions};
use crate::types::{DeviceId, ValidationError};

/// Which dates to report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub range: DateRange,
    /// Emit an empty summary for dates without usage.
    #[serde(default)]
    pub calendar_complete: bool,
}

impl ReportRequest {
    #[must_use]
    pub const fn new(range: DateRange) -> Self {
        Self {
            range,
            calendar_complete: false,
        }
    }

    /// A whole calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self, ValidationError> {
        DateRange::month(year, month).map(Self::new)
    }

    #[must_use]
    pub const fn with_calendar(mut self, calendar_complete: bool) -> Self {
        self.calendar_complete = calendar_complete;
        self
    }
}

/// Everything derived from one `(events, config, evaluation_time)` input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub evaluation_time: DateTime<Utc>,
    /// Same as `monthly_stats.daily_summaries`.
    pub daily_summaries: Vec<DailySummary>,
    pub monthly_stats: MonthlyStats,
    /// Sessions that started inside the requested range.
    pub sessions: Vec<Session>,
    /// Sessions still running at `evaluation_time`, whatever their start date.
    pub running: Vec<Session>,
    pub anomalies: Vec<Anomaly>,
}

impl UsageReport {
    /// Presentation copy with kWh rounded to 3 decimals and cost to 2.
    #[must_use]
    pub fn rounded(&self) -> Self {
        let monthly_stats = self.monthly_stats.rounded();
        Self {
            evaluation_time: self.evaluation_time,
            daily_summaries: monthly_stats.daily_summaries.clone(),
            monthly_stats,
            sessions: self.sessions.clone(),
            running: self.running.clone(),
            anomalies: self.anomalies.clone(),
        }
    }
}

/// Reconstructs sessions from `events` and builds the report for `request`.
///
/// Sessions are attributed to the civil day (in `config.utc_offset_minutes`)
/// on which they started; only those starting inside the requested range
/// contribute to summaries and savings. Devices the resolver does not know
/// are priced with the configured defaults and reported once each as
/// [`Anomaly::MissingMetadata`]. Anomalies anchored at an instant are kept
/// only when that instant falls on a date inside the range; invalid events
/// are always kept.
pub fn reconstruct_and_aggregate(
    events: &[RawDeviceEvent],
    config: &UsageConfig,
    resolver: &dyn DeviceResolver,
    evaluation_time: DateTime<Utc>,
    request: &ReportRequest,
) -> UsageReport {
    let config = config.clone().validated();
    let offset = config.offset();
    let reconstruction = reconstruct_sessions(events, &config, evaluation_time);

    let sessions: Vec<Session> = reconstruction
        .sessions
        .iter()
        .filter(|s| request.range.contains(session_date(s, offset)))
        .cloned()
        .collect();
    let running: Vec<Session> = reconstruction.ongoing().cloned().collect();

    let cost = CostModel::new(resolver, &config);
    let daily = cost.price_daily(&aggregate_daily(&sessions, offset));
    let savings = estimate_savings(&sessions, &cost, config.avg_hours_saved_per_auto_off);
    let monthly_stats = build_monthly_stats(request.range, &daily, savings, request.calendar_complete);

    // Anomalies from the events around the range are not this report's concern.
    let mut anomalies: Vec<Anomaly> = reconstruction
        .anomalies
        .into_iter()
        .filter(|anomaly| {
            anomaly
                .timestamp()
                .is_none_or(|at| request.range.contains(at.with_timezone(&offset).date_naive()))
        })
        .collect();
    let devices: BTreeSet<&DeviceId> = sessions.iter().map(|s| &s.device_id).collect();
    for device_id in devices {
        if cost.resolve(device_id).is_fallback {
            let anomaly = Anomaly::MissingMetadata {
                device_id: device_id.clone(),
            };
            anomaly.log();
            anomalies.push(anomaly);
        }
    }

    tracing::debug!(
        range = %request.range.label(),
        sessions = sessions.len(),
        running = running.len(),
        days = monthly_stats.daily_summaries.len(),
        anomalies = anomalies.len(),
        "built usage report"
    );

    UsageReport {
        evaluation_time,
        daily_summaries: monthly_stats.daily_summaries.clone(),
        monthly_stats,
        sessions,
        running,
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyCategory;
    use crate::cost::{DeviceProfile, NoDevices};
    use crate::session::{TerminalState, Validity};
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::collections::BTreeMap;

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

    fn january() -> ReportRequest {
        ReportRequest::month(2025, 1).unwrap()
    }

    fn run(events: &[RawDeviceEvent], now: i64) -> UsageReport {
        reconstruct_and_aggregate(
            events,
            &UsageConfig::default(),
            &NoDevices,
            ts(now),
            &january(),
        )
    }

    #[test]
    fn forty_five_minutes_at_defaults() {
        let report = run(&[ev("A", "ON", 60), ev("A", "OFF", 105)], 600);

        assert_eq!(report.daily_summaries.len(), 1);
        let day = &report.daily_summaries[0];
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert!((day.total_duration_minutes - 45.0).abs() < 1e-9);
        assert!((day.total_units_kwh - 0.045).abs() < 1e-12);
        assert!((day.total_cost - 0.3375).abs() < 1e-12);

        let stats = &report.monthly_stats;
        assert_eq!(stats.label, "2025-01");
        assert_eq!(stats.days_with_usage, 1);
        assert!((stats.total_cost - 0.3375).abs() < 1e-12);

        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].category(), AnomalyCategory::MissingMetadata);
    }

    #[test]
    fn abandoned_on_is_reported_and_not_counted() {
        let report = run(
            &[ev("B", "ON", 0), ev("B", "ON", 5), ev("B", "OFF", 30)],
            600,
        );

        assert!((report.monthly_stats.total_duration_minutes - 25.0).abs() < 1e-9);
        assert_eq!(report.monthly_stats.total_sessions, 1);
        assert_eq!(report.monthly_stats.total_on_events, 2);
        assert!(report
            .anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::AbandonedOn { .. })));
    }

    #[test]
    fn running_sessions_grow_with_evaluation_time() {
        let events = [ev("A", "ON", 0)];

        let at_10 = run(&events, 10);
        assert_eq!(at_10.running.len(), 1);
        assert!((at_10.running[0].duration_minutes - 10.0).abs() < 1e-9);
        assert!((at_10.monthly_stats.total_duration_minutes - 10.0).abs() < 1e-9);

        let at_25 = run(&events, 25);
        assert!((at_25.running[0].duration_minutes - 25.0).abs() < 1e-9);
        assert_eq!(at_25.running[0].terminal_state, TerminalState::Ongoing);
    }

    #[test]
    fn repeated_calls_agree() {
        let events = [
            ev("A", "ON", 0),
            ev("A", "OFF", 33),
            ev("B", "ON", 7),
            ev("B", "AUTO_OFF", 90),
            ev("C", "OFF", 5),
        ];
        assert_eq!(run(&events, 200), run(&events, 200));
    }

    #[test]
    fn duplicated_input_matches_single_input() {
        let events = vec![ev("A", "ON", 0), ev("A", "OFF", 33), ev("A", "ON", 40), ev("A", "AUTO_OFF", 70)];
        let mut doubled = events.clone();
        doubled.extend(events.iter().cloned());

        let once = run(&events, 200);
        let twice = run(&doubled, 200);
        assert_eq!(once.monthly_stats, twice.monthly_stats);
        assert_eq!(once.sessions, twice.sessions);
        assert!(twice
            .anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::DuplicateEvent { .. })));
    }

    #[test]
    fn too_long_sessions_stay_out_of_totals() {
        let report = run(&[ev("C", "ON", 0), ev("C", "OFF", 5000)], 6000);

        assert_eq!(report.sessions.len(), 1);
        assert_eq!(report.sessions[0].validity, Validity::TooLong);
        assert!(report.daily_summaries.is_empty());
        assert!(report.monthly_stats.total_duration_minutes.abs() < f64::EPSILON);
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.category() == AnomalyCategory::OutOfRange));
    }

    #[test]
    fn savings_are_separate_from_measured_totals() {
        let mut devices = BTreeMap::new();
        devices.insert(
            "lamp".to_string(),
            DeviceProfile {
                name: "Lamp".into(),
                wattage_watts: 100.0,
                unit_price: 7.50,
            },
        );
        let report = reconstruct_and_aggregate(
            &[ev("lamp", "ON", 0), ev("lamp", "AUTO_OFF", 60)],
            &UsageConfig::default(),
            &devices,
            ts(120),
            &january(),
        );

        let stats = &report.monthly_stats;
        assert!((stats.total_units_kwh - 0.1).abs() < 1e-12);
        assert!((stats.energy_savings.total_energy_saved_kwh - 0.21).abs() < 1e-12);
        assert_eq!(stats.energy_savings.rows[0].device_name, "Lamp");
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn missing_metadata_is_reported_once_per_device() {
        let report = run(
            &[
                ev("A", "ON", 0),
                ev("A", "OFF", 10),
                ev("A", "ON", 20),
                ev("A", "OFF", 30),
                ev("B", "ON", 0),
                ev("B", "OFF", 10),
            ],
            100,
        );
        let missing: Vec<&str> = report
            .anomalies
            .iter()
            .filter(|a| matches!(a, Anomaly::MissingMetadata { .. }))
            .filter_map(|a| a.device_id().map(DeviceId::as_str))
            .collect();
        assert_eq!(missing, vec!["A", "B"]);
    }

    #[test]
    fn sessions_outside_range_are_ignored() {
        let request = ReportRequest::new(DateRange::day(NaiveDate::from_ymd_opt(2025, 1, 16).unwrap()))
            .with_calendar(true);
        let report = reconstruct_and_aggregate(
            &[ev("A", "ON", 0), ev("A", "OFF", 30)],
            &UsageConfig::default(),
            &NoDevices,
            ts(200),
            &request,
        );

        assert!(report.sessions.is_empty());
        assert_eq!(report.daily_summaries.len(), 1);
        assert!(report.daily_summaries[0].devices.is_empty());
        assert_eq!(report.monthly_stats.days_with_usage, 0);
    }

    #[test]
    fn anomalies_outside_range_are_dropped() {
        // ts(0) is 2025-01-15 09:00; the report covers the 16th only.
        let request = ReportRequest::new(DateRange::day(NaiveDate::from_ymd_opt(2025, 1, 16).unwrap()));
        let events = [
            ev("A", "OFF", 0),
            ev("A", "ON", 24 * 60),
            ev("A", "OFF", 24 * 60 + 30),
            ev("B", "OFF", 24 * 60 + 45),
            ev("C", "ON", 2 * 24 * 60),
            ev("C", "ON", 2 * 24 * 60 + 10),
        ];
        let report = reconstruct_and_aggregate(
            &events,
            &UsageConfig::default(),
            &NoDevices,
            ts(3 * 24 * 60),
            &request,
        );

        let orphans: Vec<_> = report
            .anomalies
            .iter()
            .filter(|a| matches!(a, Anomaly::OrphanOff { .. }))
            .filter_map(Anomaly::device_id)
            .map(DeviceId::as_str)
            .collect();
        assert_eq!(orphans, vec!["B"]);
        assert!(
            !report
                .anomalies
                .iter()
                .any(|a| matches!(a, Anomaly::AbandonedOn { .. }))
        );
        assert!((report.monthly_stats.total_duration_minutes - 30.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_event_does_not_stop_the_rest() {
        let mut events = vec![ev("A", "ON", 0), ev("A", "OFF", 45)];
        events.insert(
            1,
            RawDeviceEvent {
                state: "DIMMED".into(),
                ..ev("A", "ON", 10)
            },
        );
        let report = run(&events, 100);

        assert!((report.monthly_stats.total_duration_minutes - 45.0).abs() < 1e-9);
        assert!(matches!(
            report.anomalies[0],
            Anomaly::InvalidEvent { index: 1, .. }
        ));
    }

    #[test]
    fn rounded_report_keeps_daily_summaries_in_step() {
        let report = run(&[ev("A", "ON", 0), ev("A", "OFF", 45)], 100).rounded();
        assert!((report.monthly_stats.total_cost - 0.34).abs() < 1e-12);
        assert_eq!(report.daily_summaries, report.monthly_stats.daily_summaries);
    }
}
