//! Usage aggregation.
//!
//! Sums classified sessions into per-device, per-day rows. Week, month and
//! range rows are always derived from day rows by [`roll_up`], never from the
//! sessions directly, so day totals and month totals can never disagree.
//!
//! Everything here is a pure function of its inputs: map iteration is ordered
//! and no state survives between calls.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::CostModel;
use crate::period::{DateRange, Granularity, PeriodKey};
use crate::session::{Session, TerminalState};
use crate::types::DeviceId;

/// Measured runtime for one device on one civil day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRuntime {
    pub device_id: DeviceId,
    pub date: NaiveDate,
    pub total_duration_minutes: f64,
    /// Sessions that contributed to `total_duration_minutes`.
    pub session_count: usize,
    /// Every session started that day, whatever its validity.
    pub on_events_count: usize,
    pub auto_off_count: usize,
    pub last_used: Option<DateTime<Utc>>,
}

/// Runtime, energy and cost for one device over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceUsage {
    pub device_id: DeviceId,
    pub device_name: String,
    pub period: PeriodKey,
    pub total_duration_minutes: f64,
    pub session_count: usize,
    pub on_events_count: usize,
    pub auto_off_count: usize,
    pub total_units_kwh: f64,
    pub total_cost: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl DeviceUsage {
    /// Mean duration of contributing sessions; 0 when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_session_duration(&self) -> f64 {
        if self.session_count == 0 {
            0.0
        } else {
            self.total_duration_minutes / self.session_count as f64
        }
    }
}

/// Civil date on which a session is accounted: the day it started.
#[must_use]
pub fn session_date(session: &Session, offset: FixedOffset) -> NaiveDate {
    session.start.with_timezone(&offset).date_naive()
}

/// Groups sessions by device and civil day.
///
/// Only `Valid` sessions add duration. Device-days without any contributing
/// session are omitted. Rows are ordered by date, then device.
pub fn aggregate_daily(sessions: &[Session], offset: FixedOffset) -> Vec<DailyRuntime> {
    let mut rows: BTreeMap<(NaiveDate, DeviceId), DailyRuntime> = BTreeMap::new();

    for session in sessions {
        let date = session_date(session, offset);
        let row = rows
            .entry((date, session.device_id.clone()))
            .or_insert_with(|| DailyRuntime {
                device_id: session.device_id.clone(),
                date,
                total_duration_minutes: 0.0,
                session_count: 0,
                on_events_count: 0,
                auto_off_count: 0,
                last_used: None,
            });

        row.on_events_count += 1;
        if session.terminal_state == TerminalState::AutoOff {
            row.auto_off_count += 1;
        }
        if session.counts_toward_totals() {
            row.total_duration_minutes += session.duration_minutes;
            row.session_count += 1;
            let end = session.effective_end();
            row.last_used = Some(row.last_used.map_or(end, |last| last.max(end)));
        }
    }

    rows.into_values().filter(|row| row.session_count > 0).collect()
}

/// Derives coarser rows by summing day rows.
///
/// Rows are ordered by period, then device.
pub fn roll_up(daily: &[DeviceUsage], granularity: Granularity) -> Vec<DeviceUsage> {
    sum_rows(daily, |row| {
        row.period
            .start_date()
            .map_or(row.period, |date| PeriodKey::containing(date, granularity))
    })
}

/// Sums day rows falling inside `range` into one row per device.
pub fn roll_up_range(daily: &[DeviceUsage], range: DateRange) -> Vec<DeviceUsage> {
    let inside: Vec<DeviceUsage> = daily
        .iter()
        .filter(|row| row.period.start_date().is_some_and(|d| range.contains(d)))
        .cloned()
        .collect();
    sum_rows(&inside, |_| PeriodKey::Range(range))
}

fn sum_rows(rows: &[DeviceUsage], key: impl Fn(&DeviceUsage) -> PeriodKey) -> Vec<DeviceUsage> {
    let mut out: BTreeMap<(PeriodKey, DeviceId), DeviceUsage> = BTreeMap::new();

    for row in rows {
        let period = key(row);
        match out.get_mut(&(period, row.device_id.clone())) {
            Some(total) => {
                total.total_duration_minutes += row.total_duration_minutes;
                total.session_count += row.session_count;
                total.on_events_count += row.on_events_count;
                total.auto_off_count += row.auto_off_count;
                total.total_units_kwh += row.total_units_kwh;
                total.total_cost += row.total_cost;
                total.last_used = total.last_used.max(row.last_used);
            }
            None => {
                out.insert(
                    (period, row.device_id.clone()),
                    DeviceUsage {
                        period,
                        ..row.clone()
                    },
                );
            }
        }
    }

    out.into_values().collect()
}

/// Sessions to priced usage rows at the requested granularity.
pub fn aggregate(
    sessions: &[Session],
    granularity: Granularity,
    cost: &CostModel<'_>,
    offset: FixedOffset,
) -> Vec<DeviceUsage> {
    let daily = cost.price_daily(&aggregate_daily(sessions, offset));
    match granularity {
        Granularity::Day => daily,
        Granularity::Week | Granularity::Month => roll_up(&daily, granularity),
    }
}
