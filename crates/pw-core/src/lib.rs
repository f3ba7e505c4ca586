//! Core usage accounting for smart plugs.
//!
//! This crate turns a log of ON / OFF / AUTO_OFF transitions into:
//! - Sessions: bounded usage intervals per device, with validity tags
//! - Usage: per-device runtime, energy and cost by day, week or month
//! - Savings: a labelled estimate of energy saved by automatic switch-offs
//! - Reports: daily summaries and range statistics for presentation
//!
//! Every computation is a pure function of `(events, config, evaluation_time)`.

pub mod aggregate;
pub mod anomaly;
mod config;
pub mod cost;
pub mod demo;
pub mod event;
pub mod period;
pub mod pipeline;
pub mod report;
pub mod savings;
pub mod session;
pub mod store;
pub mod types;

pub use aggregate::{DailyRuntime, DeviceUsage, aggregate, aggregate_daily, roll_up, roll_up_range};
pub use anomaly::{Anomaly, AnomalyCategory};
pub use config::UsageConfig;
pub use cost::{CostModel, DeviceProfile, DeviceResolver, NoDevices};
pub use event::{DeviceEvent, PowerState, RawDeviceEvent};
pub use period::{DateRange, Granularity, PeriodKey};
pub use pipeline::{ReportRequest, UsageReport, reconstruct_and_aggregate};
pub use report::{DailySummary, MonthlyStats, UsageDay, usage_days};
pub use savings::{EnergySaving, SavingsEstimate, estimate_savings};
pub use session::{Reconstruction, Session, TerminalState, Validity, reconstruct_sessions};
pub use store::{EventStore, MemoryEventStore};
pub use types::{DeviceId, EventId, ValidationError};
