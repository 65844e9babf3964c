//! Telemetry history: a short-horizon multi-metric ring for live charts
//! and a long-horizon battery ring that survives restarts.

pub mod estimator;
pub mod network;
pub mod records;
pub mod series;
pub mod store;

pub use estimator::{estimate, format_minutes, BatteryEstimate};
pub use network::{NetworkRate, NetworkRateTracker};
pub use records::{BatteryRecord, MetricsHistory, Sample};
pub use series::BoundedSeries;
pub use store::{HistoryConfig, HistoryStore};
