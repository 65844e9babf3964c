//! The sampling capability consumed by the scheduler.
//!
//! Implementations read the host (pseudo-files, subprocesses) and return
//! typed snapshots. They are expected to enforce their own I/O timeouts;
//! the scheduler treats any `Err` as a transient failure of one tick.

use crate::errors::CoreError;
use crate::monitoring::types::{BatteryReading, MetricsSnapshot};

#[async_trait::async_trait]
pub trait SystemSampler: Send + Sync {
    /// One-shot read of CPU, memory, temperature and network counters.
    ///
    /// CPU usage is delta-based, so the first call may report 0%.
    async fn sample_metrics(&self) -> Result<MetricsSnapshot, CoreError>;

    /// One-shot read of the battery capacity and charge status.
    async fn sample_battery(&self) -> Result<BatteryReading, CoreError>;
}
