//! The history store shared by the sampling scheduler and the HTTP layer.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::estimator::{estimate, BatteryEstimate};
use super::network::{NetworkRate, NetworkRateTracker};
use super::records::{BatteryRecord, MetricsHistory, Sample};
use super::series::BoundedSeries;
use crate::monitoring::{BatteryReading, MetricsSnapshot};

/// Default short-horizon capacity (five minutes at a 5 s tick).
pub const DEFAULT_METRICS_CAPACITY: usize = 60;

/// Default long-horizon capacity (24 hours at a 10 minute interval).
pub const DEFAULT_BATTERY_CAPACITY: usize = 144;

/// Default minimum spacing between long-horizon appends.
pub const DEFAULT_BATTERY_INTERVAL: Duration = Duration::from_secs(600);

/// Default scheduler tick period.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(5);

/// Capacities and intervals injected into a [`HistoryStore`].
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub metrics_capacity: usize,
    pub battery_capacity: usize,
    pub battery_interval: Duration,
    /// Nominal tick period, used as a fallback for network-rate elapsed time.
    pub sample_period: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            metrics_capacity: DEFAULT_METRICS_CAPACITY,
            battery_capacity: DEFAULT_BATTERY_CAPACITY,
            battery_interval: DEFAULT_BATTERY_INTERVAL,
            sample_period: DEFAULT_SAMPLE_PERIOD,
        }
    }
}

struct HistoryInner {
    samples: BoundedSeries<Sample>,
    battery: BoundedSeries<BatteryRecord>,
    last_battery_append: Option<DateTime<Utc>>,
    network: NetworkRateTracker,
}

/// Owns the short-horizon metrics series, the long-horizon battery series
/// and the previous network counter snapshot.
///
/// All state sits behind one mutex that is never held across an `.await`,
/// so the store can be shared as `Arc<HistoryStore>` between the scheduler
/// task and any number of request handlers. Reads return copies.
///
/// Every long-horizon append publishes the full series on a `watch`
/// channel; a single persistence worker subscribes to it. The channel only
/// keeps the newest value, so bursts coalesce into one write and a slow
/// disk never blocks the appender.
pub struct HistoryStore {
    inner: Mutex<HistoryInner>,
    battery_interval: chrono::Duration,
    battery_tx: watch::Sender<Vec<BatteryRecord>>,
}

impl HistoryStore {
    pub fn new(config: HistoryConfig) -> Self {
        let (battery_tx, _) = watch::channel(Vec::new());
        let battery_interval = chrono::Duration::from_std(config.battery_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        Self {
            inner: Mutex::new(HistoryInner {
                samples: BoundedSeries::new(config.metrics_capacity),
                battery: BoundedSeries::new(config.battery_capacity),
                last_battery_append: None,
                network: NetworkRateTracker::new(config.sample_period),
            }),
            battery_interval,
            battery_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryInner> {
        // A panic while holding the lock cannot leave the series half
        // appended (every mutation is a single push), so poison is ignored.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a short-horizon sample stamped now.
    pub fn record_sample(&self, metrics: &MetricsSnapshot) -> Sample {
        self.record_sample_at(metrics, Utc::now())
    }

    /// Append a short-horizon sample stamped `now`.
    ///
    /// Non-finite CPU/memory values are recorded as 0. Missing network
    /// counters record a zero rate and keep the previous snapshot.
    pub fn record_sample_at(&self, metrics: &MetricsSnapshot, now: DateTime<Utc>) -> Sample {
        let mut inner = self.lock();
        let rate = match metrics.network {
            Some(counters) => inner.network.observe(counters, now),
            None => NetworkRate::default(),
        };
        let sample = Sample {
            timestamp: now,
            cpu_percent: sanitize_percent(metrics.cpu_percent),
            memory_percent: sanitize_percent(metrics.memory_percent),
            temperature_celsius: metrics.temperature_celsius.filter(|t| t.is_finite()),
            network_rx_kbps: rate.rx_kbps,
            network_tx_kbps: rate.tx_kbps,
        };
        inner.samples.push(sample.clone());
        sample
    }

    /// Append a long-horizon battery record stamped now, subject to the
    /// append interval unless `force` is set.
    pub fn record_battery(&self, reading: &BatteryReading, force: bool) -> bool {
        self.record_battery_at(reading, force, Utc::now())
    }

    /// Returns `true` if a record was appended.
    ///
    /// A reading without a capacity is never appended. On append the full
    /// series is handed to the persistence worker; this call does not wait
    /// for the write.
    pub fn record_battery_at(
        &self,
        reading: &BatteryReading,
        force: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(capacity) = reading.capacity else {
            debug!("Skipping battery record: capacity unavailable");
            return false;
        };

        let mut inner = self.lock();
        if !force {
            if let Some(last) = inner.last_battery_append {
                if now - last < self.battery_interval {
                    return false;
                }
            }
        }

        inner.battery.push(BatteryRecord {
            timestamp: now,
            capacity,
            status: reading.charge_status(),
        });
        inner.last_battery_append = Some(now);
        self.battery_tx.send_replace(inner.battery.to_vec());
        debug!(
            "Recorded battery {}% ({} records)",
            capacity,
            inner.battery.len()
        );
        true
    }

    /// Seed the long-horizon series from persisted records (oldest first),
    /// keeping the newest that fit.
    pub fn restore_battery(&self, records: Vec<BatteryRecord>) {
        let mut inner = self.lock();
        inner.battery.replace(records);
        debug!("Restored {} battery records", inner.battery.len());
    }

    /// Copy of the short-horizon series as parallel arrays.
    pub fn metrics_history(&self) -> MetricsHistory {
        let inner = self.lock();
        MetricsHistory::from_samples(inner.samples.iter())
    }

    /// Copy of the long-horizon series, oldest first.
    pub fn battery_history(&self) -> Vec<BatteryRecord> {
        self.lock().battery.to_vec()
    }

    /// Newest short-horizon sample, if any tick has completed.
    pub fn latest_sample(&self) -> Option<Sample> {
        self.lock().samples.last().cloned()
    }

    /// Battery-life estimate over the current long-horizon series.
    pub fn battery_estimate(&self) -> Option<BatteryEstimate> {
        let records = self.battery_history();
        estimate(&records)
    }

    /// Receiver that observes every long-horizon append.
    pub fn subscribe_battery(&self) -> watch::Receiver<Vec<BatteryRecord>> {
        self.battery_tx.subscribe()
    }
}

fn sanitize_percent(value: f64) -> f64 {
    if value.is_finite() {
        (value.clamp(0.0, 100.0) * 10.0).round() / 10.0
    } else {
        0.0
    }
}
