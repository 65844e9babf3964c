//! Network throughput derived from cumulative byte counters.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::monitoring::NetworkCounters;

/// Receive/transmit rate in KB/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkRate {
    pub rx_kbps: f64,
    pub tx_kbps: f64,
}

#[derive(Debug, Clone, Copy)]
struct CounterSnapshot {
    counters: NetworkCounters,
    observed_at: DateTime<Utc>,
}

/// Keeps exactly one previous counter snapshot and turns each new one
/// into a rate.
///
/// Elapsed time is measured between snapshots; when it is not positive
/// (clock step, duplicate timestamp) the nominal tick period is used.
/// Counters that go backwards (interface reset, wrap) yield 0, never a
/// negative rate.
#[derive(Debug, Clone)]
pub struct NetworkRateTracker {
    previous: Option<CounterSnapshot>,
    nominal_period: Duration,
}

impl NetworkRateTracker {
    pub fn new(nominal_period: Duration) -> Self {
        Self {
            previous: None,
            nominal_period,
        }
    }

    /// Derive the rate since the previous snapshot and store `counters`
    /// as the new one. The very first observation reports zero.
    pub fn observe(&mut self, counters: NetworkCounters, at: DateTime<Utc>) -> NetworkRate {
        let rate = match self.previous {
            Some(prev) => {
                let measured = (at - prev.observed_at).num_milliseconds() as f64 / 1000.0;
                let elapsed = if measured > 0.0 {
                    measured
                } else {
                    self.nominal_period.as_secs_f64()
                };
                NetworkRate {
                    rx_kbps: kbps(prev.counters.rx_bytes, counters.rx_bytes, elapsed),
                    tx_kbps: kbps(prev.counters.tx_bytes, counters.tx_bytes, elapsed),
                }
            }
            None => NetworkRate::default(),
        };
        self.previous = Some(CounterSnapshot {
            counters,
            observed_at: at,
        });
        rate
    }
}

fn kbps(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || current <= previous {
        return 0.0;
    }
    let rate = (current - previous) as f64 / elapsed_secs / 1024.0;
    (rate * 100.0).round() / 100.0
}
