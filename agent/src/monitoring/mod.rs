//! Host monitoring: the periodic sampling loop plus the local collectors
//! (system stats, backlight, tmux) it and the HTTP layer read from.
//!
//! One background task samples the host on a fixed period and feeds the
//! shared [`HistoryStore`]. The metrics and battery steps of a tick each
//! run in their own spawned task, so a failing or panicking step costs
//! only that step, not the other one or the loop.

pub mod backlight;
pub mod collector;
pub mod tmux;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hostpulse_core::errors::CoreError;
use hostpulse_core::history::HistoryStore;
use hostpulse_core::monitoring::SystemSampler;

/// Background task that samples the host every `period` until `cancel`
/// fires, then makes one forced battery append.
pub async fn run_sampling_loop(
    store: Arc<HistoryStore>,
    sampler: Arc<dyn SystemSampler>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Sampling loop started (period: {}s)", period.as_secs_f64());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Sampling loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                let metrics = tokio::spawn(record_metrics(store.clone(), sampler.clone()));
                match metrics.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Metrics sample failed: {e}"),
                    Err(e) => warn!("Metrics sample panicked: {e}"),
                }
                let battery = tokio::spawn(record_battery(store.clone(), sampler.clone(), false));
                match battery.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Battery sample failed: {e}"),
                    Err(e) => warn!("Battery sample panicked: {e}"),
                }
            }
        }
    }

    if let Err(e) = record_battery(store, sampler, true).await {
        warn!("Final battery sample failed: {e}");
    }
    info!("Sampling loop stopped");
}

/// Sample metrics and append them to the short-horizon series.
async fn record_metrics(
    store: Arc<HistoryStore>,
    sampler: Arc<dyn SystemSampler>,
) -> Result<(), CoreError> {
    let metrics = sampler.sample_metrics().await?;
    let sample = store.record_sample(&metrics);
    debug!(
        cpu = sample.cpu_percent,
        memory = sample.memory_percent,
        rx_kbps = sample.network_rx_kbps,
        tx_kbps = sample.network_tx_kbps,
        "Recorded sample"
    );
    Ok(())
}

/// Sample the battery and offer it to the long-horizon series. Returns
/// whether a record was appended.
///
/// A host without a battery is not an error: `Unavailable` is logged at
/// debug level and reported as "not appended".
async fn record_battery(
    store: Arc<HistoryStore>,
    sampler: Arc<dyn SystemSampler>,
    force: bool,
) -> Result<bool, CoreError> {
    let reading = match sampler.sample_battery().await {
        Ok(reading) => reading,
        Err(CoreError::Unavailable(reason)) => {
            debug!("Battery unavailable: {reason}");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    let appended = store.record_battery(&reading, force);
    if appended {
        debug!(capacity = ?reading.capacity, "Appended battery record");
    }
    Ok(appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hostpulse_core::history::HistoryConfig;
    use hostpulse_core::monitoring::{BatteryReading, MetricsSnapshot, NetworkCounters};

    /// Scripted sampler: every `fail_every`-th metrics call errors, every
    /// `panic_every`-th one panics. `battery: None` models a host without
    /// a power supply.
    struct FakeSampler {
        calls: AtomicUsize,
        fail_every: Option<usize>,
        panic_every: Option<usize>,
        battery: Option<u8>,
    }

    impl FakeSampler {
        fn healthy() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_every: None,
                panic_every: None,
                battery: Some(80),
            }
        }
    }

    #[async_trait::async_trait]
    impl SystemSampler for FakeSampler {
        async fn sample_metrics(&self) -> Result<MetricsSnapshot, CoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_every.is_some_and(|k| n % k == 0) {
                panic!("sampler exploded");
            }
            if self.fail_every.is_some_and(|k| n % k == 0) {
                return Err(CoreError::Unavailable("proc unreadable".into()));
            }
            Ok(MetricsSnapshot {
                cpu_percent: 10.0,
                memory_percent: 20.0,
                temperature_celsius: Some(40.0),
                network: Some(NetworkCounters {
                    rx_bytes: n as u64 * 10_240,
                    tx_bytes: 0,
                }),
            })
        }

        async fn sample_battery(&self) -> Result<BatteryReading, CoreError> {
            let capacity = self
                .battery
                .ok_or_else(|| CoreError::Unavailable("no battery power supply".into()))?;
            Ok(BatteryReading {
                capacity: Some(capacity),
                status: Some("Discharging".into()),
            })
        }
    }

    fn test_store() -> Arc<HistoryStore> {
        Arc::new(HistoryStore::new(HistoryConfig {
            sample_period: Duration::from_millis(10),
            ..HistoryConfig::default()
        }))
    }

    async fn run_for(store: Arc<HistoryStore>, sampler: Arc<dyn SystemSampler>, ms: u64) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sampling_loop(
            store,
            sampler,
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(ms)).await;
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn loop_records_samples() {
        let store = test_store();
        run_for(store.clone(), Arc::new(FakeSampler::healthy()), 100).await;

        let history = store.metrics_history();
        assert!(history.len() >= 2);
        assert_eq!(history.cpu.len(), history.network_rx.len());
        assert!(history.cpu.iter().all(|&c| c == 10.0));
    }

    #[tokio::test]
    async fn battery_appends_once_per_interval_plus_final() {
        let store = test_store();
        run_for(store.clone(), Arc::new(FakeSampler::healthy()), 100).await;

        // First tick appends, the rest fall inside the 600 s interval, and
        // shutdown forces one more.
        assert_eq!(store.battery_history().len(), 2);
    }

    #[tokio::test]
    async fn loop_survives_errors() {
        let store = test_store();
        let sampler = Arc::new(FakeSampler {
            fail_every: Some(2),
            ..FakeSampler::healthy()
        });
        run_for(store.clone(), sampler.clone(), 120).await;

        assert!(sampler.calls.load(Ordering::SeqCst) >= 4);
        assert!(store.metrics_history().len() >= 2);
    }

    #[tokio::test]
    async fn loop_survives_panics() {
        let store = test_store();
        let sampler = Arc::new(FakeSampler {
            panic_every: Some(2),
            ..FakeSampler::healthy()
        });
        run_for(store.clone(), sampler.clone(), 120).await;

        assert!(sampler.calls.load(Ordering::SeqCst) >= 4);
        assert!(store.metrics_history().len() >= 2);
    }

    #[tokio::test]
    async fn cancel_before_first_tick_still_forces_battery() {
        let store = test_store();
        let cancel = CancellationToken::new();
        cancel.cancel();
        run_sampling_loop(
            store.clone(),
            Arc::new(FakeSampler::healthy()),
            Duration::from_secs(60),
            cancel,
        )
        .await;
        assert_eq!(store.battery_history().len(), 1);
    }

    #[tokio::test]
    async fn battery_appends_while_metrics_are_down() {
        let store = test_store();
        let sampler = Arc::new(FakeSampler {
            fail_every: Some(1),
            battery: Some(50),
            ..FakeSampler::healthy()
        });
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sampling_loop(
            store.clone(),
            sampler.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.metrics_history().is_empty());
        let running = store.battery_history();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].capacity, 50);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(store.battery_history().len(), 2);
    }

    #[tokio::test]
    async fn missing_battery_is_not_an_error() {
        let store = test_store();
        let sampler: Arc<dyn SystemSampler> = Arc::new(FakeSampler {
            battery: None,
            ..FakeSampler::healthy()
        });

        assert!(!record_battery(store.clone(), sampler.clone(), false)
            .await
            .unwrap());
        assert!(!record_battery(store.clone(), sampler.clone(), true)
            .await
            .unwrap());

        run_for(store.clone(), sampler, 60).await;
        assert!(store.battery_history().is_empty());
        assert!(store.metrics_history().len() >= 2);
    }
}
