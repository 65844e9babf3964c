//! Records stored in the two history series and their wire shapes.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::monitoring::ChargeStatus;

/// One short-horizon point, produced once per scheduler tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub temperature_celsius: Option<f64>,
    pub network_rx_kbps: f64,
    pub network_tx_kbps: f64,
}

/// One long-horizon battery point.
///
/// This is also the on-disk format of the persisted series:
/// `{"timestamp": "<ISO-8601>", "capacity": 80, "status": "discharging"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub capacity: u8,
    pub status: ChargeStatus,
}

/// The short-horizon series as five parallel arrays, oldest first.
///
/// Built from one sequence of [`Sample`]s, so all arrays have equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsHistory {
    pub timestamps: Vec<DateTime<Utc>>,
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub temperature: Vec<Option<f64>>,
    pub network_rx: Vec<f64>,
    pub network_tx: Vec<f64>,
}

impl MetricsHistory {
    pub fn from_samples<'a>(samples: impl ExactSizeIterator<Item = &'a Sample>) -> Self {
        let n = samples.len();
        let mut history = Self {
            timestamps: Vec::with_capacity(n),
            cpu: Vec::with_capacity(n),
            memory: Vec::with_capacity(n),
            temperature: Vec::with_capacity(n),
            network_rx: Vec::with_capacity(n),
            network_tx: Vec::with_capacity(n),
        };
        for s in samples {
            history.timestamps.push(s.timestamp);
            history.cpu.push(s.cpu_percent);
            history.memory.push(s.memory_percent);
            history.temperature.push(s.temperature_celsius);
            history.network_rx.push(s.network_rx_kbps);
            history.network_tx.push(s.network_tx_kbps);
        }
        history
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Accept RFC 3339 timestamps and offset-less ISO-8601 ones (read as UTC),
/// so history files written without a zone still load.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
