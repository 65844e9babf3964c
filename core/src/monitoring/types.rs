//! Monitoring data types produced by a [`SystemSampler`](super::SystemSampler).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker rendered in place of a reading the host could not provide.
pub const UNAVAILABLE: &str = "N/A";

/// Battery charge direction as recorded in the long-horizon series.
///
/// Parsing is case-insensitive; every kernel status other than
/// `Charging`/`Discharging` (`Full`, `Not charging`, `Unknown`) maps to
/// [`ChargeStatus::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Charging,
    Discharging,
    Other,
}

impl ChargeStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "charging" => Self::Charging,
            "discharging" => Self::Discharging,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Charging => "charging",
            Self::Discharging => "discharging",
            Self::Other => "other",
        }
    }
}

impl Serialize for ChargeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChargeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// One battery read from `/sys/class/power_supply`.
///
/// Serializes as `{capacity, status}` with `"N/A"` for missing fields,
/// which is the shape the status endpoints expose.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatteryReading {
    #[serde(serialize_with = "na_if_none")]
    pub capacity: Option<u8>,
    /// Raw kernel status string (`Charging`, `Full`, ...).
    #[serde(serialize_with = "na_if_none")]
    pub status: Option<String>,
}

impl BatteryReading {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn charge_status(&self) -> ChargeStatus {
        self.status
            .as_deref()
            .map(ChargeStatus::parse)
            .unwrap_or(ChargeStatus::Other)
    }
}

/// Cumulative byte counters summed across all interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl NetworkCounters {
    pub fn total(interfaces: &[InterfaceCounters]) -> Self {
        interfaces.iter().fold(Self::default(), |acc, iface| Self {
            rx_bytes: acc.rx_bytes.saturating_add(iface.rx_bytes),
            tx_bytes: acc.tx_bytes.saturating_add(iface.tx_bytes),
        })
    }
}

/// Per-interface counters parsed from `/proc/net/dev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One tick's worth of host metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub temperature_celsius: Option<f64>,
    /// `None` when the counters could not be read this tick.
    pub network: Option<NetworkCounters>,
}

/// Filesystem usage as reported by `df -Pk`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskUsage {
    pub total_kb: u64,
    pub used_kb: u64,
    pub used_percent: f64,
}

/// Cumulative CPU time counters parsed from the aggregate `cpu` line in `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct CpuCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuCounters {
    /// Total CPU time across all fields.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Idle CPU time (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Serialize `None` as the `"N/A"` marker.
pub fn na_if_none<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(v) => v.serialize(serializer),
        None => serializer.serialize_str(UNAVAILABLE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_status_parse_is_case_insensitive() {
        assert_eq!(ChargeStatus::parse("Charging"), ChargeStatus::Charging);
        assert_eq!(ChargeStatus::parse("DISCHARGING\n"), ChargeStatus::Discharging);
        assert_eq!(ChargeStatus::parse("Full"), ChargeStatus::Other);
        assert_eq!(ChargeStatus::parse("Not charging"), ChargeStatus::Other);
        assert_eq!(ChargeStatus::parse(""), ChargeStatus::Other);
    }

    #[test]
    fn charge_status_serializes_lowercase() {
        let v = serde_json::to_value(ChargeStatus::Discharging).unwrap();
        assert_eq!(v, "discharging");
        let back: ChargeStatus = serde_json::from_str("\"Charging\"").unwrap();
        assert_eq!(back, ChargeStatus::Charging);
        let other: ChargeStatus = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(other, ChargeStatus::Other);
    }

    #[test]
    fn battery_reading_serializes_na_markers() {
        let v = serde_json::to_value(BatteryReading::unavailable()).unwrap();
        assert_eq!(v["capacity"], "N/A");
        assert_eq!(v["status"], "N/A");

        let reading = BatteryReading {
            capacity: Some(87),
            status: Some("Discharging".to_string()),
        };
        let v = serde_json::to_value(&reading).unwrap();
        assert_eq!(v["capacity"], 87);
        assert_eq!(v["status"], "Discharging");
        assert_eq!(reading.charge_status(), ChargeStatus::Discharging);
    }

    #[test]
    fn network_counters_total_sums_interfaces() {
        let ifaces = vec![
            InterfaceCounters {
                name: "lo".to_string(),
                rx_bytes: 100,
                tx_bytes: 100,
            },
            InterfaceCounters {
                name: "wlan0".to_string(),
                rx_bytes: 5000,
                tx_bytes: 1200,
            },
        ];
        let total = NetworkCounters::total(&ifaces);
        assert_eq!(total.rx_bytes, 5100);
        assert_eq!(total.tx_bytes, 1300);
    }

    #[test]
    fn cpu_counters_total() {
        let c = CpuCounters {
            user: 100,
            nice: 10,
            system: 50,
            idle: 800,
            iowait: 20,
            irq: 5,
            softirq: 10,
            steal: 5,
        };
        assert_eq!(c.total(), 1000);
        assert_eq!(c.idle_total(), 820);
    }
}
