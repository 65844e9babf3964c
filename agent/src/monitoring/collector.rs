//! Local host collector: the agent's [`SystemSampler`] plus the detailed
//! status sections served by `/api/status`.
//!
//! Reads `/proc` and `/sys` directly (faster than spawning processes) and
//! only shells out for `df` and `ip`, through the time-limited helpers in
//! [`crate::command`]. Roots are injectable so tests can point the
//! collector at a fake tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use hostpulse_core::errors::CoreError;
use hostpulse_core::monitoring::types::na_if_none;
use hostpulse_core::monitoring::{
    cpu_percent_from_delta, memory_used_percent, parse_capacity, parse_cpu_line, parse_df_output,
    parse_net_dev, parse_os_release_name, parse_thermal_millidegrees, BatteryReading, CpuCounters,
    InterfaceCounters, MetricsSnapshot, NetworkCounters, SystemSampler,
};

use crate::command::{run_command, run_program};

/// Services whose state is reported in `/api/status`.
pub const WATCHED_SERVICES: &[&str] = &["sshd", "cron", "systemd-resolved"];

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Filesystem roots the collector reads from.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub os_release: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            os_release: PathBuf::from("/etc/os-release"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageGb {
    pub total: f64,
    pub used: f64,
    pub percent: f64,
}

/// The `system` section of `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub uptime: String,
    pub kernel: String,
    pub os: String,
    pub cpu_usage: f64,
    pub memory: UsageGb,
    pub disk: UsageGb,
    #[serde(serialize_with = "na_if_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceTraffic {
    /// MiB
    pub bytes_sent: f64,
    /// MiB
    pub bytes_recv: f64,
}

/// The `network` section of `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub ip_address: String,
    pub interfaces: BTreeMap<String, InterfaceTraffic>,
}

/// Collects metrics from the agent's own host.
pub struct LocalCollector {
    paths: HostPaths,
    /// Previous `/proc/stat` counters for delta-based CPU%.
    prev_cpu: Mutex<Option<CpuCounters>>,
}

impl LocalCollector {
    pub fn new() -> Self {
        Self::with_paths(HostPaths::default())
    }

    pub fn with_paths(paths: HostPaths) -> Self {
        Self {
            paths,
            prev_cpu: Mutex::new(None),
        }
    }

    pub fn sys_root(&self) -> &Path {
        &self.paths.sys_root
    }

    fn proc_path(&self, rel: &str) -> PathBuf {
        self.paths.proc_root.join(rel)
    }

    /// CPU% since the previous call; the first call reports 0.
    async fn cpu_percent(&self) -> Result<f64, CoreError> {
        let stat = tokio::fs::read_to_string(self.proc_path("stat")).await?;
        let line = stat
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| CoreError::Parse("no aggregate cpu line in /proc/stat".into()))?;
        let counters = parse_cpu_line(line);

        let mut prev = self.prev_cpu.lock().unwrap_or_else(PoisonError::into_inner);
        let percent = match prev.as_ref() {
            Some(p) => cpu_percent_from_delta(p, &counters),
            None => 0.0,
        };
        *prev = Some(counters);
        Ok(percent)
    }

    async fn meminfo(&self) -> Result<(u64, u64, f64), CoreError> {
        let meminfo = tokio::fs::read_to_string(self.proc_path("meminfo")).await?;
        Ok(memory_used_percent(&meminfo))
    }

    /// First thermal zone in °C, `None` when the host has none.
    pub async fn temperature(&self) -> Option<f64> {
        let thermal = self.paths.sys_root.join("class").join("thermal");
        let zone = first_entry(&thermal, |name| name.starts_with("thermal_zone")).await?;
        let raw = tokio::fs::read_to_string(zone.join("temp")).await.ok()?;
        parse_thermal_millidegrees(&raw)
    }

    pub async fn interfaces(&self) -> Result<Vec<InterfaceCounters>, CoreError> {
        let content = tokio::fs::read_to_string(self.proc_path("net/dev")).await?;
        Ok(parse_net_dev(&content))
    }

    /// The first power supply of type `Battery` (or, failing that, the
    /// first one exposing a `capacity` file).
    async fn battery_dir(&self) -> Option<PathBuf> {
        let supplies = self.paths.sys_root.join("class").join("power_supply");
        let mut names = list_dir_names(&supplies).await;
        names.sort();

        let mut fallback = None;
        for name in names {
            let dir = supplies.join(&name);
            if let Ok(kind) = tokio::fs::read_to_string(dir.join("type")).await {
                if kind.trim().eq_ignore_ascii_case("battery") {
                    return Some(dir);
                }
            }
            if fallback.is_none() && tokio::fs::metadata(dir.join("capacity")).await.is_ok() {
                fallback = Some(dir);
            }
        }
        fallback
    }

    /// The `system` section. `cpu_usage` comes from the newest history
    /// sample so status requests don't disturb the delta baseline.
    pub async fn system_info(&self, cpu_usage: f64) -> Result<SystemInfo, CoreError> {
        let (mem_total_kb, mem_available_kb, mem_percent) = self.meminfo().await?;
        let mem_used_kb = mem_total_kb.saturating_sub(mem_available_kb);

        let disk = match run_program("df", &["-Pk", "/"]).await {
            Ok(out) => parse_df_output(&out),
            Err(e) => {
                debug!("df failed: {e}");
                Default::default()
            }
        };

        let hostname = read_trimmed(&self.proc_path("sys/kernel/hostname"))
            .await
            .unwrap_or_else(|| "unknown".to_string());
        let kernel = read_trimmed(&self.proc_path("sys/kernel/osrelease"))
            .await
            .unwrap_or_else(|| "N/A".to_string());
        let uptime = tokio::fs::read_to_string(self.proc_path("uptime"))
            .await
            .ok()
            .and_then(|s| s.split_whitespace().next()?.parse::<f64>().ok())
            .map(|secs| format_uptime(secs as u64))
            .unwrap_or_else(|| "N/A".to_string());
        let os = tokio::fs::read_to_string(&self.paths.os_release)
            .await
            .ok()
            .and_then(|c| parse_os_release_name(&c))
            .unwrap_or_else(|| "N/A".to_string());

        Ok(SystemInfo {
            hostname,
            uptime,
            kernel,
            os,
            cpu_usage,
            memory: UsageGb {
                total: round2(mem_total_kb as f64 / KIB_PER_GIB),
                used: round2(mem_used_kb as f64 / KIB_PER_GIB),
                percent: round1(mem_percent),
            },
            disk: UsageGb {
                total: round2(disk.total_kb as f64 / KIB_PER_GIB),
                used: round2(disk.used_kb as f64 / KIB_PER_GIB),
                percent: disk.used_percent,
            },
            temperature: self.temperature().await,
        })
    }

    /// The `network` section: IPv4 addresses and per-interface totals.
    pub async fn network_info(&self) -> Result<NetworkInfo, CoreError> {
        let ifaces = self.interfaces().await?;
        let ip_address = match run_program("ip", &["-o", "-4", "addr", "show"]).await {
            Ok(out) => parse_ipv4_addrs(&out).join("\n"),
            Err(e) => {
                debug!("ip addr failed: {e}");
                String::new()
            }
        };
        let interfaces = ifaces
            .into_iter()
            .map(|i| {
                (
                    i.name,
                    InterfaceTraffic {
                        bytes_sent: round2(i.tx_bytes as f64 / BYTES_PER_MIB),
                        bytes_recv: round2(i.rx_bytes as f64 / BYTES_PER_MIB),
                    },
                )
            })
            .collect();
        Ok(NetworkInfo {
            ip_address,
            interfaces,
        })
    }

    /// `systemctl is-active` for each service; the text is reported as-is.
    pub async fn services(&self, names: &[&str]) -> BTreeMap<String, String> {
        let mut status = BTreeMap::new();
        for name in names {
            let state = run_command(&format!("systemctl is-active {name}")).await;
            status.insert(name.to_string(), state);
        }
        status
    }
}

impl Default for LocalCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SystemSampler for LocalCollector {
    /// Each field degrades on its own: unreadable CPU or memory counters
    /// record 0, missing network counters record no rate.
    async fn sample_metrics(&self) -> Result<MetricsSnapshot, CoreError> {
        let cpu_percent = self.cpu_percent().await.unwrap_or_else(|e| {
            debug!("CPU counters unavailable: {e}");
            0.0
        });
        let memory_percent = match self.meminfo().await {
            Ok((_, _, percent)) => percent,
            Err(e) => {
                debug!("Memory info unavailable: {e}");
                0.0
            }
        };
        let network = match self.interfaces().await {
            Ok(ifaces) => Some(NetworkCounters::total(&ifaces)),
            Err(e) => {
                debug!("Network counters unavailable: {e}");
                None
            }
        };
        Ok(MetricsSnapshot {
            cpu_percent,
            memory_percent,
            temperature_celsius: self.temperature().await,
            network,
        })
    }

    async fn sample_battery(&self) -> Result<BatteryReading, CoreError> {
        let dir = self
            .battery_dir()
            .await
            .ok_or_else(|| CoreError::Unavailable("no battery power supply".into()))?;
        let capacity = tokio::fs::read_to_string(dir.join("capacity"))
            .await
            .ok()
            .and_then(|c| parse_capacity(&c));
        let status = read_trimmed(&dir.join("status")).await;
        Ok(BatteryReading { capacity, status })
    }
}

/// Extract IPv4 addresses (without prefix length) from `ip -o -4 addr show`,
/// skipping loopback.
pub fn parse_ipv4_addrs(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            parts.find(|p| *p == "inet")?;
            let addr = parts.next()?.split('/').next()?;
            (addr != "127.0.0.1").then(|| addr.to_string())
        })
        .collect()
}

/// Render seconds the way `uptime -p` does: `up 2 days, 3 hours, 5 minutes`.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;

    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(plural(days, "day"));
    }
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(plural(minutes, "minute"));
    }
    format!("up {}", parts.join(", "))
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn list_dir_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names
}

/// Alphabetically first entry of `dir` whose name satisfies `pred`.
pub(crate) async fn first_entry(dir: &Path, pred: impl Fn(&str) -> bool) -> Option<PathBuf> {
    let mut names: Vec<String> = list_dir_names(dir)
        .await
        .into_iter()
        .filter(|n| pred(n))
        .collect();
    names.sort();
    names.first().map(|n| dir.join(n))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:    1024      20    0    0    0     0          0         0     1024      20    0    0    0     0       0          0
 wlan0: 2097152    8000    0    0    0     0          0         0  1048576    5000    0    0    0     0       0          0
";

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Build a fake `/proc` + `/sys` tree.
    fn fake_host() -> (TempDir, LocalCollector) {
        let tmp = TempDir::new().unwrap();
        let proc_root = tmp.path().join("proc");
        let sys_root = tmp.path().join("sys");

        write(&proc_root.join("stat"), "cpu  100 0 100 800 0 0 0 0\ncpu0 1 2 3 4\n");
        write(
            &proc_root.join("meminfo"),
            "MemTotal:       2097152 kB\nMemFree:   100 kB\nMemAvailable:   1048576 kB\n",
        );
        write(&proc_root.join("net/dev"), NET_DEV);
        write(&proc_root.join("uptime"), "7380.25 1000.00\n");
        write(&proc_root.join("sys/kernel/hostname"), "pi-host\n");
        write(&proc_root.join("sys/kernel/osrelease"), "6.1.0-test\n");
        write(&sys_root.join("class/thermal/thermal_zone0/temp"), "47250\n");
        write(&sys_root.join("class/thermal/thermal_zone1/temp"), "99000\n");
        write(&sys_root.join("class/power_supply/AC/type"), "Mains\n");
        write(&sys_root.join("class/power_supply/BAT0/type"), "Battery\n");
        write(&sys_root.join("class/power_supply/BAT0/capacity"), "76\n");
        write(&sys_root.join("class/power_supply/BAT0/status"), "Discharging\n");

        let collector = LocalCollector::with_paths(HostPaths {
            proc_root,
            sys_root,
            os_release: tmp.path().join("os-release"),
        });
        (tmp, collector)
    }

    #[tokio::test]
    async fn sample_metrics_reads_fake_host() {
        let (tmp, collector) = fake_host();

        let first = collector.sample_metrics().await.unwrap();
        assert_eq!(first.cpu_percent, 0.0);
        assert!((first.memory_percent - 50.0).abs() < 0.001);
        assert_eq!(first.temperature_celsius, Some(47.3));
        let net = first.network.unwrap();
        assert_eq!(net.rx_bytes, 1024 + 2097152);
        assert_eq!(net.tx_bytes, 1024 + 1048576);

        write(&tmp.path().join("proc/stat"), "cpu  150 0 150 900 0 0 0 0\n");
        let second = collector.sample_metrics().await.unwrap();
        assert!((second.cpu_percent - 50.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn sample_metrics_without_proc_degrades_to_zero() {
        let tmp = TempDir::new().unwrap();
        let collector = LocalCollector::with_paths(HostPaths {
            proc_root: tmp.path().join("missing-proc"),
            sys_root: tmp.path().join("missing-sys"),
            os_release: tmp.path().join("os-release"),
        });
        let snapshot = collector.sample_metrics().await.unwrap();
        assert_eq!(snapshot.cpu_percent, 0.0);
        assert_eq!(snapshot.memory_percent, 0.0);
        assert_eq!(snapshot.temperature_celsius, None);
        assert_eq!(snapshot.network, None);
        assert!(matches!(
            collector.sample_battery().await,
            Err(CoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn sample_metrics_keeps_readable_fields() {
        let (tmp, collector) = fake_host();
        std::fs::remove_file(tmp.path().join("proc/stat")).unwrap();
        let snapshot = collector.sample_metrics().await.unwrap();
        assert_eq!(snapshot.cpu_percent, 0.0);
        assert!((snapshot.memory_percent - 50.0).abs() < 0.001);
        assert!(snapshot.network.is_some());
    }

    #[tokio::test]
    async fn sample_battery_prefers_battery_type() {
        let (_tmp, collector) = fake_host();
        let reading = collector.sample_battery().await.unwrap();
        assert_eq!(reading.capacity, Some(76));
        assert_eq!(reading.status.as_deref(), Some("Discharging"));
    }

    #[tokio::test]
    async fn sample_battery_falls_back_to_capacity_file() {
        let (tmp, collector) = fake_host();
        let supplies = tmp.path().join("sys/class/power_supply");
        std::fs::remove_dir_all(supplies.join("BAT0")).unwrap();
        write(&supplies.join("qcom-battery/capacity"), "42\n");
        let reading = collector.sample_battery().await.unwrap();
        assert_eq!(reading.capacity, Some(42));
        assert_eq!(reading.status, None);
    }

    #[tokio::test]
    async fn system_info_reads_proc_files() {
        let (_tmp, collector) = fake_host();
        let info = collector.system_info(12.5).await.unwrap();
        assert_eq!(info.hostname, "pi-host");
        assert_eq!(info.kernel, "6.1.0-test");
        assert_eq!(info.uptime, "up 2 hours, 3 minutes");
        assert_eq!(info.os, "N/A");
        assert_eq!(info.cpu_usage, 12.5);
        assert_eq!(info.memory.total, 2.0);
        assert_eq!(info.memory.used, 1.0);
        assert_eq!(info.memory.percent, 50.0);
        assert_eq!(info.temperature, Some(47.3));
    }

    #[tokio::test]
    async fn network_info_reports_mib() {
        let (_tmp, collector) = fake_host();
        let info = collector.network_info().await.unwrap();
        let wlan = &info.interfaces["wlan0"];
        assert_eq!(wlan.bytes_recv, 2.0);
        assert_eq!(wlan.bytes_sent, 1.0);
        assert!(info.interfaces.contains_key("lo"));
    }

    #[test]
    fn parse_ipv4_addrs_skips_loopback() {
        let output = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
3: wlan0    inet 192.168.1.42/24 brd 192.168.1.255 scope global dynamic wlan0\\       valid_lft 1234sec
4: tailscale0    inet 100.64.0.7/32 scope global tailscale0";
        assert_eq!(parse_ipv4_addrs(output), vec!["192.168.1.42", "100.64.0.7"]);
        assert!(parse_ipv4_addrs("").is_empty());
    }

    #[test]
    fn format_uptime_matches_uptime_p() {
        assert_eq!(format_uptime(0), "up 0 minutes");
        assert_eq!(format_uptime(60), "up 1 minute");
        assert_eq!(format_uptime(3600), "up 1 hour");
        assert_eq!(format_uptime(90_061), "up 1 day, 1 hour, 1 minute");
        assert_eq!(format_uptime(2 * 86_400 + 5 * 60), "up 2 days, 5 minutes");
    }

    #[test]
    fn system_info_serializes_missing_temperature_as_na() {
        let info = SystemInfo {
            hostname: "h".into(),
            uptime: "up 1 minute".into(),
            kernel: "k".into(),
            os: "o".into(),
            cpu_usage: 0.0,
            memory: UsageGb {
                total: 1.0,
                used: 0.5,
                percent: 50.0,
            },
            disk: UsageGb {
                total: 0.0,
                used: 0.0,
                percent: 0.0,
            },
            temperature: None,
        };
        let v = serde_json::to_value(info).unwrap();
        assert_eq!(v["temperature"], "N/A");
        assert_eq!(v["memory"]["percent"], 50.0);
    }
}
