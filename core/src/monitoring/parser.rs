//! Parsers for the Linux pseudo-files and command output the local
//! collector reads.
//!
//! All parsers are total: malformed fields fall back to zero (or `None`
//! where absence is meaningful) so a single odd line never fails a tick.

use super::types::{CpuCounters, DiskUsage, InterfaceCounters};

/// Compute CPU usage percentage from the delta between two counter snapshots.
/// Returns a value between 0.0 and 100.0.
pub fn cpu_percent_from_delta(prev: &CpuCounters, curr: &CpuCounters) -> f64 {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = curr.idle_total().saturating_sub(prev.idle_total());
    let active_delta = total_delta.saturating_sub(idle_delta);
    (active_delta as f64 / total_delta as f64) * 100.0
}

/// Parse the aggregate `cpu` line from `/proc/stat`.
///
/// Format: `cpu  user nice system idle iowait irq softirq steal [guest guest_nice]`
pub fn parse_cpu_line(line: &str) -> CpuCounters {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let field = |i: usize| parts.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);
    CpuCounters {
        user: field(1),
        nice: field(2),
        system: field(3),
        idle: field(4),
        iowait: field(5),
        irq: field(6),
        softirq: field(7),
        steal: field(8),
    }
}

/// Extract the numeric kB value from a `/proc/meminfo` line like
/// `"MemTotal:       16384000 kB"`.
pub fn parse_meminfo_value(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Return `(total_kb, available_kb, used_percent)` from `/proc/meminfo`.
pub fn memory_used_percent(meminfo: &str) -> (u64, u64, f64) {
    let mut total_kb = 0;
    let mut available_kb = 0;
    for line in meminfo.lines() {
        if line.starts_with("MemTotal:") {
            total_kb = parse_meminfo_value(line);
        } else if line.starts_with("MemAvailable:") {
            available_kb = parse_meminfo_value(line);
        }
    }
    let percent = if total_kb > 0 {
        let used = total_kb.saturating_sub(available_kb);
        (used as f64 / total_kb as f64) * 100.0
    } else {
        0.0
    };
    (total_kb, available_kb, percent)
}

/// Parse `df -Pk` output for the first data line.
pub fn parse_df_output(output: &str) -> DiskUsage {
    for line in output.lines() {
        if line.starts_with("Filesystem") || line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 5 {
            return DiskUsage {
                total_kb: parts[1].parse().unwrap_or(0),
                used_kb: parts[2].parse().unwrap_or(0),
                used_percent: parts[4].trim_end_matches('%').parse().unwrap_or(0.0),
            };
        }
    }
    DiskUsage::default()
}

/// Parse `/proc/net/dev` into per-interface byte counters.
///
/// ```text
/// Inter-|   Receive                                  |  Transmit
///  face |bytes    packets errs drop fifo frame ...   |bytes    packets ...
///  wlan0: 123456   789    0    0    0     0  ...       654321   432 ...
/// ```
pub fn parse_net_dev(content: &str) -> Vec<InterfaceCounters> {
    content
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() || name.contains('|') {
                return None;
            }
            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.len() < 9 {
                return None;
            }
            Some(InterfaceCounters {
                name: name.to_string(),
                rx_bytes: fields[0].parse().unwrap_or(0),
                tx_bytes: fields[8].parse().unwrap_or(0),
            })
        })
        .collect()
}

/// Convert a thermal zone reading in millidegrees to °C rounded to one
/// decimal. Non-numeric content yields `None`.
pub fn parse_thermal_millidegrees(content: &str) -> Option<f64> {
    let raw: i64 = content.trim().parse().ok()?;
    Some((raw as f64 / 100.0).round() / 10.0)
}

/// Parse a power-supply `capacity` file, clamping to 0..=100.
pub fn parse_capacity(content: &str) -> Option<u8> {
    let raw: i64 = content.trim().parse().ok()?;
    Some(raw.clamp(0, 100) as u8)
}

/// Extract `PRETTY_NAME` from `/etc/os-release`, without quotes.
pub fn parse_os_release_name(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').to_string())
}
