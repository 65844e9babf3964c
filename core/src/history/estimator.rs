//! Battery-life estimation over the long-horizon series.
//!
//! The estimate is a two-point slope over the newest records that share
//! the current charge status. Mixed charge/discharge windows are filtered
//! rather than averaged, so a plug-in event never flips the sign of the
//! rate.

use serde::Serialize;

use super::records::BatteryRecord;
use crate::monitoring::ChargeStatus;

/// Number of newest records considered (about one hour at the default
/// ten-minute interval).
pub const ESTIMATE_WINDOW: usize = 6;

/// Text reported when the capacity has not moved across the window.
pub const STABLE: &str = "Stable";

/// A confident charge or discharge projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryEstimate {
    pub status: ChargeStatus,
    /// Percent per hour, always non-negative, one decimal.
    pub rate_per_hour: f64,
    /// Human-readable time left (`"1h 10m"`, `"45m"`) or `"Stable"`.
    #[serde(rename = "estimate")]
    pub estimate_text: String,
    /// Minutes until empty (discharging) or full (charging).
    pub minutes_remaining: Option<u32>,
}

/// Estimate time to empty/full from `series` (oldest first).
///
/// Returns `None` when there is no confident estimate: too few records,
/// less than a minute of data, or a slope that contradicts the reported
/// status (sensor noise).
pub fn estimate(series: &[BatteryRecord]) -> Option<BatteryEstimate> {
    if series.len() < 2 {
        return None;
    }

    let window = &series[series.len().saturating_sub(ESTIMATE_WINDOW)..];
    let current = window.last()?;
    let status = current.status;

    let matching: Vec<&BatteryRecord> = window.iter().filter(|r| r.status == status).collect();
    if matching.len() < 2 {
        return None;
    }
    let first = matching[0];
    let last = matching[matching.len() - 1];

    let elapsed_minutes = (last.timestamp - first.timestamp).num_seconds() as f64 / 60.0;
    if elapsed_minutes < 1.0 {
        return None;
    }

    let capacity_delta = first.capacity as f64 - last.capacity as f64;
    let rate_per_minute = capacity_delta / elapsed_minutes;

    if rate_per_minute == 0.0 {
        return Some(BatteryEstimate {
            status,
            rate_per_hour: 0.0,
            estimate_text: STABLE.to_string(),
            minutes_remaining: None,
        });
    }

    let (rate, minutes) = match status {
        ChargeStatus::Discharging if rate_per_minute > 0.0 => {
            (rate_per_minute, current.capacity as f64 / rate_per_minute)
        }
        ChargeStatus::Charging if rate_per_minute < 0.0 => {
            let charge_rate = -rate_per_minute;
            (charge_rate, (100.0 - current.capacity as f64) / charge_rate)
        }
        _ => return None,
    };

    let minutes = minutes.round().max(0.0) as u32;
    Some(BatteryEstimate {
        status,
        rate_per_hour: (rate * 60.0 * 10.0).round() / 10.0,
        estimate_text: format_minutes(minutes),
        minutes_remaining: Some(minutes),
    })
}

/// Render minutes as `"<h>h <m>m"` from one hour up, else `"<m>m"`.
pub fn format_minutes(minutes: u32) -> String {
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
