//! Display backlight control through `/sys/class/backlight`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use hostpulse_core::monitoring::types::na_if_none;

use crate::command::{run_shell, COMMAND_TIMEOUT};

use super::collector::first_entry;

#[derive(Error, Debug)]
pub enum BrightnessError {
    #[error("Value must be between 0 and 100")]
    OutOfRange,

    #[error("No backlight device found")]
    NoDevice,

    #[error("Failed to write brightness: {0}")]
    Write(String),
}

/// Current backlight state; missing device fields serialize as `"N/A"`.
#[derive(Debug, Clone, Serialize)]
pub struct BrightnessInfo {
    #[serde(serialize_with = "na_if_none")]
    pub current: Option<u32>,
    #[serde(serialize_with = "na_if_none")]
    pub max: Option<u32>,
    pub percentage: f64,
}

pub struct Backlight {
    class_dir: PathBuf,
}

impl Backlight {
    pub fn new(sys_root: &Path) -> Self {
        Self {
            class_dir: sys_root.join("class").join("backlight"),
        }
    }

    async fn device_dir(&self) -> Option<PathBuf> {
        first_entry(&self.class_dir, |_| true).await
    }

    pub async fn read(&self) -> BrightnessInfo {
        let Some(dir) = self.device_dir().await else {
            return BrightnessInfo {
                current: None,
                max: None,
                percentage: 0.0,
            };
        };
        let current = read_u32(&dir.join("brightness")).await;
        let max = read_u32(&dir.join("max_brightness")).await;
        let percentage = match (current, max) {
            (Some(c), Some(m)) if m > 0 => (c as f64 / m as f64 * 1000.0).round() / 10.0,
            _ => 0.0,
        };
        BrightnessInfo {
            current,
            max,
            percentage,
        }
    }

    /// Set brightness to `percent` of the device maximum and return the raw
    /// value written.
    ///
    /// Writes the sysfs file directly and falls back to `sudo tee` when the
    /// agent lacks permission.
    pub async fn set_percent(&self, percent: u8) -> Result<u32, BrightnessError> {
        if percent > 100 {
            return Err(BrightnessError::OutOfRange);
        }
        let dir = self.device_dir().await.ok_or(BrightnessError::NoDevice)?;
        let max = read_u32(&dir.join("max_brightness"))
            .await
            .ok_or(BrightnessError::NoDevice)?;
        let raw = raw_brightness(percent, max);
        let path = dir.join("brightness");

        match tokio::fs::write(&path, raw.to_string()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                debug!("Direct brightness write denied, using sudo tee");
                let cmd = format!("echo {raw} | sudo -n tee '{}'", path.display());
                let output = run_shell(&cmd, None, COMMAND_TIMEOUT)
                    .await
                    .map_err(|e| BrightnessError::Write(e.to_string()))?;
                if !output.success {
                    return Err(BrightnessError::Write(output.stderr.trim().to_string()));
                }
            }
            Err(e) => return Err(BrightnessError::Write(e.to_string())),
        }

        info!(percent, raw, "Brightness set");
        Ok(raw)
    }
}

/// Raw device value for `percent` of `max`, rounded to the nearest step.
pub fn raw_brightness(percent: u8, max: u32) -> u32 {
    ((percent as u64 * max as u64 + 50) / 100) as u32
}

async fn read_u32(path: &Path) -> Option<u32> {
    tokio::fs::read_to_string(path)
        .await
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_backlight(current: u32, max: u32) -> (TempDir, Backlight) {
        let tmp = TempDir::new().unwrap();
        let dev = tmp.path().join("class/backlight/rpi_backlight");
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join("brightness"), format!("{current}\n")).unwrap();
        std::fs::write(dev.join("max_brightness"), format!("{max}\n")).unwrap();
        let backlight = Backlight::new(tmp.path());
        (tmp, backlight)
    }

    #[test]
    fn raw_brightness_rounds() {
        assert_eq!(raw_brightness(50, 255), 128);
        assert_eq!(raw_brightness(20, 7), 1);
        assert_eq!(raw_brightness(0, 255), 0);
        assert_eq!(raw_brightness(100, 255), 255);
        assert_eq!(raw_brightness(33, 10), 3);
    }

    #[tokio::test]
    async fn read_reports_percentage() {
        let (_tmp, backlight) = fake_backlight(128, 255);
        let info = backlight.read().await;
        assert_eq!(info.current, Some(128));
        assert_eq!(info.max, Some(255));
        assert_eq!(info.percentage, 50.2);
    }

    #[tokio::test]
    async fn read_without_device_is_na() {
        let tmp = TempDir::new().unwrap();
        let info = Backlight::new(tmp.path()).read().await;
        let v = serde_json::to_value(info).unwrap();
        assert_eq!(v["current"], "N/A");
        assert_eq!(v["max"], "N/A");
        assert_eq!(v["percentage"], 0.0);
    }

    #[tokio::test]
    async fn set_percent_writes_raw_value() {
        let (tmp, backlight) = fake_backlight(10, 200);
        let raw = backlight.set_percent(75).await.unwrap();
        assert_eq!(raw, 150);
        let written = std::fs::read_to_string(
            tmp.path().join("class/backlight/rpi_backlight/brightness"),
        )
        .unwrap();
        assert_eq!(written.trim(), "150");
    }

    #[tokio::test]
    async fn set_percent_rejects_out_of_range() {
        let (_tmp, backlight) = fake_backlight(10, 200);
        let err = backlight.set_percent(101).await.unwrap_err();
        assert_eq!(err.to_string(), "Value must be between 0 and 100");
    }

    #[tokio::test]
    async fn set_percent_without_device() {
        let tmp = TempDir::new().unwrap();
        let err = Backlight::new(tmp.path()).set_percent(10).await.unwrap_err();
        assert!(matches!(err, BrightnessError::NoDevice));
    }
}
