//! Battery history persistence across agent restarts.
//!
//! The long-horizon series is stored as one JSON array in
//! `battery_history.json`, rewritten wholesale on every append. Writes go
//! to a sibling temp file first and are renamed into place, so a crash
//! mid-write leaves the previous file intact.

use std::path::{Path, PathBuf};

use hostpulse_core::history::BatteryRecord;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HISTORY_FILE_NAME: &str = "battery_history.json";

/// Location of the persisted battery series.
#[derive(Debug, Clone)]
pub struct BatteryHistoryFile {
    path: PathBuf,
}

impl BatteryHistoryFile {
    /// The history file inside `state_dir`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(HISTORY_FILE_NAME))
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted series.
    ///
    /// Returns an empty series if the file is missing or corrupt.
    pub fn load(&self) -> Vec<BatteryRecord> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<Vec<BatteryRecord>>(&contents) {
                Ok(records) => {
                    debug!(
                        "Loaded {} battery records from {}",
                        records.len(),
                        self.path.display()
                    );
                    records
                }
                Err(e) => {
                    warn!(
                        "Failed to parse battery history from {}: {}",
                        self.path.display(),
                        e
                    );
                    Vec::new()
                }
            },
            Err(_) => {
                debug!("No battery history file at {}", self.path.display());
                Vec::new()
            }
        }
    }

    /// Overwrite the file with `records`.
    pub fn save(&self, records: &[BatteryRecord]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

/// Write the battery series every time the store publishes a new one.
///
/// Runs until `cancel` fires or the store is dropped. Write failures are
/// logged and the worker keeps going; the next append retries with the
/// full series.
pub async fn run_persistence_worker(
    mut rx: watch::Receiver<Vec<BatteryRecord>>,
    file: BatteryHistoryFile,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Persistence worker cancelled");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("History store dropped, stopping persistence worker");
                    break;
                }
                let records = rx.borrow_and_update().clone();
                let target = file.clone();
                let result = tokio::task::spawn_blocking(move || target.save(&records)).await;
                match result {
                    Ok(Ok(())) => debug!("Persisted battery history to {}", file.path().display()),
                    Ok(Err(e)) => warn!(
                        "Failed to write battery history to {}: {}",
                        file.path().display(),
                        e
                    ),
                    Err(e) => warn!("Battery history write task panicked: {}", e),
                }
            }
        }
    }
    info!("Persistence worker stopped");
}
