//! Live status endpoints: full status, quick stats, brightness, tmux, the
//! subscription account and the guarded reboot.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use hostpulse_core::history::BatteryEstimate;
use hostpulse_core::monitoring::types::na_if_none;
use hostpulse_core::monitoring::{BatteryReading, SystemSampler};

use crate::command::run_command;
use crate::monitoring::backlight::{BrightnessError, BrightnessInfo};
use crate::monitoring::collector::WATCHED_SERVICES;
use crate::monitoring::tmux::{self, TmuxSession};
use crate::subscription::SubscriptionStatus;

use super::{failure, local_timestamp, AppState};

const REBOOT_COMMAND: &str = "sudo reboot";

#[derive(Serialize)]
pub(super) struct StatusResponse {
    battery: BatteryReading,
    battery_estimate: Option<BatteryEstimate>,
    brightness: BrightnessInfo,
    system: Value,
    network: Value,
    services: Value,
    timestamp: String,
}

#[derive(Serialize)]
pub(super) struct QuickStats {
    battery: BatteryReading,
    #[serde(serialize_with = "na_if_none")]
    cpu: Option<f64>,
    #[serde(serialize_with = "na_if_none")]
    memory: Option<f64>,
    #[serde(serialize_with = "na_if_none")]
    temperature: Option<f64>,
    timestamp: String,
}

#[derive(Serialize)]
pub(super) struct TmuxResponse {
    sessions: Vec<TmuxSession>,
    total: usize,
}

#[derive(Deserialize)]
pub(super) struct RebootParams {
    token: Option<String>,
}

async fn battery_now(state: &AppState) -> BatteryReading {
    state
        .collector
        .sample_battery()
        .await
        .unwrap_or_else(|_| BatteryReading::unavailable())
}

/// Section value, or `{"error": msg}` when it couldn't be gathered.
fn section<T: Serialize, E: std::fmt::Display>(result: Result<T, E>) -> Value {
    match result {
        Ok(v) => serde_json::to_value(v).unwrap_or_else(|e| json!({"error": e.to_string()})),
        Err(e) => {
            warn!("Status section failed: {e}");
            json!({"error": e.to_string()})
        }
    }
}

pub(super) async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let cpu_usage = state
        .history
        .latest_sample()
        .map(|s| s.cpu_percent)
        .unwrap_or(0.0);

    Json(StatusResponse {
        battery: battery_now(&state).await,
        battery_estimate: state.history.battery_estimate(),
        brightness: state.backlight.read().await,
        system: section(state.collector.system_info(cpu_usage).await),
        network: section(state.collector.network_info().await),
        services: json!(state.collector.services(WATCHED_SERVICES).await),
        timestamp: local_timestamp(),
    })
}

pub(super) async fn quick_stats(State(state): State<Arc<AppState>>) -> Json<QuickStats> {
    let latest = state.history.latest_sample();
    Json(QuickStats {
        battery: battery_now(&state).await,
        cpu: latest.as_ref().map(|s| s.cpu_percent),
        memory: latest.as_ref().map(|s| s.memory_percent),
        temperature: latest.and_then(|s| s.temperature_celsius),
        timestamp: local_timestamp(),
    })
}

pub(super) async fn set_brightness(
    State(state): State<Arc<AppState>>,
    Path(value): Path<String>,
) -> Response {
    let Some(percent) = value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|v| (0..=100).contains(v))
        .and_then(|v| u8::try_from(v).ok())
    else {
        return failure(StatusCode::OK, BrightnessError::OutOfRange);
    };

    match state.backlight.set_percent(percent).await {
        Ok(_) => Json(json!({"success": true, "value": percent})).into_response(),
        Err(e) => {
            warn!("Brightness change failed: {e}");
            failure(StatusCode::OK, e)
        }
    }
}

pub(super) async fn tmux_sessions() -> Json<TmuxResponse> {
    let sessions = tmux::list_sessions().await;
    Json(TmuxResponse {
        total: sessions.len(),
        sessions,
    })
}

pub(super) async fn subscription(State(state): State<Arc<AppState>>) -> Json<SubscriptionStatus> {
    Json(state.subscription.status().await)
}

/// Reboot the host. Requires the token of a live terminal session.
pub(super) async fn reboot(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RebootParams>,
) -> Response {
    let token = params.token.unwrap_or_default();
    if let Err(e) = state.terminal.validate(&token).await {
        return failure(StatusCode::UNAUTHORIZED, e);
    }

    info!("Reboot requested");
    tokio::spawn(async {
        let out = run_command(REBOOT_COMMAND).await;
        if !out.is_empty() {
            warn!("Reboot command: {out}");
        }
    });
    Json(json!({"success": true, "message": "Rebooting..."})).into_response()
}
