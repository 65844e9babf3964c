use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;

use hostpulse_core::history::{BatteryRecord, MetricsHistory};

use super::AppState;

pub(super) async fn battery_history(State(state): State<Arc<AppState>>) -> Json<Vec<BatteryRecord>> {
    Json(state.history.battery_history())
}

pub(super) async fn metrics_history(State(state): State<Arc<AppState>>) -> Json<MetricsHistory> {
    Json(state.history.metrics_history())
}
