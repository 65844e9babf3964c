//! HTTP facade: JSON endpoints over the shared history, collectors and
//! terminal sessions, with the dashboard's static assets as fallback.

mod history;
mod status;
mod terminal;

use std::path::Path;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

use hostpulse_core::history::HistoryStore;

use crate::monitoring::backlight::Backlight;
use crate::monitoring::collector::LocalCollector;
use crate::subscription::SubscriptionClient;
use crate::terminal::TerminalSessionManager;

/// Everything the handlers share. Built once in `main`.
pub struct AppState {
    pub history: Arc<HistoryStore>,
    pub collector: Arc<LocalCollector>,
    pub backlight: Backlight,
    pub terminal: Arc<TerminalSessionManager>,
    pub subscription: SubscriptionClient,
}

pub fn build_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/status", get(status::status))
        .route("/api/quick-stats", get(status::quick_stats))
        .route("/api/brightness/set/:value", get(status::set_brightness))
        .route("/api/tmux", get(status::tmux_sessions))
        .route("/api/iptv", get(status::subscription))
        .route("/api/reboot", get(status::reboot))
        .route("/api/battery/history", get(history::battery_history))
        .route("/api/metrics/history", get(history::metrics_history))
        .route("/api/terminal/login", post(terminal::login))
        .route("/api/terminal/exec", post(terminal::exec))
        .route("/api/terminal/logout", post(terminal::logout))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    static_dir: &Path,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state, static_dir))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

/// `{success: false, error}` with `status`.
fn failure(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({"success": false, "error": error.to_string()})),
    )
        .into_response()
}

/// A malformed or missing JSON body as a JSON 400.
fn bad_body(rejection: JsonRejection) -> Response {
    failure(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// Local wall-clock time as shown on the dashboard.
fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    use hostpulse_core::history::HistoryConfig;
    use tempfile::TempDir;

    use crate::config::SubscriptionConfig;
    use crate::monitoring::collector::HostPaths;
    use crate::terminal::TerminalConfig;

    pub const PASSWORD: &str = "test-password";

    /// State over an empty fake host under `tmp`.
    pub fn test_state(tmp: &TempDir) -> Arc<AppState> {
        let sys_root = tmp.path().join("sys");
        let collector = LocalCollector::with_paths(HostPaths {
            proc_root: tmp.path().join("proc"),
            sys_root: sys_root.clone(),
            os_release: tmp.path().join("os-release"),
        });
        let mut terminal = TerminalConfig::new(PASSWORD);
        terminal.home = tmp.path().to_path_buf();

        Arc::new(AppState {
            history: Arc::new(HistoryStore::new(HistoryConfig::default())),
            collector: Arc::new(collector),
            backlight: Backlight::new(&sys_root),
            terminal: Arc::new(TerminalSessionManager::new(terminal)),
            subscription: SubscriptionClient::new(SubscriptionConfig {
                host: "http://127.0.0.1:1".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            })
            .unwrap(),
        })
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
