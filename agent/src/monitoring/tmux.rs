//! tmux session discovery.

use serde::Serialize;
use tracing::debug;

use hostpulse_core::history::format_minutes;

use crate::command::run_program;

const SESSION_FORMAT: &str =
    "#{session_name}\t#{session_attached}\t#{session_windows}\t#{session_created}";
const WINDOW_FORMAT: &str = "#{window_name}\t#{window_active}\t#{window_panes}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TmuxWindow {
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TmuxSession {
    pub name: String,
    pub attached: bool,
    pub windows: u32,
    pub panes: u32,
    pub uptime: String,
    pub window_list: Vec<TmuxWindow>,
}

/// One `list-sessions` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLine {
    pub name: String,
    pub attached: bool,
    pub windows: u32,
    /// Unix seconds.
    pub created: i64,
}

/// Sessions of the local tmux server; empty when tmux is missing or no
/// server is running.
pub async fn list_sessions() -> Vec<TmuxSession> {
    let output = match run_program("tmux", &["list-sessions", "-F", SESSION_FORMAT]).await {
        Ok(out) => out,
        Err(e) => {
            debug!("tmux list-sessions: {e}");
            return Vec::new();
        }
    };

    let now = chrono::Utc::now().timestamp();
    let mut sessions = Vec::new();
    for line in parse_sessions(&output) {
        let windows_out =
            run_program("tmux", &["list-windows", "-t", &line.name, "-F", WINDOW_FORMAT])
                .await
                .unwrap_or_default();
        let (window_list, panes) = parse_windows(&windows_out);
        sessions.push(TmuxSession {
            uptime: session_uptime(line.created, now),
            name: line.name,
            attached: line.attached,
            windows: line.windows,
            panes,
            window_list,
        });
    }
    sessions
}

pub fn parse_sessions(output: &str) -> Vec<SessionLine> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?.to_string();
            if name.is_empty() {
                return None;
            }
            let attached = fields.next()?.trim().parse::<u32>().unwrap_or(0) > 0;
            let windows = fields.next()?.trim().parse().unwrap_or(0);
            let created = fields.next()?.trim().parse().unwrap_or(0);
            Some(SessionLine {
                name,
                attached,
                windows,
                created,
            })
        })
        .collect()
}

/// Windows of one session plus the session's total pane count.
pub fn parse_windows(output: &str) -> (Vec<TmuxWindow>, u32) {
    let mut windows = Vec::new();
    let mut panes = 0;
    for line in output.lines() {
        let mut fields = line.split('\t');
        let (Some(name), Some(active)) = (fields.next(), fields.next()) else {
            continue;
        };
        panes += fields
            .next()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(0);
        windows.push(TmuxWindow {
            name: name.to_string(),
            active: active.trim() == "1",
        });
    }
    (windows, panes)
}

fn session_uptime(created: i64, now: i64) -> String {
    let minutes = (now - created).max(0) / 60;
    format_minutes(u32::try_from(minutes).unwrap_or(u32::MAX))
}
