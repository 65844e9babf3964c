use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::exec::{change_dir, parse_cd, run_in};
use super::TerminalError;

/// Session lifetime, measured from login (not sliding).
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

/// Limit for one terminal command.
pub const TERMINAL_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct TerminalConfig {
    pub password: String,
    /// Initial cwd of new sessions and the target of a bare `cd`.
    pub home: PathBuf,
    pub ttl: Duration,
    pub command_timeout: Duration,
}

impl TerminalConfig {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            ttl: SESSION_TTL,
            command_timeout: TERMINAL_COMMAND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub cwd: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminalOutput {
    pub output: String,
    pub cwd: String,
}

struct SessionState {
    cwd: PathBuf,
}

struct SessionEntry {
    created_at: DateTime<Utc>,
    state: Arc<Mutex<SessionState>>,
}

/// Token-keyed terminal sessions.
///
/// The table lock is only held to look up, insert or remove entries. Each
/// session has its own lock, held for the whole of a command, so calls on
/// one token run one at a time while different tokens run in parallel.
pub struct TerminalSessionManager {
    config: TerminalConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl TerminalSessionManager {
    pub fn new(config: TerminalConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Check `password` and open a session in the home directory.
    pub async fn login(&self, password: &str) -> Result<LoginResponse, TerminalError> {
        if !constant_time_eq(password.as_bytes(), self.config.password.as_bytes()) {
            debug!("Terminal login rejected");
            return Err(TerminalError::InvalidPassword);
        }

        let mut sessions = self.sessions.lock().await;
        let token = loop {
            let candidate = new_token();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(
            token.clone(),
            SessionEntry {
                created_at: Utc::now(),
                state: Arc::new(Mutex::new(SessionState {
                    cwd: self.config.home.clone(),
                })),
            },
        );
        info!("Terminal session opened ({} active)", sessions.len());

        Ok(LoginResponse {
            token,
            cwd: self.config.home.display().to_string(),
        })
    }

    /// Look up a live session, evicting it if its TTL has passed.
    async fn session(&self, token: &str) -> Result<Arc<Mutex<SessionState>>, TerminalError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get(token).ok_or(TerminalError::Unauthorized)?;
        if self.is_expired(entry.created_at, Utc::now()) {
            sessions.remove(token);
            info!("Terminal session expired");
            return Err(TerminalError::SessionExpired);
        }
        Ok(entry.state.clone())
    }

    fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX);
        now - created_at > ttl
    }

    /// Run `command` in the session's cwd.
    pub async fn exec(&self, token: &str, command: &str) -> Result<TerminalOutput, TerminalError> {
        let state = self.session(token).await?;
        let mut state = state.lock().await;

        let command = command.trim();
        let output = if command.is_empty() {
            String::new()
        } else if let Some(arg) = parse_cd(command) {
            change_dir(arg, &mut state.cwd, &self.config.home).await
        } else {
            debug!("Terminal exec: {command}");
            run_in(command, &state.cwd, self.config.command_timeout).await
        };

        Ok(TerminalOutput {
            output,
            cwd: state.cwd.display().to_string(),
        })
    }

    /// Whether `token` names a live session.
    pub async fn validate(&self, token: &str) -> Result<(), TerminalError> {
        self.session(token).await.map(|_| ())
    }

    /// End a session; unknown tokens are ignored.
    pub async fn logout(&self, token: &str) {
        if self.sessions.lock().await.remove(token).is_some() {
            info!("Terminal session closed");
        }
    }

    /// Drop every session past its TTL. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry.created_at, now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Swept {removed} expired terminal session(s)");
        }
        removed
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
