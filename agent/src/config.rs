//! Agent configuration, read once at startup from the environment.
//!
//! An optional `.env` file in the working directory is loaded first (see
//! `main`), so deployments can keep secrets out of the service unit.

use std::path::PathBuf;
use std::time::Duration;

use hostpulse_core::history::HistoryConfig;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5020";
pub const DEFAULT_TERMINAL_PASSWORD: &str = "changeme";
pub const DEFAULT_SUBSCRIPTION_HOST: &str = "https://av-ext.com:8443";
const DEFAULT_SUBSCRIPTION_USERNAME: &str = "your_username";
const DEFAULT_SUBSCRIPTION_PASSWORD: &str = "your_password";

/// Credentials for the subscription-status service.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub listen_addr: String,
    pub state_dir: PathBuf,
    pub static_dir: PathBuf,
    pub terminal_password: String,
    pub subscription: SubscriptionConfig,
    pub history: HistoryConfig,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (for testing).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(default))
        };

        let history = HistoryConfig {
            sample_period: secs("HOSTPULSE_SAMPLE_SECS", 5),
            battery_interval: secs("HOSTPULSE_BATTERY_INTERVAL_SECS", 600),
            ..HistoryConfig::default()
        };

        Self {
            listen_addr: get("HOSTPULSE_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            state_dir: get("HOSTPULSE_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| default_state_dir(&get)),
            static_dir: get("HOSTPULSE_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            terminal_password: get("TERMINAL_PASSWORD")
                .unwrap_or_else(|| DEFAULT_TERMINAL_PASSWORD.to_string()),
            subscription: SubscriptionConfig {
                host: get("IPTV_HOST")
                    .map(|h| h.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_HOST.to_string()),
                username: get("IPTV_USERNAME")
                    .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_USERNAME.to_string()),
                password: get("IPTV_PASSWORD")
                    .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_PASSWORD.to_string()),
            },
            history,
        }
    }

    /// Names of settings still at their insecure built-in defaults.
    pub fn insecure_defaults(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.terminal_password == DEFAULT_TERMINAL_PASSWORD {
            names.push("TERMINAL_PASSWORD");
        }
        if self.subscription.username == DEFAULT_SUBSCRIPTION_USERNAME {
            names.push("IPTV_USERNAME");
        }
        if self.subscription.password == DEFAULT_SUBSCRIPTION_PASSWORD {
            names.push("IPTV_PASSWORD");
        }
        names
    }
}

/// `$XDG_CONFIG_HOME/hostpulse`, else `~/.config/hostpulse`.
fn default_state_dir(get: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(xdg) = get("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("hostpulse");
    }
    if let Some(home) = get("HOME") {
        return PathBuf::from(home).join(".config").join("hostpulse");
    }
    PathBuf::from(".config").join("hostpulse")
}
