//! Account status of the streaming subscription, fetched from the
//! provider's `player_api.php` endpoint.

use std::time::Duration;

use chrono::{Local, TimeZone};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SubscriptionConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0 Safari/537.36";
const ACCEPT_JSON: &str = "application/json,text/plain,*/*";

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Forbidden (403) - provider blocked this host/IP")]
    Forbidden,

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

/// Body of `GET /api/iptv`. On failure only `success` and `error` are set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_cons: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_date: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubscriptionStatus {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            username: None,
            active_cons: None,
            max_connections: None,
            status: None,
            exp_date: None,
            error: Some(error.into()),
        }
    }
}

pub struct SubscriptionClient {
    client: reqwest::Client,
    config: SubscriptionConfig,
}

impl SubscriptionClient {
    pub fn new(config: SubscriptionConfig) -> Result<Self, SubscriptionError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert(REFERER, HeaderValue::from_str(&format!("{}/", config.host))?);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, config })
    }

    async fn fetch(&self) -> Result<Value, SubscriptionError> {
        let url = format!("{}/player_api.php", self.config.host);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(SubscriptionError::Forbidden);
        }
        let body = response.error_for_status()?.json::<Value>().await?;
        Ok(body)
    }

    /// Query the provider. Never fails; errors become `success: false`.
    pub async fn status(&self) -> SubscriptionStatus {
        match self.fetch().await {
            Ok(body) => {
                debug!("Subscription status fetched");
                parse_user_info(&body)
            }
            Err(e) => {
                warn!("Subscription status failed: {e}");
                SubscriptionStatus::failure(e.to_string())
            }
        }
    }
}

/// Build a successful status from the provider's JSON body.
pub fn parse_user_info(body: &Value) -> SubscriptionStatus {
    let info = body.get("user_info").filter(|v| v.is_object());
    let field = |name: &str| {
        info.and_then(|i| i.get(name))
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::from("N/A"))
    };

    SubscriptionStatus {
        success: true,
        username: Some(field("username")),
        active_cons: Some(field("active_cons")),
        max_connections: Some(field("max_connections")),
        status: Some(field("status")),
        exp_date: Some(format_exp_date(field("exp_date"))),
        error: None,
    }
}

/// Epoch seconds (number or digit string) become local `%Y-%m-%d %H:%M:%S`;
/// anything else passes through.
fn format_exp_date(value: Value) -> Value {
    let epoch = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    };
    epoch
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|dt| Value::from(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
        .unwrap_or(value)
}
