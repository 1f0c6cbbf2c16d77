use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";
const DEFAULT_STREAM_PATH: &str = "ws/alerts";
const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_ALERT_CAPACITY: usize = 100;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PLAYBACK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_CHANNELS: &[&str] = &["alerts", "metrics"];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppProfile {
    Dev,
    Prod,
}

impl AppProfile {
    pub fn from_env(value: Option<String>) -> Self {
        match value.as_deref() {
            Some("prod") | Some("production") => Self::Prod,
            _ => Self::Dev,
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_base_url: String,
    pub stream_url: Option<String>,
    pub auth_token: Option<String>,
    pub profile: AppProfile,
    pub auto_connect: bool,
    pub channels: Vec<String>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub alert_capacity: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub request_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub playback_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            stream_url: None,
            auth_token: None,
            profile: AppProfile::Dev,
            auto_connect: true,
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            playback_interval: Duration::from_millis(DEFAULT_PLAYBACK_INTERVAL_MS),
        }
    }
}

/// Connection Manager 关心的那一部分配置。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub endpoint: String,
    pub channels: Vec<String>,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        AppConfig::default().connection_options()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub request_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackOptions {
    pub interval: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_PLAYBACK_INTERVAL_MS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        crate::config::load_dotenv();

        Self::from_lookup(read_env)
    }

    /// 以任意 key→value 查找函数构建配置，`from_env` 与测试共用。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("NETPULSE_API_BASE_URL") {
            config.api_base_url = url;
        }

        if let Some(url) = lookup("NETPULSE_STREAM_URL") {
            config.stream_url = Some(url);
        }

        if let Some(token) = lookup("NETPULSE_AUTH_TOKEN") {
            config.auth_token = Some(token);
        }

        config.profile = AppProfile::from_env(lookup("NETPULSE_PROFILE"));

        if let Some(flag) = lookup("NETPULSE_AUTO_CONNECT") {
            match parse_flag(&flag) {
                Some(value) => config.auto_connect = value,
                None => tracing::warn!(%flag, "ignoring NETPULSE_AUTO_CONNECT"),
            }
        }

        if let Some(raw) = lookup("NETPULSE_CHANNELS") {
            let channels: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if !channels.is_empty() {
                config.channels = channels;
            }
        }

        if let Some(ms) = parse_number::<u64>(&lookup, "NETPULSE_RECONNECT_INTERVAL_MS") {
            config.reconnect_interval = Duration::from_millis(ms.max(100));
        }

        if let Some(attempts) = parse_number::<u32>(&lookup, "NETPULSE_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = attempts;
        }

        if let Some(capacity) = parse_number::<usize>(&lookup, "NETPULSE_ALERT_CAPACITY") {
            config.alert_capacity = capacity.max(1);
        }

        if let Some(ms) = parse_number::<u64>(&lookup, "NETPULSE_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms.max(1_000));
        }

        if let Some(ms) = parse_number::<u64>(&lookup, "NETPULSE_PLAYBACK_INTERVAL_MS") {
            config.playback_interval = Duration::from_millis(ms.max(100));
        }

        config
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.auth_token
            .as_ref()
            .map(|token| format!("Bearer {}", token.trim()))
    }

    /// 未显式配置时由 API 地址推导：`http(s)://host/api/v1` → `ws(s)://host/api/v1/ws/alerts`。
    pub fn stream_endpoint(&self) -> String {
        if let Some(url) = self.stream_url.as_ref() {
            return url.clone();
        }
        let base = http_to_ws_url(self.api_base_url.trim_end_matches('/'));
        format!("{base}/{DEFAULT_STREAM_PATH}")
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            endpoint: self.stream_endpoint(),
            channels: self.channels.clone(),
            reconnect_interval: self.reconnect_interval,
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            request_timeout: self.request_timeout,
        }
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            interval: self.playback_interval,
        }
    }
}

pub fn http_to_ws_url(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if http_url.starts_with("ws://") || http_url.starts_with("wss://") {
        http_url.to_string()
    } else {
        format!("ws://{http_url}")
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(%key, %raw, "ignoring unparseable config value");
            None
        }
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .or_else(|| option_env_from_build(key).map(|s| s.to_string()))
}

fn option_env_from_build(key: &str) -> Option<&'static str> {
    match key {
        "NETPULSE_API_BASE_URL" => option_env!("NETPULSE_API_BASE_URL"),
        "NETPULSE_STREAM_URL" => option_env!("NETPULSE_STREAM_URL"),
        "NETPULSE_AUTH_TOKEN" => option_env!("NETPULSE_AUTH_TOKEN"),
        "NETPULSE_PROFILE" => option_env!("NETPULSE_PROFILE"),
        "NETPULSE_AUTO_CONNECT" => option_env!("NETPULSE_AUTO_CONNECT"),
        "NETPULSE_CHANNELS" => option_env!("NETPULSE_CHANNELS"),
        "NETPULSE_RECONNECT_INTERVAL_MS" => option_env!("NETPULSE_RECONNECT_INTERVAL_MS"),
        "NETPULSE_MAX_RECONNECT_ATTEMPTS" => option_env!("NETPULSE_MAX_RECONNECT_ATTEMPTS"),
        "NETPULSE_ALERT_CAPACITY" => option_env!("NETPULSE_ALERT_CAPACITY"),
        "NETPULSE_REQUEST_TIMEOUT_MS" => option_env!("NETPULSE_REQUEST_TIMEOUT_MS"),
        "NETPULSE_PLAYBACK_INTERVAL_MS" => option_env!("NETPULSE_PLAYBACK_INTERVAL_MS"),
        _ => None,
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            tracing::warn!("failed to load .env: {err}");
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[inline]
pub fn load_dotenv() {}
