/// Environment-driven configuration.

use crate::error::ConfigError;
use crate::shared::buffer::DEFAULT_TRADE_RETENTION;
use crate::shared::candles::DEFAULT_BUCKET_MS;
use crate::shared::websocket::{ChannelConfig, DEFAULT_RECONNECT_DELAY};
use chrono::TimeDelta;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SIMULATOR_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_RECORDS_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// WebSocket stream address, `WS_URL` or derived from the simulator URL
    pub stream_url: Url,
    pub simulator_url: Url,
    pub records_url: Url,
    pub bucket_size: TimeDelta,
    pub reconnect_delay: Duration,
    pub trade_retention: usize,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing or blank keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let simulator_url = parse_url(
            "SIMULATOR_URL",
            get("SIMULATOR_URL").as_deref().unwrap_or(DEFAULT_SIMULATOR_URL),
        )?;
        let stream_url = match get("WS_URL") {
            Some(value) => parse_url("WS_URL", &value)?,
            None => stream_url_for(&simulator_url)?,
        };
        let records_url = parse_url(
            "RECORDS_URL",
            get("RECORDS_URL").as_deref().unwrap_or(DEFAULT_RECORDS_URL),
        )?;

        let bucket_ms: i64 = parse_or("CANDLE_BUCKET_MS", get("CANDLE_BUCKET_MS"), DEFAULT_BUCKET_MS)?;
        if bucket_ms <= 0 {
            return Err(ConfigError::Invalid {
                key: "CANDLE_BUCKET_MS",
                value: bucket_ms.to_string(),
            });
        }

        let reconnect_ms = parse_or(
            "RECONNECT_DELAY_MS",
            get("RECONNECT_DELAY_MS"),
            DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        )?;

        let trade_retention: usize = parse_or("TRADE_RETENTION", get("TRADE_RETENTION"), DEFAULT_TRADE_RETENTION)?;
        if trade_retention == 0 {
            return Err(ConfigError::Invalid {
                key: "TRADE_RETENTION",
                value: "0".to_string(),
            });
        }

        let poll_secs = parse_or(
            "POLL_INTERVAL_SECS",
            get("POLL_INTERVAL_SECS"),
            DEFAULT_POLL_INTERVAL.as_secs(),
        )?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "POLL_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let timeout_secs = parse_or(
            "REQUEST_TIMEOUT_SECS",
            get("REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            stream_url,
            simulator_url,
            records_url,
            bucket_size: TimeDelta::milliseconds(bucket_ms),
            reconnect_delay: Duration::from_millis(reconnect_ms),
            trade_retention,
            poll_interval: Duration::from_secs(poll_secs),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(self.stream_url.as_str())
            .with_reconnect_delay(self.reconnect_delay)
            .with_trade_retention(self.trade_retention)
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|e| ConfigError::Url {
        key,
        reason: format!("{value}: {e}"),
    })
}

fn parse_or<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// `http://host:port` becomes `ws://host:port/ws`, `https` becomes `wss`
fn stream_url_for(simulator_url: &Url) -> Result<Url, ConfigError> {
    let scheme = match simulator_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConfigError::Url {
                key: "SIMULATOR_URL",
                reason: format!("unsupported scheme {other}"),
            });
        }
    };

    let host = simulator_url.host_str().ok_or_else(|| ConfigError::Url {
        key: "SIMULATOR_URL",
        reason: "missing host".to_string(),
    })?;
    let authority = match simulator_url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let base = simulator_url.path().trim_end_matches('/');

    parse_url("SIMULATOR_URL", &format!("{scheme}://{authority}{base}/ws"))
}
