use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failures of the live stream transport.
///
/// None of these reach callers of the channel directly: they drive the
/// reconnect loop and surface only as [`ConnectionStatus`](crate::ConnectionStatus)
/// transitions.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ChannelError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("WebSocket transport error: {0}")]
    Transport(String),

    #[error("stream closed by peer")]
    ClosedByPeer,

    #[error("keep-alive ping failed: {0}")]
    Ping(String),

    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),
}

impl ChannelError {
    /// Every transport failure is retried with the fixed reconnect delay.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// A stream frame that could not be decoded. The frame is dropped.
#[derive(Debug, Error)]
#[error("failed to decode stream frame: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Failures talking to the REST collaborators.
///
/// Never retried automatically; the caller keeps the error until a manual retry.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("{url} responded with status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<url::ParseError> for FetchError {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidUrl(value.to_string())
    }
}

/// Invalid environment configuration.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("invalid URL for {key}: {reason}")]
    Url { key: &'static str, reason: String },
}
