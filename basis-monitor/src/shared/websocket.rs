/// Ingestion channel for the simulator's live order-book / trade stream
///
/// Owns one WebSocket connection at a time, decodes frames into
/// [`ChannelEvent`]s, keeps a bounded deduplicated trade working set and
/// reconnects after a fixed delay on any transport failure.

use crate::error::{ChannelError, DecodeError};
use crate::shared::buffer::{DEFAULT_TRADE_RETENTION, TradeBuffer};
use crate::shared::types::{OrderBookSnapshot, StreamMessage, Trade};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Fixed delay between a transport failure and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Upper bound on the close handshake during teardown
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Upper bound on TCP connect plus WebSocket upgrade
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection that delivers no frame (pongs included) for this long is dead
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Ingestion channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket stream URL
    pub url: String,
    /// Ping interval to keep connection alive
    pub ping_interval: Duration,
    /// Reconnection delay after disconnect
    pub reconnect_delay: Duration,
    /// Deadline for the connect handshake
    pub connect_timeout: Duration,
    /// Idle read deadline on an established connection
    pub read_timeout: Duration,
    /// Maximum channel buffer size for events
    pub channel_buffer_size: usize,
    /// Number of trades kept in the working set
    pub trade_retention: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000/ws".to_string(),
            ping_interval: Duration::from_secs(30),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            channel_buffer_size: 1000,
            trade_retention: DEFAULT_TRADE_RETENTION,
        }
    }
}

impl ChannelConfig {
    /// Create a new configuration with custom URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set ping interval
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set connect handshake timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set idle read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set channel buffer size
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Set trade working set size
    pub fn with_trade_retention(mut self, retention: usize) -> Self {
        self.trade_retention = retention;
        self
    }
}

/// Connection status updates
///
/// `Disconnected -> Connecting -> Connected`, any failure moves to
/// `Reconnecting` and back to `Connecting` after the reconnect delay.
/// `Disconnected` is also the terminal state after [`ChannelHandle::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Reconnecting => "RECONNECTING",
        }
    }
}

/// Events pushed to the subscriber, one per accepted frame
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    OrderBookUpdate(OrderBookSnapshot),
    TradeBatch {
        /// Trades of this frame that entered the working set
        accepted: Vec<Trade>,
        /// The working set after the merge, in arrival order
        recent: Vec<Trade>,
    },
}

/// Stateful frame decoder: turns text frames into events and applies the
/// trade working-set policy.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    buffer: TradeBuffer,
    seeded: bool,
}

impl FrameDecoder {
    pub fn new(trade_retention: usize) -> Self {
        Self {
            buffer: TradeBuffer::with_capacity(trade_retention),
            seeded: false,
        }
    }

    /// Decode one text frame.
    ///
    /// `Ok(None)` for frames that carry no event (the server greeting).
    pub fn decode(&mut self, text: &str) -> Result<Option<ChannelEvent>, DecodeError> {
        let message = match serde_json::from_str::<StreamMessage>(text) {
            Ok(message) => message,
            Err(error) => {
                if is_welcome(text) {
                    debug!("Received welcome message");
                    return Ok(None);
                }
                return Err(DecodeError(error));
            }
        };

        let event = match message {
            StreamMessage::OrderBook(book) => ChannelEvent::OrderBookUpdate(book),
            StreamMessage::Trades(trades) => {
                // The first batch of the session is the server's snapshot
                let accepted = if self.seeded {
                    self.buffer.merge(&trades)
                } else {
                    self.seeded = true;
                    self.buffer.seed(&trades)
                };
                ChannelEvent::TradeBatch {
                    accepted,
                    recent: self.buffer.trades(),
                }
            }
        };

        Ok(Some(event))
    }

    /// The retained trade working set
    pub fn buffer(&self) -> &TradeBuffer {
        &self.buffer
    }
}

fn is_welcome(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| {
            value
                .get("type")
                .and_then(|kind| kind.as_str())
                .map(|kind| kind == "welcome")
        })
        .unwrap_or(false)
}

/// Live stream client; [`IngestionChannel::open`] starts it.
pub struct IngestionChannel {
    config: ChannelConfig,
}

impl IngestionChannel {
    /// Create a new channel with default configuration
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// Create a new channel with custom configuration
    pub fn with_config(config: ChannelConfig) -> Self {
        Self { config }
    }

    /// Spawn the connection task.
    ///
    /// Returns the handle owning the connection and the receiver for events.
    /// Must be called within a tokio runtime.
    pub fn open(self) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>) {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let config = self.config;
        let task = tokio::spawn(async move {
            run_channel_loop(config, event_tx, status_tx, shutdown_rx).await;
        });

        let handle = ChannelHandle {
            shutdown_tx,
            status_rx,
            task: Some(task),
        };
        (handle, event_rx)
    }
}

impl Default for IngestionChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of a running channel.
///
/// Dropping the handle aborts the connection task; [`ChannelHandle::close`]
/// tears it down gracefully and waits for it.
#[derive(Debug)]
pub struct ChannelHandle {
    shutdown_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<ConnectionStatus>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Receiver for connection status transitions
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Stop the channel: cancels an in-flight connect or pending retry,
    /// closes the transport and waits for the task to finish.
    pub async fn close(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Ingestion channel task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// How a connected session ended
enum SessionEnd {
    Shutdown,
    SubscriberGone,
    Failed(ChannelError),
}

/// Resolves once close was requested or the handle is gone
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Main connection loop with fixed-delay reconnect
async fn run_channel_loop(
    config: ChannelConfig,
    event_tx: mpsc::Sender<ChannelEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Starting ingestion channel for {}", config.url);
    let mut decoder = FrameDecoder::new(config.trade_retention);

    loop {
        status_tx.send_replace(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => break,
            result = timeout(config.connect_timeout, connect_async(config.url.as_str())) => result,
        };

        let failure = match connected {
            Ok(Ok((ws_stream, _))) => {
                info!("Connected to stream at {}", config.url);
                status_tx.send_replace(ConnectionStatus::Connected);

                match run_session(ws_stream, &config, &event_tx, &mut decoder, &mut shutdown_rx)
                    .await
                {
                    SessionEnd::Shutdown => break,
                    SessionEnd::SubscriberGone => {
                        warn!("Event receiver dropped, stopping channel");
                        break;
                    }
                    SessionEnd::Failed(error) => error,
                }
            }
            Ok(Err(e)) => ChannelError::Connect {
                url: config.url.clone(),
                reason: e.to_string(),
            },
            Err(_) => ChannelError::Connect {
                url: config.url.clone(),
                reason: format!("handshake timed out after {:?}", config.connect_timeout),
            },
        };

        warn!(error = %failure, "Connection lost, will reconnect...");
        status_tx.send_replace(ConnectionStatus::Reconnecting);

        debug!("Waiting {:?} before reconnecting...", config.reconnect_delay);
        tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => break,
            _ = sleep(config.reconnect_delay) => {}
        }
    }

    status_tx.send_replace(ConnectionStatus::Disconnected);
    info!("Ingestion channel for {} closed", config.url);
}

/// Read frames from one established connection until it ends
async fn run_session(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: &ChannelConfig,
    event_tx: &mpsc::Sender<ChannelEvent>,
    decoder: &mut FrameDecoder,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut write, mut read) = ws_stream.split();
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    let mut idle = Box::pin(sleep(config.read_timeout));

    loop {
        tokio::select! {
            _ = shutdown_requested(shutdown_rx) => {
                let _ = timeout(CLOSE_GRACE, write.close()).await;
                return SessionEnd::Shutdown;
            }
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Ping(Default::default())).await {
                    debug!("Failed to send ping, connection likely dead");
                    return SessionEnd::Failed(ChannelError::Ping(e.to_string()));
                }
            }
            _ = &mut idle => {
                warn!(
                    timeout_ms = config.read_timeout.as_millis() as u64,
                    "No data received, triggering reconnection"
                );
                return SessionEnd::Failed(ChannelError::ReadTimeout(config.read_timeout));
            }
            frame = read.next() => {
                idle.as_mut().reset(Instant::now() + config.read_timeout);
                match frame {
                    Some(Ok(Message::Text(text))) => match decoder.decode(text.as_str()) {
                        Ok(Some(event)) => {
                            let delivered = tokio::select! {
                                _ = shutdown_requested(shutdown_rx) => return SessionEnd::Shutdown,
                                result = event_tx.send(event) => result,
                            };
                            if delivered.is_err() {
                                return SessionEnd::SubscriberGone;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("Dropping frame: {}", e);
                            debug!("Raw message: {}", text.as_str());
                        }
                    },
                    Some(Ok(Message::Close(_))) => {
                        info!("Server closed connection");
                        return SessionEnd::Failed(ChannelError::ClosedByPeer);
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong handled by tungstenite, binary frames unused
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return SessionEnd::Failed(ChannelError::from(e));
                    }
                    None => return SessionEnd::Failed(ChannelError::ClosedByPeer),
                }
            }
        }
    }
}
