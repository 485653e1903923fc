/// Basis Monitor - Shared Library
///
/// Live market-data ingestion and position reconciliation for a basis
/// trading desk:
/// - IngestionChannel: reconnecting WebSocket stream of order-book snapshots
///   and trade batches, deduplicated into a bounded working set
/// - TickAggregator: trade ticks folded into continuous OHLC candles
/// - PositionReconciler: trade records attributed to a position or an
///   open/close pair
///
/// The binary wires these together with the records poller and an owned
/// `MonitorSession`.
pub mod config;
pub mod error;
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{
    Order, OrderBookSnapshot, OrderKind, OrderRequest, OrderResponse, OrderStatus, Side,
    StreamMessage, Trade,
};

pub use shared::records::{
    Carry, GroupKey, MarketType, PositionAction, PositionRecord, TradeRecord, TradeSide,
};

pub use shared::buffer::TradeBuffer;
pub use shared::websocket::{
    ChannelConfig, ChannelEvent, ChannelHandle, ConnectionStatus, IngestionChannel,
};

pub use shared::candles::{Candle, CandleSeries, TickAggregator};

pub use shared::reconcile::{
    window_for_pair, window_for_selection, PairWindow, PositionIndex, ReconciliationWindow,
};

pub use shared::poller::{RecordSnapshot, RecordSource, RecordsPoller, RecordsState};
pub use shared::rest::RecordsClient;
pub use shared::session::{MonitorSession, ReconciliationView};

pub use config::MonitorConfig;
pub use error::{ChannelError, ConfigError, DecodeError, FetchError};
