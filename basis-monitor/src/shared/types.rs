/// Core data types for the live order-book / trade stream
///
/// These types match the JSON message format of the simulator's `/ws`
/// stream and `/order` endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Convert to display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Check if this is a buy order
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    /// Check if this is a sell order
    pub fn is_sell(&self) -> bool {
        matches!(self, Side::Sell)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order kind
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum OrderKind {
    Limit,
    Market,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Limit => "Limit",
            OrderKind::Market => "Market",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single executed trade (tick)
///
/// Immutable once observed. The timestamp doubles as the trade's identity
/// inside the ingestion working set.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct Trade {
    /// Execution price
    pub price: f64,
    /// Executed quantity
    pub quantity: f64,
    /// Side of the aggressing order
    pub side: Side,
    /// Execution time
    pub timestamp: DateTime<Utc>,
}

/// Resting order as published in an order-book snapshot
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub order_type: OrderKind,
    /// `None` for market orders
    pub price: Option<f64>,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Full order-book snapshot
///
/// Bids are ordered best (highest) first, asks best (lowest) first, as sent.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct OrderBookSnapshot {
    pub bids: Vec<Order>,
    pub asks: Vec<Order>,
}

impl OrderBookSnapshot {
    /// Highest priced bid
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().and_then(|order| order.price)
    }

    /// Lowest priced ask
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().and_then(|order| order.price)
    }

    /// Calculate the bid-ask spread
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Calculate the mid price
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

/// Stream frame envelope
///
/// Externally tagged: `{"OrderBook": {...}}` or `{"Trades": [...]}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum StreamMessage {
    OrderBook(OrderBookSnapshot),
    Trades(Vec<Trade>),
}

/// Request body for `POST /order`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    pub order_type: OrderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub quantity: f64,
}

impl OrderRequest {
    pub fn limit(side: Side, price: f64, quantity: f64) -> Self {
        Self {
            side,
            order_type: OrderKind::Limit,
            price: Some(price),
            quantity,
        }
    }

    pub fn market(side: Side, quantity: f64) -> Self {
        Self {
            side,
            order_type: OrderKind::Market,
            price: None,
            quantity,
        }
    }
}

/// Order status as reported by the simulator. Surfaced, never interpreted.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Filled,
    PartiallyFilled,
    NotFilled,
}

/// Response body of `POST /order`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OrderResponse {
    pub id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub trades: Vec<Trade>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Buy.to_string(), "Buy");
        assert_eq!(Side::Sell.to_string(), "Sell");
    }

    #[test]
    fn test_side_checks() {
        assert!(Side::Buy.is_buy());
        assert!(!Side::Buy.is_sell());
        assert!(Side::Sell.is_sell());
        assert!(!Side::Sell.is_buy());
    }

    #[test]
    fn test_decode_trades_frame() {
        let frame = r#"{"Trades":[
            {"price":100.5,"quantity":2.0,"side":"Buy","timestamp":"2025-01-01T00:00:01.250Z"},
            {"price":100.0,"quantity":0.5,"side":"Sell","timestamp":"2025-01-01T00:00:02+00:00"}
        ]}"#;

        let StreamMessage::Trades(trades) = serde_json::from_str(frame).unwrap() else {
            panic!("expected trades frame");
        };

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].price, 100.5);
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[0].timestamp.timestamp_millis(), 1_735_689_601_250);
        assert_eq!(trades[1].side, Side::Sell);
    }

    #[test]
    fn test_decode_orderbook_frame() {
        let frame = r#"{"OrderBook":{
            "bids":[{"id":"b1","side":"Buy","order_type":"Limit","price":99.5,"quantity":1.0,"timestamp":"2025-01-01T00:00:00Z"}],
            "asks":[
                {"id":"a1","side":"Sell","order_type":"Limit","price":100.5,"quantity":3.0,"timestamp":"2025-01-01T00:00:00Z"},
                {"id":"a2","side":"Sell","order_type":"Market","price":null,"quantity":1.0,"timestamp":"2025-01-01T00:00:00Z"}
            ]
        }}"#;

        let StreamMessage::OrderBook(book) = serde_json::from_str(frame).unwrap() else {
            panic!("expected order book frame");
        };

        assert_eq!(book.best_bid(), Some(99.5));
        assert_eq!(book.best_ask(), Some(100.5));
        assert_eq!(book.spread(), Some(1.0));
        assert_eq!(book.mid_price(), Some(100.0));
        assert_eq!(book.asks[1].price, None);
        assert_eq!(book.asks[1].order_type, OrderKind::Market);
    }

    #[test]
    fn test_unknown_frame_is_rejected() {
        assert!(serde_json::from_str::<StreamMessage>(r#"{"type":"welcome"}"#).is_err());
        assert!(serde_json::from_str::<StreamMessage>(r#"{"Trades":[{"price":"x"}]}"#).is_err());
    }

    #[test]
    fn test_order_request_encoding() {
        let market = serde_json::to_value(OrderRequest::market(Side::Sell, 2.0)).unwrap();
        assert_eq!(
            market,
            serde_json::json!({"side": "Sell", "order_type": "Market", "quantity": 2.0})
        );

        let limit = serde_json::to_value(OrderRequest::limit(Side::Buy, 99.0, 1.0)).unwrap();
        assert_eq!(limit["price"], serde_json::json!(99.0));
    }

    #[test]
    fn test_decode_order_response() {
        let body = r#"{"id":"4f0c","status":"PartiallyFilled","trades":[
            {"price":100.0,"quantity":0.5,"side":"Buy","timestamp":"2025-01-01T00:00:00Z"}
        ]}"#;

        let response: OrderResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.status, OrderStatus::PartiallyFilled);
        assert_eq!(response.trades.len(), 1);
    }
}
