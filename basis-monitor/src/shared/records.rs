/// Trade and position lifecycle records served by the records API.
///
/// Both families are created by the trading bots and are read-only here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a basis position.
///
/// `Carry` is long spot / short futures, `Reverse` the opposite.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum Carry {
    #[serde(rename = "carry", alias = "Carry", alias = "CARRY")]
    Carry,
    #[serde(rename = "reverse", alias = "Reverse", alias = "REVERSE")]
    Reverse,
}

/// Lifecycle step recorded for a position.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum PositionAction {
    #[serde(rename = "open", alias = "Open", alias = "OPEN")]
    Open,
    #[serde(rename = "close", alias = "Close", alias = "CLOSE")]
    Close,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum MarketType {
    #[serde(rename = "spot", alias = "Spot", alias = "SPOT")]
    Spot,
    #[serde(rename = "futures", alias = "Futures", alias = "FUTURES")]
    Futures,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum TradeSide {
    #[serde(rename = "buy", alias = "Buy", alias = "BUY")]
    Buy,
    #[serde(rename = "sell", alias = "Sell", alias = "SELL")]
    Sell,
}

/// An executed exchange order, as recorded by a bot.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TradeRecord {
    pub id: i64,
    #[serde(alias = "executedAt")]
    pub executed_at: DateTime<Utc>,
    pub exchange: String,
    pub symbol: String,
    #[serde(alias = "marketType")]
    pub market_type: MarketType,
    pub side: TradeSide,
    pub quantity: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, alias = "orderId")]
    pub order_id: Option<String>,
    #[serde(default, alias = "reduceOnly")]
    pub reduce_only: bool,
    #[serde(default, alias = "isLiquidation")]
    pub is_liquidation: bool,
}

/// An open or close step of a bot's basis position.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PositionRecord {
    pub id: i64,
    #[serde(alias = "executedAt")]
    pub executed_at: DateTime<Utc>,
    #[serde(alias = "botName")]
    pub bot_name: String,
    pub symbol: String,
    pub carry: Carry,
    pub action: PositionAction,
    #[serde(default, alias = "spotExchange")]
    pub spot_exchange: Option<String>,
    #[serde(default, alias = "futuresExchange")]
    pub futures_exchange: Option<String>,
    #[serde(default, alias = "spotPrice")]
    pub spot_price: Option<f64>,
    #[serde(default, alias = "futuresPrice")]
    pub futures_price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default, alias = "basisBps")]
    pub basis_bps: Option<f64>,
}

impl PositionRecord {
    /// Composite key shared by every lifecycle step of the same position stream.
    pub fn group_key(&self) -> GroupKey<'_> {
        GroupKey {
            bot_name: &self.bot_name,
            symbol: &self.symbol,
            carry: self.carry,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.action, PositionAction::Open)
    }

    pub fn is_close(&self) -> bool {
        matches!(self.action, PositionAction::Close)
    }
}

/// `(bot_name, symbol, carry)` grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey<'a> {
    pub bot_name: &'a str,
    pub symbol: &'a str,
    pub carry: Carry,
}
