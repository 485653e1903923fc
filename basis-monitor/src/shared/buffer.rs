/// Bounded trade working set
///
/// Keeps the most recent trades seen on the stream, deduplicated by
/// timestamp: two trades with the same timestamp are the same trade and the
/// later arrival is discarded.
use crate::shared::types::Trade;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};

/// Default number of trades retained by the ingestion channel
pub const DEFAULT_TRADE_RETENTION: usize = 100;

/// FIFO of trades with dedup-by-timestamp and a hard capacity
#[derive(Debug, Clone)]
pub struct TradeBuffer {
    /// Maximum number of trades to keep
    max_size: usize,
    /// Trades in arrival order
    trades: VecDeque<Trade>,
    /// Timestamps currently held in `trades`
    seen: HashSet<DateTime<Utc>>,
}

impl TradeBuffer {
    /// Create a new buffer holding at most `max_size` trades
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            max_size,
            trades: VecDeque::with_capacity(max_size),
            seen: HashSet::with_capacity(max_size),
        }
    }

    /// Replace the working set with the most recent trades of `batch`.
    ///
    /// Returns the trades that now make up the working set.
    pub fn seed(&mut self, batch: &[Trade]) -> Vec<Trade> {
        self.clear();
        self.merge(batch)
    }

    /// Append the trades of `batch` whose timestamp is not yet held, then
    /// drop the oldest arrivals until at most `max_size` remain.
    ///
    /// Returns the newly accepted trades, in arrival order. Accepted trades
    /// pushed straight back out by the capacity bound are not returned.
    pub fn merge(&mut self, batch: &[Trade]) -> Vec<Trade> {
        let mut accepted = 0usize;
        for trade in batch {
            if self.seen.insert(trade.timestamp) {
                self.trades.push_back(*trade);
                accepted += 1;
            }
        }

        while self.trades.len() > self.max_size {
            if let Some(old) = self.trades.pop_front() {
                self.seen.remove(&old.timestamp);
            }
        }

        // New arrivals sit at the back, so evictions reach them last
        let start = self.trades.len() - accepted.min(self.trades.len());
        self.trades.range(start..).copied().collect()
    }

    /// Get the retained trades in arrival order
    pub fn trades(&self) -> Vec<Trade> {
        self.trades.iter().copied().collect()
    }

    /// Check whether a trade with this timestamp is held
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.seen.contains(timestamp)
    }

    /// Get the most recently accepted trade
    pub fn latest(&self) -> Option<&Trade> {
        self.trades.back()
    }

    /// Get number of trades held
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Get the retention bound
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Clear all trades
    pub fn clear(&mut self) {
        self.trades.clear();
        self.seen.clear();
    }
}

impl Default for TradeBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRADE_RETENTION)
    }
}
