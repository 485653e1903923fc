/// Tick-to-candle aggregation
///
/// Folds trades into fixed-width OHLC buckets keyed by
/// `floor(timestamp / bucket_size)` and exposes the result as a continuous
/// series: every candle after the first opens at its predecessor's close.
///
/// Buckets are stored unstitched. Continuity is applied while iterating, so
/// a trade that retroactively moves a bucket's close is reflected in the next
/// candle's open on the following read without rewriting the map.

use crate::shared::types::Trade;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, btree_map};
use tracing::debug;

/// Default bucket width in milliseconds (1 second)
pub const DEFAULT_BUCKET_MS: i64 = 1_000;

/// A single OHLC candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candle {
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Raw per-bucket state before continuity is applied
#[derive(Debug, Clone, Copy)]
struct Bucket {
    start: DateTime<Utc>,
    /// First price folded into this bucket; only used when it has no predecessor
    first: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl Bucket {
    fn new(start: DateTime<Utc>, price: f64) -> Self {
        Self {
            start,
            first: price,
            high: price,
            low: price,
            close: price,
        }
    }

    fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

/// Incremental OHLC aggregator for one trade stream
#[derive(Debug, Clone)]
pub struct TickAggregator {
    bucket_ms: i64,
    buckets: BTreeMap<i64, Bucket>,
}

impl TickAggregator {
    /// Create an aggregator with the given bucket width.
    ///
    /// Widths below one millisecond are clamped to one millisecond.
    pub fn new(bucket_size: TimeDelta) -> Self {
        Self {
            bucket_ms: bucket_size.num_milliseconds().max(1),
            buckets: BTreeMap::new(),
        }
    }

    /// Bucket width
    pub fn bucket_size(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.bucket_ms)
    }

    /// Bucket key of an instant: `floor(timestamp / bucket_size)`
    #[inline]
    pub fn bucket_key(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp_millis().div_euclid(self.bucket_ms)
    }

    /// Fold a batch of trades and return the full continuous series.
    ///
    /// The batch is stably sorted by timestamp first so `close` is the price of
    /// the latest trade in each bucket touched by this batch.
    pub fn ingest(&mut self, trades: &[Trade]) -> CandleSeries<'_> {
        let mut ordered: Vec<&Trade> = trades.iter().collect();
        ordered.sort_by_key(|trade| trade.timestamp);

        for trade in ordered {
            if !trade.price.is_finite() {
                debug!(price = trade.price, "Skipping trade with non-finite price");
                continue;
            }

            let key = self.bucket_key(trade.timestamp);
            let bucket_ms = self.bucket_ms;
            self.buckets
                .entry(key)
                .and_modify(|bucket| bucket.update(trade.price))
                .or_insert_with(|| {
                    let start = DateTime::from_timestamp_millis(key * bucket_ms)
                        .unwrap_or(trade.timestamp);
                    Bucket::new(start, trade.price)
                });
        }

        self.series()
    }

    /// Regenerate the continuous series from the accumulated buckets
    pub fn series(&self) -> CandleSeries<'_> {
        CandleSeries {
            inner: self.buckets.iter(),
            prev_close: None,
        }
    }

    /// Collect the current series
    pub fn candles(&self) -> Vec<Candle> {
        self.series().collect()
    }

    /// Most recent candle with continuity applied
    pub fn latest(&self) -> Option<Candle> {
        let mut recent = self.buckets.values().rev();
        let last = recent.next()?;
        let open = recent.next().map_or(last.first, |prev| prev.close);
        Some(Candle {
            bucket_start: last.start,
            open,
            high: last.high,
            low: last.low,
            close: last.close,
        })
    }

    /// Get number of candles
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Check if no trade has been folded yet
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Discard all candles (session reset)
    pub fn reset(&mut self) {
        self.buckets.clear();
    }
}

impl Default for TickAggregator {
    fn default() -> Self {
        Self::new(TimeDelta::milliseconds(DEFAULT_BUCKET_MS))
    }
}

/// Lazy, restartable view of the candle series in ascending bucket order
#[derive(Debug, Clone)]
pub struct CandleSeries<'a> {
    inner: btree_map::Iter<'a, i64, Bucket>,
    prev_close: Option<f64>,
}

impl Iterator for CandleSeries<'_> {
    type Item = Candle;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, bucket) = self.inner.next()?;
        let open = self.prev_close.unwrap_or(bucket.first);
        self.prev_close = Some(bucket.close);

        Some(Candle {
            bucket_start: bucket.start,
            open,
            high: bucket.high,
            low: bucket.low,
            close: bucket.close,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for CandleSeries<'_> {}
