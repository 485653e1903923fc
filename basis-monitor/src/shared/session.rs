/// Owned monitoring session.
///
/// Holds everything derived from the stream and the record snapshots for the
/// lifetime of one session. Consumers receive it by reference; nothing here
/// is global.

use crate::error::FetchError;
use crate::shared::candles::{Candle, CandleSeries, TickAggregator};
use crate::shared::poller::{RecordSnapshot, RecordsState};
use crate::shared::reconcile::{self, ReconciliationWindow};
use crate::shared::records::{PositionRecord, TradeRecord};
use crate::shared::types::{OrderBookSnapshot, Trade};
use crate::shared::websocket::{ChannelEvent, ConnectionStatus};
use chrono::TimeDelta;
use tracing::debug;

/// What the reconciliation panel currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationView {
    Selection {
        position: PositionRecord,
        window: ReconciliationWindow,
        trades: Vec<TradeRecord>,
    },
    Pair {
        open: PositionRecord,
        close: PositionRecord,
        trades: Vec<TradeRecord>,
    },
    NoRelatedRecords {
        position_id: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selected {
    Position(i64),
    Pair(i64),
}

#[derive(Debug, Clone)]
pub struct MonitorSession {
    candles: TickAggregator,
    order_book: Option<OrderBookSnapshot>,
    recent_trades: Vec<Trade>,
    status: ConnectionStatus,
    records: Option<RecordSnapshot>,
    fetch_error: Option<FetchError>,
    selected: Option<Selected>,
    view: Option<ReconciliationView>,
}

impl MonitorSession {
    pub fn new(bucket_size: TimeDelta) -> Self {
        Self {
            candles: TickAggregator::new(bucket_size),
            order_book: None,
            recent_trades: Vec::new(),
            status: ConnectionStatus::Disconnected,
            records: None,
            fetch_error: None,
            selected: None,
            view: None,
        }
    }

    /// Apply one stream event. Returns the latest candle after a trade batch.
    pub fn apply_event(&mut self, event: ChannelEvent) -> Option<Candle> {
        match event {
            ChannelEvent::OrderBookUpdate(book) => {
                self.order_book = Some(book);
                None
            }
            ChannelEvent::TradeBatch { accepted, recent } => {
                self.recent_trades = recent;
                if accepted.is_empty() {
                    return None;
                }
                self.candles.ingest(&accepted);
                self.candles.latest()
            }
        }
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// Apply a record refresh outcome.
    ///
    /// A failure keeps the last good snapshot and the current view.
    pub fn apply_records(&mut self, state: RecordsState) {
        match state {
            RecordsState::Loading => {}
            RecordsState::Loaded(snapshot) => {
                self.records = Some(snapshot);
                self.fetch_error = None;
                self.refresh_view();
            }
            RecordsState::Failed(error) => {
                self.fetch_error = Some(error);
            }
        }
    }

    /// Show the trades attributed to one position.
    pub fn select_position(&mut self, position_id: i64) -> &ReconciliationView {
        self.selected = Some(Selected::Position(position_id));
        let view = self.selection_view(position_id);
        self.view.insert(view)
    }

    /// Show the trades of the open/close pair containing `position_id`.
    ///
    /// Returns `false` and leaves the current view untouched when the position
    /// has no partner.
    pub fn select_pair(&mut self, position_id: i64) -> bool {
        match self.pair_view(position_id) {
            Some(view) => {
                self.selected = Some(Selected::Pair(position_id));
                self.view = Some(view);
                true
            }
            None => {
                debug!(position_id, "No pairing partner, keeping current view");
                false
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.view = None;
    }

    /// Discard stream-derived state; records and selection survive
    pub fn reset(&mut self) {
        self.candles.reset();
        self.order_book = None;
        self.recent_trades.clear();
    }

    pub fn candles(&self) -> CandleSeries<'_> {
        self.candles.series()
    }

    pub fn latest_candle(&self) -> Option<Candle> {
        self.candles.latest()
    }

    pub fn order_book(&self) -> Option<&OrderBookSnapshot> {
        self.order_book.as_ref()
    }

    pub fn recent_trades(&self) -> &[Trade] {
        &self.recent_trades
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// True whenever the stream is not connected; last good state is kept
    pub fn is_degraded(&self) -> bool {
        !self.status.is_connected()
    }

    pub fn records(&self) -> Option<&RecordSnapshot> {
        self.records.as_ref()
    }

    pub fn fetch_error(&self) -> Option<&FetchError> {
        self.fetch_error.as_ref()
    }

    pub fn view(&self) -> Option<&ReconciliationView> {
        self.view.as_ref()
    }

    fn selection_view(&self, position_id: i64) -> ReconciliationView {
        let miss = ReconciliationView::NoRelatedRecords { position_id };
        let Some(records) = &self.records else {
            return miss;
        };

        let positions = &records.positions[..];
        let (Some(position), Some(window)) = (
            positions.iter().find(|p| p.id == position_id),
            reconcile::selection_window(position_id, positions),
        ) else {
            return miss;
        };

        let trades: Vec<TradeRecord> = window.select(&records.trades).into_iter().cloned().collect();
        if trades.is_empty() {
            return miss;
        }

        ReconciliationView::Selection {
            position: position.clone(),
            window,
            trades,
        }
    }

    fn pair_view(&self, position_id: i64) -> Option<ReconciliationView> {
        let records = self.records.as_ref()?;
        let pair = reconcile::window_for_pair(position_id, &records.positions, &records.trades)?;

        Some(ReconciliationView::Pair {
            open: pair.open.clone(),
            close: pair.close.clone(),
            trades: pair.trades.into_iter().cloned().collect(),
        })
    }

    /// Recompute the active view against a new snapshot
    fn refresh_view(&mut self) {
        self.view = match self.selected {
            None => None,
            Some(Selected::Position(id)) => Some(self.selection_view(id)),
            Some(Selected::Pair(id)) => Some(
                self.pair_view(id)
                    .unwrap_or(ReconciliationView::NoRelatedRecords { position_id: id }),
            ),
        };
    }
}

impl Default for MonitorSession {
    fn default() -> Self {
        Self::new(TickAggregator::default().bucket_size())
    }
}
