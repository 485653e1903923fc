/// Attribution of trade records to position lifecycle events.
///
/// Positions sharing `(bot_name, symbol, carry)` form a group ordered by
/// `executed_at` (stable, so equal instants keep input order). The trades
/// belonging to a position are those executed at or after the previous event
/// of its group and strictly before the position itself.
///
/// All functions borrow the record snapshots and never mutate them. A miss
/// (unknown id, empty window, no pairing partner) is an empty result, not an
/// error.

use crate::shared::records::{GroupKey, PositionRecord, TradeRecord};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;

/// Half-open interval `[start, end)`; `start == None` is unbounded below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl ReconciliationWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| instant >= start) && instant < self.end
    }

    /// Trades inside this window, in input order
    pub fn select<'t>(&self, trades: &'t [TradeRecord]) -> Vec<&'t TradeRecord> {
        trades
            .iter()
            .filter(|trade| self.contains(trade.executed_at))
            .collect()
    }
}

/// A matched open/close pair and the trades attributed to either side
#[derive(Debug, Clone, PartialEq)]
pub struct PairWindow<'p, 't> {
    pub open: &'p PositionRecord,
    pub close: &'p PositionRecord,
    pub open_window: ReconciliationWindow,
    pub close_window: ReconciliationWindow,
    pub trades: Vec<&'t TradeRecord>,
}

/// Trades attributed to the position `position_id`.
pub fn window_for_selection<'t>(
    position_id: i64,
    positions: &[PositionRecord],
    trades: &'t [TradeRecord],
) -> Vec<&'t TradeRecord> {
    selection_window(position_id, positions)
        .map(|window| window.select(trades))
        .unwrap_or_default()
}

/// Window of the position `position_id`, or `None` if it is unknown.
pub fn selection_window(
    position_id: i64,
    positions: &[PositionRecord],
) -> Option<ReconciliationWindow> {
    let (group, index) = locate(position_id, positions)?;
    Some(window_at(&group, index))
}

/// Pair the position `position_id` with its nearest partner and collect the
/// union of both sides' windows.
///
/// A `Close` pairs with the nearest preceding `Open` of its group, an `Open`
/// with the nearest following `Close`. Trades between the two windows that
/// belong to some intervening event are not part of the result.
pub fn window_for_pair<'p, 't>(
    position_id: i64,
    positions: &'p [PositionRecord],
    trades: &'t [TradeRecord],
) -> Option<PairWindow<'p, 't>> {
    let (group, index) = locate(position_id, positions)?;
    pair_at(&group, index, trades)
}

/// Same-group events of `position_id` in time order, plus its index there.
fn locate(
    position_id: i64,
    positions: &[PositionRecord],
) -> Option<(Vec<&PositionRecord>, usize)> {
    let selected = positions.iter().find(|position| position.id == position_id)?;
    let key = selected.group_key();

    let mut group: Vec<&PositionRecord> = positions
        .iter()
        .filter(|position| position.group_key() == key)
        .collect();
    group.sort_by_key(|position| position.executed_at);

    let index = group
        .iter()
        .position(|position| std::ptr::eq(*position, selected))?;
    Some((group, index))
}

fn window_at(group: &[&PositionRecord], index: usize) -> ReconciliationWindow {
    ReconciliationWindow {
        start: index
            .checked_sub(1)
            .map(|previous| group[previous].executed_at),
        end: group[index].executed_at,
    }
}

/// Indices of the `(open, close)` pair containing `index`, if any.
fn partner_at(group: &[&PositionRecord], index: usize) -> Option<(usize, usize)> {
    let clicked = group[index];
    if clicked.is_close() {
        (0..index)
            .rev()
            .find(|&i| group[i].is_open())
            .map(|open| (open, index))
    } else {
        (index + 1..group.len())
            .find(|&i| group[i].is_close())
            .map(|close| (index, close))
    }
}

fn pair_at<'p, 't>(
    group: &[&'p PositionRecord],
    index: usize,
    trades: &'t [TradeRecord],
) -> Option<PairWindow<'p, 't>> {
    let (open, close) = partner_at(group, index)?;
    let open_window = window_at(group, open);
    let close_window = window_at(group, close);

    let trades = trades
        .iter()
        .filter(|trade| {
            open_window.contains(trade.executed_at) || close_window.contains(trade.executed_at)
        })
        .collect();

    Some(PairWindow {
        open: group[open],
        close: group[close],
        open_window,
        close_window,
        trades,
    })
}

/// Position groups built once from a snapshot, for repeated lookups.
///
/// Answers exactly like [`window_for_selection`] and [`window_for_pair`].
#[derive(Debug, Clone)]
pub struct PositionIndex<'p> {
    groups: HashMap<GroupKey<'p>, Vec<&'p PositionRecord>>,
    by_id: HashMap<i64, (GroupKey<'p>, usize)>,
}

impl<'p> PositionIndex<'p> {
    pub fn new(positions: &'p [PositionRecord]) -> Self {
        let mut groups = positions
            .iter()
            .map(|position| (position.group_key(), position))
            .into_group_map();
        for group in groups.values_mut() {
            group.sort_by_key(|position| position.executed_at);
        }

        // First occurrence in input order wins for duplicated ids
        let mut by_id = HashMap::with_capacity(positions.len());
        for position in positions {
            if by_id.contains_key(&position.id) {
                continue;
            }
            let key = position.group_key();
            let index = groups.get(&key).and_then(|group| {
                group
                    .iter()
                    .position(|candidate| std::ptr::eq(*candidate, position))
            });
            if let Some(index) = index {
                by_id.insert(position.id, (key, index));
            }
        }

        Self { groups, by_id }
    }

    /// Number of distinct `(bot_name, symbol, carry)` groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Events of one group in time order
    pub fn group(&self, key: &GroupKey<'p>) -> Option<&[&'p PositionRecord]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn position(&self, position_id: i64) -> Option<&'p PositionRecord> {
        let (group, index) = self.lookup(position_id)?;
        Some(group[index])
    }

    pub fn selection_window(&self, position_id: i64) -> Option<ReconciliationWindow> {
        let (group, index) = self.lookup(position_id)?;
        Some(window_at(group, index))
    }

    pub fn window_for_selection<'t>(
        &self,
        position_id: i64,
        trades: &'t [TradeRecord],
    ) -> Vec<&'t TradeRecord> {
        self.selection_window(position_id)
            .map(|window| window.select(trades))
            .unwrap_or_default()
    }

    pub fn window_for_pair<'t>(
        &self,
        position_id: i64,
        trades: &'t [TradeRecord],
    ) -> Option<PairWindow<'p, 't>> {
        let (group, index) = self.lookup(position_id)?;
        pair_at(group, index, trades)
    }

    fn lookup(&self, position_id: i64) -> Option<(&[&'p PositionRecord], usize)> {
        let (key, index) = self.by_id.get(&position_id)?;
        let group = self.groups.get(key)?;
        Some((group.as_slice(), *index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::records::{Carry, MarketType, PositionAction, TradeSide};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn position(id: i64, action: PositionAction, secs: i64) -> PositionRecord {
        grouped(id, "intra", Carry::Carry, action, secs)
    }

    fn grouped(
        id: i64,
        bot_name: &str,
        carry: Carry,
        action: PositionAction,
        secs: i64,
    ) -> PositionRecord {
        PositionRecord {
            id,
            executed_at: at(secs),
            bot_name: bot_name.to_string(),
            symbol: "BTCUSDT".to_string(),
            carry,
            action,
            spot_exchange: Some("bithumb".to_string()),
            futures_exchange: Some("binance".to_string()),
            spot_price: None,
            futures_price: None,
            quantity: Some(0.01),
            basis_bps: None,
        }
    }

    fn trade(id: i64, secs: i64) -> TradeRecord {
        TradeRecord {
            id,
            executed_at: at(secs),
            exchange: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            market_type: MarketType::Futures,
            side: TradeSide::Sell,
            quantity: 0.01,
            price: Some(100_000.0),
            order_id: None,
            reduce_only: false,
            is_liquidation: false,
        }
    }

    fn times(trades: &[&TradeRecord]) -> Vec<i64> {
        trades.iter().map(|t| t.executed_at.timestamp()).collect()
    }

    #[test]
    fn test_open_close_group() {
        let positions = vec![
            position(1, PositionAction::Open, 0),
            position(2, PositionAction::Close, 100),
        ];
        let trades = vec![trade(1, 10), trade(2, 50), trade(3, 150)];

        assert_eq!(times(&window_for_selection(2, &positions, &trades)), vec![10, 50]);
        assert!(window_for_selection(1, &positions, &trades).is_empty());

        for clicked in [1, 2] {
            let pair = window_for_pair(clicked, &positions, &trades).unwrap();
            assert_eq!(pair.open.id, 1);
            assert_eq!(pair.close.id, 2);
            assert_eq!(times(&pair.trades), vec![10, 50]);
        }
    }

    #[test]
    fn test_window_bounds_are_half_open() {
        let positions = vec![
            position(1, PositionAction::Open, 100),
            position(2, PositionAction::Close, 200),
        ];
        let trades = vec![trade(1, 99), trade(2, 100), trade(3, 199), trade(4, 200)];

        assert_eq!(times(&window_for_selection(2, &positions, &trades)), vec![100, 199]);
        assert_eq!(times(&window_for_selection(1, &positions, &trades)), vec![99]);
        assert_eq!(
            selection_window(1, &positions),
            Some(ReconciliationWindow { start: None, end: at(100) })
        );
    }

    #[test]
    fn test_groups_are_isolated_by_composite_key() {
        let positions = vec![
            grouped(1, "intra", Carry::Carry, PositionAction::Open, 0),
            grouped(2, "intra", Carry::Reverse, PositionAction::Open, 50),
            grouped(3, "cross", Carry::Carry, PositionAction::Open, 60),
            grouped(4, "intra", Carry::Carry, PositionAction::Close, 100),
        ];
        let trades = vec![trade(1, 10), trade(2, 70)];

        // Events of other groups do not narrow the window
        assert_eq!(times(&window_for_selection(4, &positions, &trades)), vec![10, 70]);
        assert_eq!(times(&window_for_selection(2, &positions, &trades)), vec![10]);
    }

    #[test]
    fn test_unordered_input_is_sorted_per_group() {
        let positions = vec![
            position(3, PositionAction::Close, 300),
            position(1, PositionAction::Open, 100),
            position(2, PositionAction::Close, 200),
        ];
        let trades = vec![trade(1, 150), trade(2, 250)];

        assert_eq!(times(&window_for_selection(3, &positions, &trades)), vec![250]);
        assert_eq!(times(&window_for_selection(2, &positions, &trades)), vec![150]);
    }

    #[test]
    fn test_equal_instants_keep_input_order() {
        let positions = vec![
            position(1, PositionAction::Open, 0),
            position(2, PositionAction::Close, 100),
            position(3, PositionAction::Open, 100),
        ];

        // id 3 sorts after id 2, so its window is [100, 100): empty
        assert_eq!(
            selection_window(3, &positions),
            Some(ReconciliationWindow { start: Some(at(100)), end: at(100) })
        );
        assert_eq!(
            selection_window(2, &positions),
            Some(ReconciliationWindow { start: Some(at(0)), end: at(100) })
        );
    }

    #[test]
    fn test_pair_excludes_trades_of_intervening_events() {
        let positions = vec![
            position(1, PositionAction::Open, 0),
            position(2, PositionAction::Open, 100),
            position(3, PositionAction::Close, 200),
        ];
        let trades = vec![trade(1, 50), trade(2, 150), trade(3, 250)];

        // Close 3 pairs with the nearest preceding Open, which is 2
        let pair = window_for_pair(3, &positions, &trades).unwrap();
        assert_eq!(pair.open.id, 2);
        assert_eq!(times(&pair.trades), vec![50, 150]);

        // Open 1 pairs with Close 3; trade at 50 belongs to Open 2's window
        let pair = window_for_pair(1, &positions, &trades).unwrap();
        assert_eq!((pair.open.id, pair.close.id), (1, 3));
        assert_eq!(times(&pair.trades), vec![150]);
    }

    #[test]
    fn test_pair_is_union_of_selection_windows() {
        let positions = vec![
            position(1, PositionAction::Close, 10),
            position(2, PositionAction::Open, 20),
            position(3, PositionAction::Close, 30),
            position(4, PositionAction::Open, 40),
            position(5, PositionAction::Close, 50),
        ];
        let trades: Vec<TradeRecord> = (0..60).step_by(3).map(|s| trade(s, s)).collect();

        for clicked in [2, 3, 4, 5] {
            let pair = window_for_pair(clicked, &positions, &trades).unwrap();
            let mut expected = window_for_selection(pair.open.id, &positions, &trades);
            expected.extend(window_for_selection(pair.close.id, &positions, &trades));
            expected.sort_by_key(|t| t.executed_at);
            assert_eq!(times(&pair.trades), times(&expected), "clicked {}", clicked);
        }
    }

    #[test]
    fn test_pair_misses() {
        struct TestCase {
            positions: Vec<PositionRecord>,
            clicked: i64,
        }

        let tests = vec![
            TestCase {
                // TC0: Close without a preceding Open
                positions: vec![position(1, PositionAction::Close, 10)],
                clicked: 1,
            },
            TestCase {
                // TC1: Open without a following Close
                positions: vec![
                    position(1, PositionAction::Close, 10),
                    position(2, PositionAction::Open, 20),
                ],
                clicked: 2,
            },
            TestCase {
                // TC2: partner exists only in another group
                positions: vec![
                    grouped(1, "intra", Carry::Carry, PositionAction::Open, 10),
                    grouped(2, "intra", Carry::Reverse, PositionAction::Close, 20),
                ],
                clicked: 1,
            },
            TestCase {
                // TC3: unknown id
                positions: vec![position(1, PositionAction::Open, 10)],
                clicked: 42,
            },
        ];

        let trades = vec![trade(1, 5), trade(2, 15)];
        for (index, test) in tests.into_iter().enumerate() {
            assert!(
                window_for_pair(test.clicked, &test.positions, &trades).is_none(),
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_unknown_selection_is_empty() {
        let positions = vec![position(1, PositionAction::Open, 10)];
        let trades = vec![trade(1, 5)];

        assert!(window_for_selection(9, &positions, &trades).is_empty());
        assert_eq!(selection_window(9, &positions), None);
    }

    #[test]
    fn test_index_matches_linear_scan() {
        let positions = vec![
            grouped(1, "intra", Carry::Carry, PositionAction::Open, 0),
            grouped(2, "intra", Carry::Reverse, PositionAction::Open, 5),
            grouped(3, "cross", Carry::Carry, PositionAction::Open, 12),
            grouped(4, "intra", Carry::Carry, PositionAction::Close, 20),
            grouped(5, "intra", Carry::Reverse, PositionAction::Close, 25),
            grouped(6, "intra", Carry::Carry, PositionAction::Open, 20),
            grouped(7, "cross", Carry::Carry, PositionAction::Close, 31),
            grouped(8, "intra", Carry::Carry, PositionAction::Close, 40),
        ];
        let trades: Vec<TradeRecord> = (0..45).map(|s| trade(s, s)).collect();
        let index = PositionIndex::new(&positions);

        assert_eq!(index.group_count(), 3);
        for position in &positions {
            assert_eq!(
                index.window_for_selection(position.id, &trades),
                window_for_selection(position.id, &positions, &trades),
                "selection {}",
                position.id
            );
            assert_eq!(
                index.window_for_pair(position.id, &trades),
                window_for_pair(position.id, &positions, &trades),
                "pair {}",
                position.id
            );
        }
        assert!(index.window_for_selection(99, &trades).is_empty());
    }
}
