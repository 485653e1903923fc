/// Interval-driven refresh of the trade and position record snapshots.
///
/// A failed refresh halts polling: the failure stays published until
/// [`RecordsPoller::retry`] is called.

use crate::error::FetchError;
use crate::shared::records::{PositionRecord, TradeRecord};
use crate::shared::rest::RecordsClient;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Immutable snapshot of both record sets
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    pub trades: Arc<[TradeRecord]>,
    pub positions: Arc<[PositionRecord]>,
    pub fetched_at: DateTime<Utc>,
}

impl RecordSnapshot {
    pub fn new(trades: Vec<TradeRecord>, positions: Vec<PositionRecord>) -> Self {
        Self {
            trades: trades.into(),
            positions: positions.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Published state of the record refresh
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecordsState {
    #[default]
    Loading,
    Loaded(RecordSnapshot),
    Failed(FetchError),
}

/// Anything that can produce a fresh record snapshot
pub trait RecordSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<RecordSnapshot, FetchError>> + Send;
}

impl RecordSource for RecordsClient {
    async fn fetch(&self) -> Result<RecordSnapshot, FetchError> {
        let (trades, positions) = tokio::try_join!(self.trade_records(), self.position_records())?;
        Ok(RecordSnapshot::new(trades, positions))
    }
}

/// Background task refreshing records every `interval`
#[derive(Debug)]
pub struct RecordsPoller {
    retry: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<RecordsState>,
    task: Option<JoinHandle<()>>,
}

impl RecordsPoller {
    /// Spawn the poll task. The first refresh starts immediately.
    pub fn spawn<S: RecordSource>(source: S, interval: Duration) -> Self {
        let retry = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(RecordsState::Loading);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_poll_loop(
            source,
            interval,
            state_tx,
            Arc::clone(&retry),
            shutdown_rx,
        ));

        Self {
            retry,
            shutdown_tx,
            state_rx,
            task: Some(task),
        }
    }

    /// Receiver for state changes
    pub fn subscribe(&self) -> watch::Receiver<RecordsState> {
        self.state_rx.clone()
    }

    /// Refresh now; resumes polling after a failure
    pub fn retry(&self) {
        self.retry.notify_one();
    }

    /// Stop polling and wait for the task
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Records poller task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for RecordsPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_poll_loop<S: RecordSource>(
    source: S,
    period: Duration,
    state_tx: watch::Sender<RecordsState>,
    retry: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown_rx) => break,
            _ = ticker.tick() => {}
            _ = retry.notified() => ticker.reset(),
        }

        let result = tokio::select! {
            _ = stopped(&mut shutdown_rx) => break,
            result = source.fetch() => result,
        };

        match result {
            Ok(snapshot) => {
                info!(
                    trades = snapshot.trades.len(),
                    positions = snapshot.positions.len(),
                    "Record snapshot refreshed"
                );
                state_tx.send_replace(RecordsState::Loaded(snapshot));
            }
            Err(error) => {
                error!(%error, "Record refresh failed, polling halted until retry");
                state_tx.send_replace(RecordsState::Failed(error));

                tokio::select! {
                    _ = stopped(&mut shutdown_rx) => break,
                    _ = retry.notified() => {
                        info!("Retrying record refresh");
                        state_tx.send_replace(RecordsState::Loading);
                        ticker.reset_immediately();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSource {
        script: Mutex<VecDeque<Result<RecordSnapshot, FetchError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl RecordSource for ScriptedSource {
        fn fetch(&self) -> impl Future<Output = Result<RecordSnapshot, FetchError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            async move { next.unwrap_or_else(|| Ok(RecordSnapshot::new(Vec::new(), Vec::new()))) }
        }
    }

    fn failure() -> FetchError {
        FetchError::Status {
            url: "http://127.0.0.1:8080/trade-records".to_string(),
            status: 500,
            message: "Repository not initialized".to_string(),
        }
    }

    async fn next_state(rx: &mut watch::Receiver<RecordsState>) -> RecordsState {
        rx.changed().await.unwrap();
        rx.borrow_and_update().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_halts_polling_until_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            script: Mutex::new(VecDeque::from(vec![
                Ok(RecordSnapshot::new(Vec::new(), Vec::new())),
                Err(failure()),
            ])),
            calls: Arc::clone(&calls),
        };

        let poller = RecordsPoller::spawn(source, Duration::from_secs(5));
        let mut rx = poller.subscribe();

        assert!(matches!(next_state(&mut rx).await, RecordsState::Loaded(_)));
        assert_eq!(next_state(&mut rx).await, RecordsState::Failed(failure()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // No automatic retry
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        poller.retry();
        rx.wait_for(|state| matches!(state, RecordsState::Loaded(_)))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            script: Mutex::new(VecDeque::new()),
            calls: Arc::clone(&calls),
        };

        let poller = RecordsPoller::spawn(source, Duration::from_secs(5));
        let mut rx = poller.subscribe();
        next_state(&mut rx).await;

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        poller.shutdown().await;
    }
}
