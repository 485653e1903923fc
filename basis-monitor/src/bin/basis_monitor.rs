/// Basis Monitor
///
/// Streams the simulator's order book and trades into candles, refreshes the
/// bot's trade/position records and answers reconciliation queries typed on
/// stdin. Everything is reported through `tracing`.
use std::error::Error;

use basis_monitor::{
    ChannelEvent, ConnectionStatus, IngestionChannel, MonitorConfig, MonitorSession, OrderRequest,
    ReconciliationView, RecordsClient, RecordsPoller, RecordsState, Side,
};
use rustls::crypto::ring::default_provider;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

const HELP: &str = "commands: select <id> | pair <id> | clear | retry | reset | \
                    order <buy|sell> <limit|market> <qty> [price] | quit";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Select(i64),
    Pair(i64),
    Clear,
    Retry,
    Reset,
    Order(OrderRequest),
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or_else(|| HELP.to_string())?;
    let args: Vec<&str> = parts.collect();

    let id = |args: &[&str]| -> Result<i64, String> {
        match args {
            [id] => id.parse().map_err(|_| format!("invalid position id: {id}")),
            _ => Err(format!("{verb} expects one position id")),
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "select" => id(&args).map(Command::Select),
        "pair" => id(&args).map(Command::Pair),
        "clear" => Ok(Command::Clear),
        "retry" => Ok(Command::Retry),
        "reset" => Ok(Command::Reset),
        "quit" | "exit" => Ok(Command::Quit),
        "order" => parse_order(&args).map(Command::Order),
        _ => Err(HELP.to_string()),
    }
}

fn parse_order(args: &[&str]) -> Result<OrderRequest, String> {
    let [side, kind, quantity, rest @ ..] = args else {
        return Err(HELP.to_string());
    };

    let side = match side.to_ascii_lowercase().as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => return Err(format!("invalid side: {other}")),
    };
    let quantity: f64 = quantity
        .parse()
        .map_err(|_| format!("invalid quantity: {quantity}"))?;

    match (kind.to_ascii_lowercase().as_str(), rest) {
        ("market", []) => Ok(OrderRequest::market(side, quantity)),
        ("limit", [price]) => {
            let price: f64 = price.parse().map_err(|_| format!("invalid price: {price}"))?;
            Ok(OrderRequest::limit(side, price, quantity))
        }
        ("limit", []) => Err("limit order requires a price".to_string()),
        _ => Err(HELP.to_string()),
    }
}

fn report_view(view: &ReconciliationView) {
    match view {
        ReconciliationView::Selection {
            position,
            window,
            trades,
        } => {
            info!(
                position = position.id,
                bot = %position.bot_name,
                symbol = %position.symbol,
                start = ?window.start,
                end = %window.end,
                trades = trades.len(),
                "Position reconciliation"
            );
            for trade in trades {
                info!(
                    id = trade.id,
                    executed_at = %trade.executed_at,
                    exchange = %trade.exchange,
                    side = ?trade.side,
                    quantity = trade.quantity,
                    price = ?trade.price,
                    "  trade"
                );
            }
        }
        ReconciliationView::Pair {
            open,
            close,
            trades,
        } => {
            info!(
                open = open.id,
                close = close.id,
                opened_at = %open.executed_at,
                closed_at = %close.executed_at,
                trades = trades.len(),
                "Pair reconciliation"
            );
            for trade in trades {
                info!(
                    id = trade.id,
                    executed_at = %trade.executed_at,
                    exchange = %trade.exchange,
                    side = ?trade.side,
                    quantity = trade.quantity,
                    "  trade"
                );
            }
        }
        ReconciliationView::NoRelatedRecords { position_id } => {
            info!(position = position_id, "No related trade records");
        }
    }
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = default_provider().install_default();
    init_logging();

    let config = MonitorConfig::from_env()?;
    info!(
        stream = %config.stream_url,
        records = %config.records_url,
        bucket_ms = config.bucket_size.num_milliseconds(),
        "Starting basis monitor"
    );

    let client = RecordsClient::new(
        config.records_url.clone(),
        config.simulator_url.clone(),
        config.request_timeout,
    )?;
    match client.health().await {
        Ok(true) => info!("Records API healthy"),
        Ok(false) => warn!("Records API reports unhealthy"),
        Err(e) => warn!("Records API health check failed: {}", e),
    }

    let (channel, mut events) = IngestionChannel::with_config(config.channel_config()).open();
    let mut status_rx = channel.subscribe_status();

    let poller = RecordsPoller::spawn(client.clone(), config.poll_interval);
    let mut records_rx = poller.subscribe();

    let mut session = MonitorSession::new(config.bucket_size);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    info!("{}", HELP);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if let ChannelEvent::OrderBookUpdate(book) = &event {
                    debug!(
                        bid = ?book.best_bid(),
                        ask = ?book.best_ask(),
                        spread = ?book.spread(),
                        "Order book"
                    );
                }
                if let Some(candle) = session.apply_event(event) {
                    info!(
                        bucket = %candle.bucket_start,
                        open = candle.open,
                        high = candle.high,
                        low = candle.low,
                        close = candle.close,
                        candles = session.candles().len(),
                        "Candle"
                    );
                }
            }
            Ok(()) = status_rx.changed() => {
                let status = *status_rx.borrow_and_update();
                session.set_status(status);
                match status {
                    ConnectionStatus::Connected => info!("Stream {}", status.label()),
                    _ => warn!("Stream {}, showing last known state", status.label()),
                }
            }
            Ok(()) = records_rx.changed() => {
                let state = records_rx.borrow_and_update().clone();
                if let RecordsState::Failed(e) = &state {
                    error!("Records unavailable: {} (type `retry` to refresh)", e);
                }
                let had_view = session.view().is_some();
                session.apply_records(state);
                if had_view {
                    if let Some(view) = session.view() {
                        report_view(view);
                    }
                }
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!("stdin closed: {}", e);
                        stdin_open = false;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                match parse_command(&line) {
                    Ok(Command::Select(id)) => report_view(session.select_position(id)),
                    Ok(Command::Pair(id)) => {
                        if session.select_pair(id) {
                            if let Some(view) = session.view() {
                                report_view(view);
                            }
                        } else {
                            warn!(position = id, "No open/close pair for position");
                        }
                    }
                    Ok(Command::Clear) => session.clear_selection(),
                    Ok(Command::Retry) => poller.retry(),
                    Ok(Command::Reset) => {
                        session.reset();
                        info!("Candles and recent trades discarded");
                    }
                    Ok(Command::Order(request)) => {
                        let client = client.clone();
                        tokio::spawn(async move {
                            if let Err(e) = client.submit_order(&request).await {
                                error!("Order rejected: {}", e);
                            }
                        });
                    }
                    Ok(Command::Quit) => break,
                    Err(message) => warn!("{}", message),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!("Shutting down");
    channel.close().await;
    poller.shutdown().await;
    Ok(())
}
