/// Shared modules for the basis monitor
pub mod buffer;
pub mod candles;
pub mod poller;
pub mod reconcile;
pub mod records;
pub mod rest;
pub mod session;
pub mod types;
pub mod websocket;
