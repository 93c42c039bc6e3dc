//! Market Data Port
//!
//! The engines consume top-of-book snapshots through this trait. Feeds that
//! support push updates may hand out a watch channel; the scheduling loops
//! still drain the latest snapshot once per cycle so re-quote decisions
//! happen in exactly one place.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// Common result type for market data operations
pub type MarketDataResult<T> = Result<T, MarketDataError>;

#[derive(Debug, Error, Clone)]
pub enum MarketDataError {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Malformed order book: {0}")]
    Malformed(String),
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot, best prices first.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|level| level.price)
    }

    /// Average of best bid and best ask; `None` when either side is empty.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}

/// Market data source the engines poll each cycle.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Fetch an order book snapshot limited to `depth` levels per side.
    async fn get_orderbook(&self, symbol: &str, depth: usize) -> MarketDataResult<OrderBook>;

    /// Optional push subscription. Polling-only feeds return `None`.
    fn subscribe_orderbook(&self, _symbol: &str) -> Option<watch::Receiver<Option<OrderBook>>> {
        None
    }
}
