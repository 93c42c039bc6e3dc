//! Strategy Collaborator Port

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::signal::{ResearchResult, TradeDecision};
use crate::domain::repositories::market_data::OrderBook;

/// Strategy that quotes continuously instead of acting on research. It runs
/// inside the quote engine only; the execution engine refuses to dispatch it.
pub const HIGH_FREQUENCY_MM: &str = "high-frequency-mm";

#[derive(Debug, Error, Clone)]
pub enum StrategyError {
    #[error("Strategy '{0}' is already initialized")]
    AlreadyInitialized(String),

    #[error("Unknown strategy: {0}")]
    Unknown(String),

    #[error("Strategy execution failed: {0}")]
    ExecutionFailed(String),
}

#[async_trait]
pub trait StrategyEngine: Send + Sync {
    /// Prepare a strategy instance for the user.
    ///
    /// Must tolerate repeat initialization: callers swallow
    /// [`StrategyError::AlreadyInitialized`].
    async fn initialize(
        &self,
        user: &str,
        name: &str,
        config: serde_json::Value,
    ) -> Result<(), StrategyError>;

    /// Turn a research result into a trade decision.
    ///
    /// `None` means the strategy declined to produce a decision at all.
    async fn execute(
        &self,
        user: &str,
        name: &str,
        research: &ResearchResult,
        book: &OrderBook,
    ) -> Result<Option<TradeDecision>, StrategyError>;
}
