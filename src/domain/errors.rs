use thiserror::Error;

use crate::domain::repositories::market_data::MarketDataError;
use crate::domain::repositories::order_gateway::GatewayError;
use crate::domain::repositories::research::ResearchError;
use crate::domain::repositories::settings_store::StoreError;
use crate::domain::repositories::strategy_engine::StrategyError;

/// Validation failures for domain value objects and entities.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Price must be non-negative")]
    NegativePrice,

    #[error("Quantity must be non-negative")]
    NegativeQuantity,

    #[error("Value must be finite")]
    MustBeFinite,

    #[error("Limit orders must have a price")]
    LimitOrderWithoutPrice,
}

/// Top-level error type for the engine control loops.
///
/// Business denials (risk limits, accuracy gates, hold signals) are never
/// represented here; they travel as result values with a reason string.
/// This type covers caller-contract violations and collaborator failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("No trading context configured for this engine")]
    MissingUserContext,

    #[error("No settings found for user: {0}")]
    MissingSettings(String),

    #[error("Strategy '{0}' is reserved for the quote engine")]
    ReservedStrategy(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Order gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}
