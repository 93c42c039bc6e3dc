//! Order Gateway Port
//!
//! Order placement and cancellation are required of every gateway; position
//! enumeration is a separate capability trait that implementations opt into
//! and callers wire in at composition time. Engines that receive no
//! `PositionTracking` handle tolerate its absence rather than failing.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::order::{Order, OrderRequest};
use crate::domain::entities::position::Position;

/// Common result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("Order placement failed: {0}")]
    PlacementFailed(String),

    #[error("Order cancellation failed: {0}")]
    CancellationFailed(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Position query failed: {0}")]
    PositionQueryFailed(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Place an order for the given user.
    ///
    /// # Returns
    /// The gateway's acknowledgement carrying the assigned order id.
    async fn place_order(&self, user: &str, request: &OrderRequest) -> GatewayResult<Order>;

    /// Cancel an order by its gateway-assigned id.
    async fn cancel_order(&self, order_id: &str) -> GatewayResult<()>;
}

/// Optional capability: gateways that can enumerate and close positions.
#[async_trait]
pub trait PositionTracking: Send + Sync {
    async fn open_positions(&self, user: &str, symbol: &str) -> GatewayResult<Vec<Position>>;

    async fn close_position(
        &self,
        user: &str,
        symbol: &str,
        position_id: &str,
    ) -> GatewayResult<()>;

    /// Net signed exposure across open positions (long positive).
    async fn net_position(&self, user: &str, symbol: &str) -> GatewayResult<f64> {
        let positions = self.open_positions(user, symbol).await?;
        Ok(positions.iter().map(|p| p.signed_quantity()).sum())
    }
}
