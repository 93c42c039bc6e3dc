//! Observer Ports
//!
//! Broadcasts are fire-and-forget: delivery failures are logged by the
//! sink, never propagated into a trading cycle. Observers reconstruct the
//! full decision trail from these events without reading engine state.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::entities::order::OrderSide;
use crate::domain::entities::position::ExitReason;
use crate::domain::entities::signal::Signal;

/// Event emitted on the broadcast sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ResearchCompleted {
        symbol: String,
        signal: Signal,
        accuracy: f64,
        recommended_action: String,
    },
    ExecutionSkipped {
        user: String,
        symbol: String,
        reason: String,
    },
    TradeExecuted {
        user: String,
        symbol: String,
        side: OrderSide,
        quantity: f64,
        price: Option<f64>,
        strategy: String,
        accuracy: f64,
        latency_ms: f64,
        slippage_pct: f64,
    },
    RiskAlert {
        user: String,
        symbol: String,
        reason: String,
    },
    PositionClosed {
        user: String,
        symbol: String,
        position_id: String,
        reason: ExitReason,
        price: f64,
    },
}

/// Fire-and-forget broadcast sink.
pub trait EventSink: Send + Sync {
    fn broadcast(&self, event: EngineEvent);
}

/// Trade metrics sink sampled on every execution attempt.
pub trait MetricsSink: Send + Sync {
    fn record_trade(&self, user: &str, strategy: &str, success: bool, latency_ms: Option<f64>);
}

/// Optional administrative observer channel.
#[async_trait]
pub trait AdminChannel: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), String>;
}
