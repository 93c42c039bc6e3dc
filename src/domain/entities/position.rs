use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::value_objects::{pnl::PnL, price::Price, quantity::Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Why the exit monitor closed a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Expired,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::Expired => write!(f, "expired"),
        }
    }
}

/// An open position as reported by the order gateway.
///
/// The exit monitor evaluates the triggers against a fresh mid-price every
/// sweep; positions carry no cached market price of their own.
#[derive(Debug, Clone)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Quantity,
    pub entry_price: Price,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub opened_at: DateTime<Utc>,
    pub time_to_live: Option<Duration>,
}

impl Position {
    /// Signed exposure: long positive, short negative.
    pub fn signed_quantity(&self) -> f64 {
        match self.side {
            PositionSide::Long => self.quantity.value(),
            PositionSide::Short => -self.quantity.value(),
        }
    }

    pub fn should_stop_loss(&self, current: Price) -> bool {
        match (self.stop_loss, self.side) {
            (Some(stop), PositionSide::Long) => current.value() <= stop.value(),
            (Some(stop), PositionSide::Short) => current.value() >= stop.value(),
            (None, _) => false,
        }
    }

    pub fn should_take_profit(&self, current: Price) -> bool {
        match (self.take_profit, self.side) {
            (Some(target), PositionSide::Long) => current.value() >= target.value(),
            (Some(target), PositionSide::Short) => current.value() <= target.value(),
            (None, _) => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.time_to_live {
            Some(ttl) => {
                let age = now.signed_duration_since(self.opened_at);
                age.num_milliseconds() >= ttl.as_millis() as i64
            }
            None => false,
        }
    }

    /// Which exit trigger fires at `current`, if any.
    ///
    /// Stop-loss takes priority over take-profit, expiry comes last.
    pub fn exit_trigger(&self, current: Price, now: DateTime<Utc>) -> Option<ExitReason> {
        if self.should_stop_loss(current) {
            Some(ExitReason::StopLoss)
        } else if self.should_take_profit(current) {
            Some(ExitReason::TakeProfit)
        } else if self.is_expired(now) {
            Some(ExitReason::Expired)
        } else {
            None
        }
    }

    pub fn unrealized_pnl(&self, current: Price) -> PnL {
        let diff = match self.side {
            PositionSide::Long => current.value() - self.entry_price.value(),
            PositionSide::Short => self.entry_price.value() - current.value(),
        };
        PnL::new(diff * self.quantity.value()).unwrap_or_else(|_| PnL::zero())
    }
}
