use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Order status as reported by the order gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Unknown,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Order submission handed to the order gateway.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
}

impl OrderRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        quantity: Quantity,
        price: Option<Price>,
    ) -> Result<Self, ValidationError> {
        if matches!(order_type, OrderType::Limit) && price.is_none() {
            return Err(ValidationError::LimitOrderWithoutPrice);
        }
        Ok(OrderRequest {
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            price,
        })
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            symbol,
            side,
            OrderType::Limit,
            Quantity::new(quantity)?,
            Some(Price::new(price)?),
        )
    }

    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Self, ValidationError> {
        Self::new(symbol, side, OrderType::Market, Quantity::new(quantity)?, None)
    }
}

/// Order acknowledgement returned by the order gateway.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,
    pub avg_price: Option<f64>,
    pub status: OrderStatus,
}

impl Order {
    /// Best available fill price: the average fill when reported,
    /// otherwise the submitted limit price.
    pub fn fill_price(&self) -> Option<f64> {
        self.avg_price.or(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_request() {
        let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 0.5, 50000.0).unwrap();
        assert_eq!(request.symbol, "BTCUSDT");
        assert_eq!(request.side, OrderSide::Buy);
        assert_eq!(request.order_type, OrderType::Limit);
        assert_eq!(request.quantity.value(), 0.5);
        assert_eq!(request.price.unwrap().value(), 50000.0);
    }

    #[test]
    fn test_market_request_has_no_price() {
        let request = OrderRequest::market("ETHUSDT", OrderSide::Sell, 1.0).unwrap();
        assert!(request.price.is_none());
    }

    #[test]
    fn test_limit_without_price_rejected() {
        let result = OrderRequest::new(
            "BTCUSDT",
            OrderSide::Buy,
            OrderType::Limit,
            Quantity::new(1.0).unwrap(),
            None,
        );
        assert_eq!(result.unwrap_err(), ValidationError::LimitOrderWithoutPrice);
    }

    #[test]
    fn test_negative_quantity_rejected() {
        assert!(OrderRequest::market("BTCUSDT", OrderSide::Buy, -1.0).is_err());
    }

    #[test]
    fn test_fill_price_prefers_avg() {
        let order = Order {
            id: "1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            quantity: 1.0,
            price: Some(50000.0),
            avg_price: Some(50010.0),
            status: OrderStatus::Filled,
        };
        assert_eq!(order.fill_price(), Some(50010.0));
    }

    #[test]
    fn test_side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }
}
