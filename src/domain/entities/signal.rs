use serde::{Deserialize, Serialize};

use crate::domain::entities::order::OrderType;

/// Direction recommended by research or a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Outcome of one research run for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub symbol: String,
    pub signal: Signal,
    /// Model accuracy in [0, 1]; gated against the user's threshold.
    pub accuracy: f64,
    pub recommended_action: String,
}

impl ResearchResult {
    pub fn is_actionable(&self) -> bool {
        self.signal != Signal::Hold
    }
}

/// What the strategy collaborator decided to do with a research result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    pub action: Signal,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    /// Stated reason when the strategy declines to act.
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable() {
        let mut research = ResearchResult {
            symbol: "BTCUSDT".to_string(),
            signal: Signal::Buy,
            accuracy: 0.8,
            recommended_action: "Enter long".to_string(),
        };
        assert!(research.is_actionable());
        research.signal = Signal::Hold;
        assert!(!research.is_actionable());
    }

    #[test]
    fn test_signal_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Signal::Buy).unwrap(), "\"BUY\"");
        assert_eq!(
            serde_json::from_str::<Signal>("\"HOLD\"").unwrap(),
            Signal::Hold
        );
    }
}
