use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value < 0.0 {
            return Err(ValidationError::NegativePrice);
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Mid-price between a bid and an ask.
    pub fn midpoint(bid: Price, ask: Price) -> Price {
        Price((bid.0 + ask.0) / 2.0)
    }

    /// Absolute relative move from `baseline` to this price.
    ///
    /// Returns 0.0 when the baseline is zero (no meaningful reference).
    pub fn relative_move_from(&self, baseline: Price) -> f64 {
        if baseline.0 == 0.0 {
            return 0.0;
        }
        ((self.0 - baseline.0) / baseline.0).abs()
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
