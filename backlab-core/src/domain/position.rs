use serde::{Deserialize, Serialize};

/// Quantities at or below this are treated as flat. Only relevant when
/// fractional sizing is enabled.
pub const QTY_EPSILON: f64 = 1e-9;

/// Holding in one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub quantity: f64,
    /// Average execution price paid, slippage included.
    pub avg_price: f64,
    /// Last market price used to value this holding.
    pub last_mark: f64,
}

impl Position {
    pub fn new(instrument: impl Into<String>, quantity: f64, avg_price: f64, mark: f64) -> Self {
        Self {
            instrument: instrument.into(),
            quantity,
            avg_price,
            last_mark: mark,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity <= QTY_EPSILON
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.last_mark
    }

    /// Add to the holding, folding the new fill into the average price.
    pub fn add(&mut self, quantity: f64, exec_price: f64) {
        let total = self.quantity + quantity;
        if total > 0.0 {
            self.avg_price = (self.avg_price * self.quantity + exec_price * quantity) / total;
        }
        self.quantity = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_averages_price() {
        let mut pos = Position::new("AAA", 10.0, 100.0, 100.0);
        pos.add(10.0, 110.0);
        assert_eq!(pos.quantity, 20.0);
        assert!((pos.avg_price - 105.0).abs() < 1e-12);
    }

    #[test]
    fn market_value_uses_mark() {
        let mut pos = Position::new("AAA", 5.0, 100.0, 100.0);
        pos.last_mark = 120.0;
        assert_eq!(pos.market_value(), 600.0);
    }
}
