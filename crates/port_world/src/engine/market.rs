//! Market pricing: supply/demand pressure, oracle influence, event
//! modifiers, and immediate order execution against the per-resource markets.

use serde::{Deserialize, Serialize};

use super::events;
use super::types::{OrderSide, ResourceKind};
use super::world_model::{WorldConfig, WorldModel};

// ============================================================================
// Oracle
// ============================================================================

/// External price-feed state. The baseline is captured once at world start;
/// a missing reading holds the last-known value rather than snapping to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleState {
    pub baseline_price: f64,
    pub last_price: f64,
    pub degraded: bool,
}

impl OracleState {
    pub fn new(baseline_price: f64) -> Self {
        Self {
            baseline_price,
            last_price: baseline_price,
            degraded: false,
        }
    }

    /// Feed the tick's external reading, or `None` when the feed is down.
    pub fn observe(&mut self, reading: Option<f64>) {
        match reading {
            Some(price) if price > 0.0 => {
                self.last_price = price;
                self.degraded = false;
            }
            _ => {
                self.degraded = true;
            }
        }
    }

    /// Relative deviation of the last reading from the baseline.
    pub fn deviation(&self) -> f64 {
        if self.baseline_price <= 0.0 {
            return 0.0;
        }
        (self.last_price - self.baseline_price) / self.baseline_price
    }
}

// ============================================================================
// Order Execution
// ============================================================================

/// Cost breakdown of an order about to execute at the current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeQuote {
    pub gross: i64,
    pub tax: i64,
}

impl TradeQuote {
    /// Credits the buyer must hold: gross plus tax.
    pub fn buy_total(&self) -> i64 {
        self.gross.saturating_add(self.tax)
    }

    /// Credits the seller receives: gross minus tax.
    pub fn sell_proceeds(&self) -> i64 {
        self.gross.saturating_sub(self.tax)
    }
}

pub fn quote(model: &WorldModel, config: &WorldConfig, resource: ResourceKind, quantity: i64) -> Option<TradeQuote> {
    let market = model.markets.get(&resource)?;
    let gross = (market.current_price * quantity as f64).round() as i64;
    let tax = (gross as f64 * config.market.tax_rate).round() as i64;
    Some(TradeQuote { gross, tax })
}

/// Record an executed order's price impact. Buys push the next price up,
/// sells push it down; the impact lands at the next market advance.
pub fn record_pressure(
    model: &mut WorldModel,
    config: &WorldConfig,
    resource: ResourceKind,
    side: OrderSide,
    quantity: i64,
) {
    if let Some(market) = model.markets.get_mut(&resource) {
        let impact = quantity as f64 * config.market.pressure_per_unit;
        match side {
            OrderSide::Buy => market.pending_pressure += impact,
            OrderSide::Sell => market.pending_pressure -= impact,
        }
    }
}

// ============================================================================
// Price Advancement
// ============================================================================

/// Recompute every resource price for the new tick:
/// decayed pressure + oracle term, scaled by the event multiplier, clamped
/// to the per-resource floor/ceiling band.
pub fn advance(model: &mut WorldModel, config: &WorldConfig, oracle: &OracleState) {
    let deviation = oracle.deviation();
    let event_factor = events::market_factor(model);

    for market in model.markets.values_mut() {
        market.pressure = market.pressure * config.market.pressure_decay + market.pending_pressure;
        market.pending_pressure = 0.0;

        let oracle_term = deviation * market.oracle_sensitivity;
        let raw = market.base_price * (1.0 + market.pressure + oracle_term) * event_factor;
        market.current_price = raw.clamp(market.floor_price(), market.ceiling_price());
    }
}
