//! World bootstrap: fixed market table, oracle baseline capture, and
//! engine construction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::kernel::{EngineError, WorldEngine};
use super::ledger::Ledger;
use super::market::OracleState;
use super::types::ResourceKind;
use super::world_model::{ResourceMarket, WorldConfig, WorldModel};

pub const BASE_PRICE_IRON: f64 = 15.0;
pub const BASE_PRICE_WOOD: f64 = 12.0;
pub const BASE_PRICE_FISH: f64 = 8.0;

pub const ORACLE_SENSITIVITY_IRON: f64 = 60.0;
pub const ORACLE_SENSITIVITY_WOOD: f64 = 40.0;
pub const ORACLE_SENSITIVITY_FISH: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldInit {
    pub config: WorldConfig,
    pub seed: u64,
    /// External price captured once at world start; the oracle term is the
    /// deviation of later readings from this value.
    pub oracle_baseline_price: f64,
}

impl Default for WorldInit {
    fn default() -> Self {
        Self {
            config: WorldConfig::default(),
            seed: 0,
            oracle_baseline_price: 100.0,
        }
    }
}

impl WorldInit {
    pub fn sanitized(mut self) -> Self {
        self.config = self.config.sanitized();
        if self.oracle_baseline_price <= 0.0 {
            self.oracle_baseline_price = 100.0;
        }
        self
    }

    pub fn build(self) -> Result<WorldEngine, EngineError> {
        let init = self.sanitized();
        let model = WorldModel {
            markets: default_market_table(&init.config),
            ..WorldModel::default()
        };
        let oracle = OracleState::new(init.oracle_baseline_price);
        WorldEngine::from_parts(
            0,
            init.config,
            init.seed,
            model,
            oracle,
            VecDeque::new(),
            0,
            Ledger::new(),
            false,
        )
    }
}

pub fn default_market_table(config: &WorldConfig) -> BTreeMap<ResourceKind, ResourceMarket> {
    let seeds = [
        (ResourceKind::Iron, BASE_PRICE_IRON, ORACLE_SENSITIVITY_IRON),
        (ResourceKind::Wood, BASE_PRICE_WOOD, ORACLE_SENSITIVITY_WOOD),
        (ResourceKind::Fish, BASE_PRICE_FISH, ORACLE_SENSITIVITY_FISH),
    ];
    seeds
        .into_iter()
        .map(|(resource, base_price, sensitivity)| {
            let mut market = ResourceMarket::new(resource, base_price, sensitivity);
            market.floor_multiplier = config.market.floor_multiplier;
            market.ceiling_multiplier = config.market.ceiling_multiplier;
            (resource, market)
        })
        .collect()
}
