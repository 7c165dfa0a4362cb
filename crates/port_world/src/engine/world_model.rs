//! World entities: Actor, Region, ResourceMarket, WorldConfig, WorldModel.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::events::{ActiveEvent, EventKind};
use super::types::{ActorId, Inventory, ResourceKind, WorldTime};

// ============================================================================
// Regions
// ============================================================================

/// Fixed world topology: four regions, immutable after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Dock,
    Market,
    Mine,
    Forest,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Dock, Region::Market, Region::Mine, Region::Forest];

    /// The resource this region produces, or `None` for the trading hub.
    pub fn produces(&self) -> Option<ResourceKind> {
        match self {
            Region::Dock => Some(ResourceKind::Fish),
            Region::Mine => Some(ResourceKind::Iron),
            Region::Forest => Some(ResourceKind::Wood),
            Region::Market => None,
        }
    }

    pub fn is_trading_hub(&self) -> bool {
        matches!(self, Region::Market)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Dock => "dock",
            Region::Market => "market",
            Region::Mine => "mine",
            Region::Forest => "forest",
        }
    }
}

// ============================================================================
// Actors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub region: Region,
    pub action_points: i64,
    pub credits: i64,
    pub inventory: Inventory,
    pub reputation: i64,
    pub entry_expires_at: WorldTime,
    pub active: bool,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        config: &WorldConfig,
        entry_expires_at: WorldTime,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region: Region::Dock,
            action_points: config.max_action_points,
            credits: config.starting_credits,
            inventory: Inventory::default(),
            reputation: config.starting_reputation,
            entry_expires_at,
            active: true,
        }
    }

    pub fn is_expired(&self, tick: WorldTime) -> bool {
        tick >= self.entry_expires_at
    }
}

// ============================================================================
// Markets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMarket {
    pub resource: ResourceKind,
    pub base_price: f64,
    pub current_price: f64,
    pub oracle_sensitivity: f64,
    pub floor_multiplier: f64,
    pub ceiling_multiplier: f64,
    /// Supply/demand accumulator applied to the price each tick.
    pub pressure: f64,
    /// Pressure accrued from this tick's orders; folded in at the next
    /// market advance so trades never reprice the tick they execute in.
    pub pending_pressure: f64,
}

impl ResourceMarket {
    pub fn new(resource: ResourceKind, base_price: f64, oracle_sensitivity: f64) -> Self {
        Self {
            resource,
            base_price,
            current_price: base_price,
            oracle_sensitivity,
            floor_multiplier: DEFAULT_FLOOR_MULTIPLIER,
            ceiling_multiplier: DEFAULT_CEILING_MULTIPLIER,
            pressure: 0.0,
            pending_pressure: 0.0,
        }
    }

    pub fn floor_price(&self) -> f64 {
        self.base_price * self.floor_multiplier
    }

    pub fn ceiling_price(&self) -> f64 {
        self.base_price * self.ceiling_multiplier
    }
}

pub const DEFAULT_FLOOR_MULTIPLIER: f64 = 0.25;
pub const DEFAULT_CEILING_MULTIPLIER: f64 = 3.0;

// ============================================================================
// World Model
// ============================================================================

/// The authoritative aggregate: actors, markets, active events, treasury.
/// Keyed collections are BTreeMaps so the canonical serialization (and the
/// state hash derived from it) is order-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldModel {
    pub actors: BTreeMap<ActorId, Actor>,
    pub markets: BTreeMap<ResourceKind, ResourceMarket>,
    pub events: BTreeMap<EventKind, ActiveEvent>,
    /// Market counterparty balance: absorbs buy payments and taxes, funds
    /// sell proceeds. Signed so conservation stays checkable.
    pub treasury: i64,
}

impl WorldModel {
    pub fn occupants(&self, region: Region) -> Vec<&Actor> {
        self.actors
            .values()
            .filter(|a| a.active && a.region == region)
            .collect()
    }

    pub fn total_actor_credits(&self) -> i64 {
        self.actors.values().map(|a| a.credits).sum()
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub max_action_points: i64,
    pub rest_recovery: i64,
    pub harvest_yield: i64,
    pub starting_credits: i64,
    pub starting_reputation: i64,
    pub entry_duration_ticks: u64,
    pub market: MarketConfig,
    pub events: EventConfig,
    pub raid: RaidConfig,
    pub negotiation: NegotiationPolicy,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_action_points: 100,
            rest_recovery: 25,
            harvest_yield: 3,
            starting_credits: 1000,
            starting_reputation: 100,
            entry_duration_ticks: 10_080,
            market: MarketConfig::default(),
            events: EventConfig::default(),
            raid: RaidConfig::default(),
            negotiation: NegotiationPolicy::default(),
        }
    }
}

impl WorldConfig {
    pub fn sanitized(mut self) -> Self {
        if self.max_action_points < 1 {
            self.max_action_points = 1;
        }
        if self.rest_recovery < 0 {
            self.rest_recovery = 0;
        }
        if self.harvest_yield < 0 {
            self.harvest_yield = 0;
        }
        if self.starting_credits < 0 {
            self.starting_credits = 0;
        }
        if self.entry_duration_ticks == 0 {
            self.entry_duration_ticks = 1;
        }
        self.market = self.market.sanitized();
        self.events = self.events.sanitized();
        self.raid = self.raid.sanitized();
        self
    }

    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|err| ConfigError::Io {
            message: err.to_string(),
        })?;
        let config: WorldConfig =
            toml::from_str(&content).map_err(|err| ConfigError::Parse {
                message: err.to_string(),
            })?;
        Ok(config.sanitized())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub tax_rate: f64,
    pub pressure_per_unit: f64,
    pub pressure_decay: f64,
    pub floor_multiplier: f64,
    pub ceiling_multiplier: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.05,
            pressure_per_unit: 0.01,
            pressure_decay: 0.5,
            floor_multiplier: DEFAULT_FLOOR_MULTIPLIER,
            ceiling_multiplier: DEFAULT_CEILING_MULTIPLIER,
        }
    }
}

impl MarketConfig {
    pub fn sanitized(mut self) -> Self {
        if !(0.0..1.0).contains(&self.tax_rate) {
            self.tax_rate = 0.05;
        }
        if self.pressure_per_unit < 0.0 {
            self.pressure_per_unit = 0.0;
        }
        if !(0.0..=1.0).contains(&self.pressure_decay) {
            self.pressure_decay = 0.5;
        }
        if self.floor_multiplier <= 0.0 || self.floor_multiplier > 1.0 {
            self.floor_multiplier = DEFAULT_FLOOR_MULTIPLIER;
        }
        if self.ceiling_multiplier < 1.0 {
            self.ceiling_multiplier = DEFAULT_CEILING_MULTIPLIER;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub trigger_probability: f64,
    pub min_duration_ticks: u32,
    pub max_duration_ticks: u32,
    pub min_magnitude: f64,
    pub max_magnitude: f64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            trigger_probability: 0.15,
            min_duration_ticks: 3,
            max_duration_ticks: 6,
            min_magnitude: 0.5,
            max_magnitude: 1.5,
        }
    }
}

impl EventConfig {
    pub fn sanitized(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.trigger_probability) {
            self.trigger_probability = 0.15;
        }
        if self.min_duration_ticks == 0 {
            self.min_duration_ticks = 1;
        }
        if self.max_duration_ticks < self.min_duration_ticks {
            self.max_duration_ticks = self.min_duration_ticks;
        }
        if self.min_magnitude < 0.0 {
            self.min_magnitude = 0.0;
        }
        if self.max_magnitude < self.min_magnitude {
            self.max_magnitude = self.min_magnitude;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidConfig {
    pub base_chance: f64,
    /// Reputation-gap divisor: chance shifts by (attacker - defender) / weight.
    pub reputation_weight: f64,
    pub min_chance: f64,
    pub max_chance: f64,
    pub min_loot_fraction: f64,
    pub max_loot_fraction: f64,
    pub success_reputation_cost: i64,
    pub failure_reputation_cost: i64,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            base_chance: 0.5,
            reputation_weight: 400.0,
            min_chance: 0.05,
            max_chance: 0.95,
            min_loot_fraction: 0.10,
            max_loot_fraction: 0.25,
            success_reputation_cost: 5,
            failure_reputation_cost: 10,
        }
    }
}

impl RaidConfig {
    pub fn sanitized(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.base_chance) {
            self.base_chance = 0.5;
        }
        if self.reputation_weight <= 0.0 {
            self.reputation_weight = 400.0;
        }
        if !(0.0..=1.0).contains(&self.min_chance) {
            self.min_chance = 0.05;
        }
        if self.max_chance < self.min_chance || self.max_chance > 1.0 {
            self.max_chance = 0.95;
        }
        if !(0.0..=1.0).contains(&self.min_loot_fraction) {
            self.min_loot_fraction = 0.10;
        }
        if self.max_loot_fraction < self.min_loot_fraction || self.max_loot_fraction > 1.0 {
            self.max_loot_fraction = 0.25;
        }
        if self.success_reputation_cost < 0 {
            self.success_reputation_cost = 0;
        }
        if self.failure_reputation_cost < 0 {
            self.failure_reputation_cost = 0;
        }
        self
    }
}

/// How a negotiation target decides on a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NegotiationPolicy {
    /// Accept when the offered value covers the wanted value within the
    /// tolerance, valuing resources at the current market price.
    AcceptFair { tolerance: f64 },
    AlwaysAccept,
    AlwaysReject,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        NegotiationPolicy::AcceptFair { tolerance: 0.10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { message: String },
    Parse { message: String },
}
