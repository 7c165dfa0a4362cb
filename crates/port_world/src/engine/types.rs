//! Core type definitions: IDs, constants, resources, and action payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Stable actor identifier (an opaque wallet-style key).
pub type ActorId = String;
pub type WorldTime = u64;
pub type ActionId = u64;
pub type LedgerSeq = u64;

// ============================================================================
// Constants
// ============================================================================

pub const SNAPSHOT_VERSION: u32 = 1;
pub const LEDGER_VERSION: u32 = 1;

pub const AP_COST_MOVE: i64 = 5;
pub const AP_COST_HARVEST: i64 = 10;
pub const AP_COST_PLACE_ORDER: i64 = 3;
pub const AP_COST_NEGOTIATE: i64 = 15;
pub const AP_COST_RAID: i64 = 25;
pub const AP_COST_REST: i64 = 0;

// ============================================================================
// Resources
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Iron,
    Wood,
    Fish,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Iron, ResourceKind::Wood, ResourceKind::Fish];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Iron => "iron",
            ResourceKind::Wood => "wood",
            ResourceKind::Fish => "fish",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-actor resource holdings. Quantities never go negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Inventory {
    pub amounts: BTreeMap<ResourceKind, i64>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        *self.amounts.get(&kind).unwrap_or(&0)
    }

    pub fn total(&self) -> i64 {
        self.amounts.values().sum()
    }

    pub fn set(&mut self, kind: ResourceKind, amount: i64) -> Result<(), StockError> {
        if amount < 0 {
            return Err(StockError::NegativeAmount { amount });
        }
        if amount == 0 {
            self.amounts.remove(&kind);
        } else {
            self.amounts.insert(kind, amount);
        }
        Ok(())
    }

    pub fn add(&mut self, kind: ResourceKind, amount: i64) -> Result<(), StockError> {
        if amount < 0 {
            return Err(StockError::NegativeAmount { amount });
        }
        let current = self.get(kind);
        self.set(kind, current.saturating_add(amount))
    }

    pub fn remove(&mut self, kind: ResourceKind, amount: i64) -> Result<(), StockError> {
        if amount < 0 {
            return Err(StockError::NegativeAmount { amount });
        }
        let current = self.get(kind);
        if current < amount {
            return Err(StockError::Insufficient {
                kind,
                requested: amount,
                available: current,
            });
        }
        self.set(kind, current - amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    NegativeAmount { amount: i64 },
    Insufficient {
        kind: ResourceKind,
        requested: i64,
        available: i64,
    },
}

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// One side of a negotiation proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TradeOffer {
    Credits { amount: i64 },
    Resource { kind: ResourceKind, amount: i64 },
}

use super::world_model::Region;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Action {
    Move {
        to: Region,
    },
    Harvest,
    PlaceOrder {
        side: OrderSide,
        resource: ResourceKind,
        quantity: i64,
    },
    Negotiate {
        target: ActorId,
        offer: TradeOffer,
        want: TradeOffer,
    },
    Raid {
        target: ActorId,
    },
    Rest,
}

impl Action {
    pub fn ap_cost(&self) -> i64 {
        match self {
            Action::Move { .. } => AP_COST_MOVE,
            Action::Harvest => AP_COST_HARVEST,
            Action::PlaceOrder { .. } => AP_COST_PLACE_ORDER,
            Action::Negotiate { .. } => AP_COST_NEGOTIATE,
            Action::Raid { .. } => AP_COST_RAID,
            Action::Rest => AP_COST_REST,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Harvest => "harvest",
            Action::PlaceOrder { .. } => "place_order",
            Action::Negotiate { .. } => "negotiate",
            Action::Raid { .. } => "raid",
            Action::Rest => "rest",
        }
    }
}

/// An action queued for the next tick, tagged with its submitting actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub id: ActionId,
    pub actor_id: ActorId,
    pub action: Action,
}
