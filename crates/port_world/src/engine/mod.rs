//! Simulation engine - the authoritative world state and tick pipeline.
//!
//! This module is organized into submodules:
//! - `types`: Core type definitions (IDs, constants, resources, actions)
//! - `world_model`: World entities (Actor, Region, ResourceMarket, WorldModel)
//! - `rng`: Deterministic per-tick random stream
//! - `rules`: Action validation and all-or-nothing execution
//! - `market`: Per-resource pricing and order execution
//! - `events`: Stochastic world events and their modifiers
//! - `ledger`: Append-only audit trail and settlement folds
//! - `kernel`: WorldEngine (submission, tick advancement, state hashing)
//! - `persist`: Snapshot and ledger persistence
//! - `init`: World bootstrap (regions, market table, oracle baseline)

mod events;
mod init;
mod kernel;
mod ledger;
mod market;
mod persist;
mod rng;
mod rules;
mod types;
mod world_model;

#[cfg(test)]
mod tests;

pub use events::{ActiveEvent, EventAdvanceReport, EventKind};
pub use init::{default_market_table, WorldInit};
pub use kernel::{
    EngineError, IntakeHandle, RegisterError, SubmitError, TickInputs, TickReport, WorldEngine,
    WorldView,
};
pub use ledger::{ActionOutcome, CreditSummary, Ledger, LedgerEntry};
pub use market::{OracleState, TradeQuote};
pub use persist::{LedgerFile, PersistError, WorldSnapshot};
pub use rng::TickRng;
pub use rules::RejectReason;
pub use types::{
    Action, ActionEnvelope, ActionId, ActorId, Inventory, LedgerSeq, OrderSide, ResourceKind,
    StockError, TradeOffer, WorldTime,
};
pub use world_model::{
    Actor, ConfigError, EventConfig, MarketConfig, NegotiationPolicy, RaidConfig, Region,
    ResourceMarket, WorldConfig, WorldModel,
};
