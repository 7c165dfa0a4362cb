pub mod engine;

pub use engine::{
    Action, ActionEnvelope, ActionId, ActionOutcome, ActiveEvent, Actor, ActorId, ConfigError,
    CreditSummary, EngineError, EventAdvanceReport, EventConfig, EventKind, IntakeHandle,
    Inventory, Ledger, LedgerEntry, LedgerFile, MarketConfig, NegotiationPolicy, OracleState,
    OrderSide, PersistError,
    RaidConfig, Region, RegisterError, RejectReason, ResourceKind, ResourceMarket, StockError,
    SubmitError, TickInputs, TickRng, TickReport, TradeOffer, WorldConfig, WorldEngine, WorldInit,
    WorldModel, WorldSnapshot, WorldTime, WorldView,
};
