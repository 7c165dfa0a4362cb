//! Append-only audit ledger: every state-changing transaction, every
//! rejected attempt, and system flows (events, feed degradation) in tick
//! order. The ledger is the basis for replay audits and external settlement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::events::EventKind;
use super::rules::RejectReason;
use super::types::{Action, ActorId, LedgerSeq, OrderSide, ResourceKind, WorldTime};
use super::world_model::Region;

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ActionOutcome {
    Moved {
        from: Region,
        to: Region,
    },
    Harvested {
        resource: ResourceKind,
        amount: i64,
    },
    OrderFilled {
        side: OrderSide,
        resource: ResourceKind,
        quantity: i64,
        unit_price: f64,
        gross: i64,
        tax: i64,
    },
    NegotiationSettled {
        target: ActorId,
        accepted: bool,
    },
    RaidSucceeded {
        target: ActorId,
        loot: i64,
    },
    RaidFailed {
        target: ActorId,
    },
    Rested {
        recovered: i64,
    },
    Rejected {
        reason: RejectReason,
    },
    // System entries (no submitting actor)
    FeedDegraded {
        held_price: f64,
    },
    EventTriggered {
        kind: EventKind,
        magnitude: f64,
        duration_ticks: u32,
    },
    EventExtended {
        kind: EventKind,
    },
    EventExpired {
        kind: EventKind,
    },
    GameFinished,
}

impl ActionOutcome {
    pub fn is_rejection(&self) -> bool {
        matches!(self, ActionOutcome::Rejected { .. })
    }
}

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tick: WorldTime,
    pub seq: LedgerSeq,
    /// `None` for system entries.
    pub actor_id: Option<ActorId>,
    /// The submitted action, parameters included. `None` for system entries.
    pub action: Option<Action>,
    pub outcome: ActionOutcome,
    pub ap_spent: i64,
    /// Net credit change for the submitting actor.
    pub credit_delta: i64,
    /// The other actor in a transfer (raid target, negotiation partner).
    pub counterparty_id: Option<ActorId>,
    pub counterparty_delta: i64,
    /// Treasury-side flow (trade payments and taxes). Every entry satisfies
    /// credit_delta + counterparty_delta + treasury_delta == 0.
    pub treasury_delta: i64,
    /// Wall-clock time supplied by the caller; not part of the state hash.
    pub timestamp: u64,
}

impl LedgerEntry {
    /// Sum of all flows in this entry; zero when no credit was created or
    /// destroyed outside the recorded transaction.
    pub fn flow_imbalance(&self) -> i64 {
        self.credit_delta + self.counterparty_delta + self.treasury_delta
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Fold of an actor's ledgered credit flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CreditSummary {
    pub earned: i64,
    pub spent: i64,
    pub net: i64,
    pub actions: u64,
    pub rejections: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// All entries at or after the given tick, in append order.
    pub fn entries_since(&self, tick: WorldTime) -> Vec<LedgerEntry> {
        let start = self.entries.partition_point(|e| e.tick < tick);
        self.entries[start..].to_vec()
    }

    /// The last `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LedgerEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Fold one actor's entries into a credit summary.
    pub fn balance_summary(&self, actor_id: &str) -> CreditSummary {
        let mut summary = CreditSummary::default();
        for entry in &self.entries {
            if entry.actor_id.as_deref() != Some(actor_id) {
                continue;
            }
            summary.actions += 1;
            if entry.outcome.is_rejection() {
                summary.rejections += 1;
            }
            if entry.credit_delta >= 0 {
                summary.earned += entry.credit_delta;
            } else {
                summary.spent += -entry.credit_delta;
            }
            summary.net += entry.credit_delta;
        }
        summary
    }

    /// Net ledgered credit flow per actor, for cross-checking live balances.
    pub fn net_flows(&self) -> BTreeMap<ActorId, i64> {
        let mut flows: BTreeMap<ActorId, i64> = BTreeMap::new();
        for entry in &self.entries {
            if let Some(actor_id) = &entry.actor_id {
                *flows.entry(actor_id.clone()).or_default() += entry.credit_delta;
            }
            if let Some(counterparty) = &entry.counterparty_id {
                *flows.entry(counterparty.clone()).or_default() += entry.counterparty_delta;
            }
        }
        flows
    }

    pub(crate) fn restore(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }
}
