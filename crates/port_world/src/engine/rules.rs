//! Action validation and execution: the sole authority for whether an
//! action is legal and what it does. Every precondition is checked before
//! any mutation, so a rejected action is a pure no-op. Failed actions do
//! not consume action points.

use serde::{Deserialize, Serialize};

use super::events;
use super::ledger::ActionOutcome;
use super::market;
use super::rng::TickRng;
use super::types::{
    Action, ActionEnvelope, ActorId, OrderSide, ResourceKind, StockError, TradeOffer, WorldTime,
};
use super::world_model::{NegotiationPolicy, Region, WorldConfig, WorldModel};

// ============================================================================
// Reject Reasons
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RejectReason {
    ActorNotFound {
        actor_id: ActorId,
    },
    ActorExpired {
        actor_id: ActorId,
        expired_at: WorldTime,
    },
    DuplicateAction {
        actor_id: ActorId,
    },
    InsufficientAp {
        required: i64,
        available: i64,
    },
    InvalidTarget {
        target: String,
    },
    InvalidQuantity {
        quantity: i64,
    },
    InsufficientInventory {
        kind: ResourceKind,
        requested: i64,
        available: i64,
    },
    InsufficientCredits {
        required: i64,
        available: i64,
    },
    NotAtMarket {
        region: Region,
    },
}

fn stock_reject(err: StockError) -> RejectReason {
    match err {
        StockError::NegativeAmount { amount } => RejectReason::InvalidQuantity { quantity: amount },
        StockError::Insufficient {
            kind,
            requested,
            available,
        } => RejectReason::InsufficientInventory {
            kind,
            requested,
            available,
        },
    }
}

fn actor_not_found(actor_id: &str) -> RejectReason {
    RejectReason::ActorNotFound {
        actor_id: actor_id.to_string(),
    }
}

// ============================================================================
// Execution Result
// ============================================================================

/// A successfully resolved action plus the balance deltas to ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedAction {
    pub outcome: ActionOutcome,
    pub ap_spent: i64,
    pub credit_delta: i64,
    pub counterparty_id: Option<ActorId>,
    pub counterparty_delta: i64,
    pub treasury_delta: i64,
}

impl ExecutedAction {
    fn local(outcome: ActionOutcome, ap_spent: i64) -> Self {
        Self {
            outcome,
            ap_spent,
            credit_delta: 0,
            counterparty_id: None,
            counterparty_delta: 0,
            treasury_delta: 0,
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

pub fn execute(
    model: &mut WorldModel,
    config: &WorldConfig,
    rng: &mut TickRng,
    tick: WorldTime,
    envelope: &ActionEnvelope,
) -> Result<ExecutedAction, RejectReason> {
    let actor_id = &envelope.actor_id;
    let Some(actor) = model.actors.get(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    if !actor.active || actor.is_expired(tick) {
        return Err(RejectReason::ActorExpired {
            actor_id: actor_id.clone(),
            expired_at: actor.entry_expires_at,
        });
    }

    let ap_cost = envelope.action.ap_cost();
    if actor.action_points < ap_cost {
        return Err(RejectReason::InsufficientAp {
            required: ap_cost,
            available: actor.action_points,
        });
    }

    match &envelope.action {
        Action::Move { to } => execute_move(model, actor_id, *to, ap_cost),
        Action::Harvest => execute_harvest(model, config, actor_id, ap_cost),
        Action::PlaceOrder {
            side,
            resource,
            quantity,
        } => execute_order(model, config, actor_id, *side, *resource, *quantity, ap_cost),
        Action::Negotiate {
            target,
            offer,
            want,
        } => execute_negotiate(model, config, actor_id, target, offer, want, ap_cost),
        Action::Raid { target } => execute_raid(model, config, rng, actor_id, target, ap_cost),
        Action::Rest => execute_rest(model, config, actor_id),
    }
}

fn execute_move(
    model: &mut WorldModel,
    actor_id: &str,
    to: Region,
    ap_cost: i64,
) -> Result<ExecutedAction, RejectReason> {
    let Some(actor) = model.actors.get_mut(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    let from = actor.region;
    if from == to {
        return Err(RejectReason::InvalidTarget {
            target: to.as_str().to_string(),
        });
    }

    actor.action_points -= ap_cost;
    actor.region = to;
    Ok(ExecutedAction::local(
        ActionOutcome::Moved { from, to },
        ap_cost,
    ))
}

fn execute_harvest(
    model: &mut WorldModel,
    config: &WorldConfig,
    actor_id: &str,
    ap_cost: i64,
) -> Result<ExecutedAction, RejectReason> {
    let Some(actor) = model.actors.get(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    let region = actor.region;
    let Some(resource) = region.produces() else {
        return Err(RejectReason::InvalidTarget {
            target: region.as_str().to_string(),
        });
    };
    let amount = (config.harvest_yield as f64 * events::harvest_factor(model))
        .round()
        .max(0.0) as i64;

    let Some(actor) = model.actors.get_mut(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    actor.action_points -= ap_cost;
    actor.inventory.add(resource, amount).map_err(stock_reject)?;
    Ok(ExecutedAction::local(
        ActionOutcome::Harvested { resource, amount },
        ap_cost,
    ))
}

fn execute_order(
    model: &mut WorldModel,
    config: &WorldConfig,
    actor_id: &str,
    side: OrderSide,
    resource: ResourceKind,
    quantity: i64,
    ap_cost: i64,
) -> Result<ExecutedAction, RejectReason> {
    let Some(actor) = model.actors.get(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    if !actor.region.is_trading_hub() {
        return Err(RejectReason::NotAtMarket {
            region: actor.region,
        });
    }
    if quantity <= 0 {
        return Err(RejectReason::InvalidQuantity { quantity });
    }
    let Some(quote) = market::quote(model, config, resource, quantity) else {
        return Err(RejectReason::InvalidTarget {
            target: resource.as_str().to_string(),
        });
    };
    let unit_price = model
        .markets
        .get(&resource)
        .map(|m| m.current_price)
        .unwrap_or_default();
    let credits = actor.credits;
    let held = actor.inventory.get(resource);

    match side {
        OrderSide::Buy => {
            let total = quote.buy_total();
            if credits < total {
                return Err(RejectReason::InsufficientCredits {
                    required: total,
                    available: credits,
                });
            }
            let Some(actor) = model.actors.get_mut(actor_id) else {
                return Err(actor_not_found(actor_id));
            };
            actor.action_points -= ap_cost;
            actor.credits -= total;
            actor.inventory.add(resource, quantity).map_err(stock_reject)?;
            model.treasury += total;
            market::record_pressure(model, config, resource, side, quantity);
            Ok(ExecutedAction {
                outcome: ActionOutcome::OrderFilled {
                    side,
                    resource,
                    quantity,
                    unit_price,
                    gross: quote.gross,
                    tax: quote.tax,
                },
                ap_spent: ap_cost,
                credit_delta: -total,
                counterparty_id: None,
                counterparty_delta: 0,
                treasury_delta: total,
            })
        }
        OrderSide::Sell => {
            if held < quantity {
                return Err(RejectReason::InsufficientInventory {
                    kind: resource,
                    requested: quantity,
                    available: held,
                });
            }
            let proceeds = quote.sell_proceeds();
            let Some(actor) = model.actors.get_mut(actor_id) else {
                return Err(actor_not_found(actor_id));
            };
            actor.action_points -= ap_cost;
            actor
                .inventory
                .remove(resource, quantity)
                .map_err(stock_reject)?;
            actor.credits += proceeds;
            model.treasury -= proceeds;
            market::record_pressure(model, config, resource, side, quantity);
            Ok(ExecutedAction {
                outcome: ActionOutcome::OrderFilled {
                    side,
                    resource,
                    quantity,
                    unit_price,
                    gross: quote.gross,
                    tax: quote.tax,
                },
                ap_spent: ap_cost,
                credit_delta: proceeds,
                counterparty_id: None,
                counterparty_delta: 0,
                treasury_delta: -proceeds,
            })
        }
    }
}

// ----------------------------------------------------------------------------
// Negotiation
// ----------------------------------------------------------------------------

fn offer_value(model: &WorldModel, offer: &TradeOffer) -> f64 {
    match offer {
        TradeOffer::Credits { amount } => *amount as f64,
        TradeOffer::Resource { kind, amount } => {
            let price = model
                .markets
                .get(kind)
                .map(|m| m.current_price)
                .unwrap_or(0.0);
            price * *amount as f64
        }
    }
}

fn can_cover(model: &WorldModel, actor_id: &str, offer: &TradeOffer) -> Result<(), RejectReason> {
    let Some(actor) = model.actors.get(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    match offer {
        TradeOffer::Credits { amount } => {
            if actor.credits < *amount {
                return Err(RejectReason::InsufficientCredits {
                    required: *amount,
                    available: actor.credits,
                });
            }
        }
        TradeOffer::Resource { kind, amount } => {
            let held = actor.inventory.get(*kind);
            if held < *amount {
                return Err(RejectReason::InsufficientInventory {
                    kind: *kind,
                    requested: *amount,
                    available: held,
                });
            }
        }
    }
    Ok(())
}

/// Move one side of an accepted deal. Returns the credit delta for `from`.
fn apply_transfer(
    model: &mut WorldModel,
    from: &str,
    to: &str,
    offer: &TradeOffer,
) -> Result<i64, RejectReason> {
    match offer {
        TradeOffer::Credits { amount } => {
            let Some(sender) = model.actors.get_mut(from) else {
                return Err(actor_not_found(from));
            };
            sender.credits -= amount;
            let Some(receiver) = model.actors.get_mut(to) else {
                return Err(actor_not_found(to));
            };
            receiver.credits += amount;
            Ok(-amount)
        }
        TradeOffer::Resource { kind, amount } => {
            let Some(sender) = model.actors.get_mut(from) else {
                return Err(actor_not_found(from));
            };
            sender.inventory.remove(*kind, *amount).map_err(stock_reject)?;
            let Some(receiver) = model.actors.get_mut(to) else {
                return Err(actor_not_found(to));
            };
            receiver.inventory.add(*kind, *amount).map_err(stock_reject)?;
            Ok(0)
        }
    }
}

fn offer_amount_valid(offer: &TradeOffer) -> Result<(), RejectReason> {
    let amount = match offer {
        TradeOffer::Credits { amount } => *amount,
        TradeOffer::Resource { amount, .. } => *amount,
    };
    if amount <= 0 {
        return Err(RejectReason::InvalidQuantity { quantity: amount });
    }
    Ok(())
}

fn execute_negotiate(
    model: &mut WorldModel,
    config: &WorldConfig,
    actor_id: &str,
    target_id: &str,
    offer: &TradeOffer,
    want: &TradeOffer,
    ap_cost: i64,
) -> Result<ExecutedAction, RejectReason> {
    validate_target(model, actor_id, target_id)?;
    offer_amount_valid(offer)?;
    offer_amount_valid(want)?;
    // The initiator must be able to deliver its own side up front.
    can_cover(model, actor_id, offer)?;

    // A target that cannot deliver, or a policy miss, rejects the proposal.
    // That is still a resolved negotiation, not a precondition failure.
    let target_covers = can_cover(model, target_id, want).is_ok();
    let accepted = target_covers
        && match &config.negotiation {
            NegotiationPolicy::AlwaysAccept => true,
            NegotiationPolicy::AlwaysReject => false,
            NegotiationPolicy::AcceptFair { tolerance } => {
                offer_value(model, offer) >= offer_value(model, want) * (1.0 - tolerance)
            }
        };

    let Some(actor) = model.actors.get_mut(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    actor.action_points -= ap_cost;

    let mut executed = ExecutedAction::local(
        ActionOutcome::NegotiationSettled {
            target: target_id.to_string(),
            accepted,
        },
        ap_cost,
    );
    executed.counterparty_id = Some(target_id.to_string());

    if accepted {
        let offer_delta = apply_transfer(model, actor_id, target_id, offer)?;
        let want_delta = apply_transfer(model, target_id, actor_id, want)?;
        executed.credit_delta = offer_delta - want_delta;
        executed.counterparty_delta = -executed.credit_delta;
    }
    Ok(executed)
}

// ----------------------------------------------------------------------------
// Raids
// ----------------------------------------------------------------------------

fn execute_raid(
    model: &mut WorldModel,
    config: &WorldConfig,
    rng: &mut TickRng,
    actor_id: &str,
    target_id: &str,
    ap_cost: i64,
) -> Result<ExecutedAction, RejectReason> {
    validate_target(model, actor_id, target_id)?;

    let attacker_rep = model.actors.get(actor_id).map(|a| a.reputation).unwrap_or(0);
    let (defender_rep, defender_credits) = match model.actors.get(target_id) {
        Some(target) => (target.reputation, target.credits),
        None => return Err(actor_not_found(target_id)),
    };
    let raid = &config.raid;
    let chance = (raid.base_chance + (attacker_rep - defender_rep) as f64 / raid.reputation_weight)
        .clamp(raid.min_chance, raid.max_chance);
    let success = rng.chance(chance);

    if success {
        let fraction = rng.range_f64(raid.min_loot_fraction, raid.max_loot_fraction);
        let loot = (defender_credits as f64 * fraction).floor() as i64;

        let Some(attacker) = model.actors.get_mut(actor_id) else {
            return Err(actor_not_found(actor_id));
        };
        attacker.action_points -= ap_cost;
        attacker.credits += loot;
        attacker.reputation -= raid.success_reputation_cost;
        let Some(defender) = model.actors.get_mut(target_id) else {
            return Err(actor_not_found(target_id));
        };
        defender.credits -= loot;

        Ok(ExecutedAction {
            outcome: ActionOutcome::RaidSucceeded {
                target: target_id.to_string(),
                loot,
            },
            ap_spent: ap_cost,
            credit_delta: loot,
            counterparty_id: Some(target_id.to_string()),
            counterparty_delta: -loot,
            treasury_delta: 0,
        })
    } else {
        let Some(attacker) = model.actors.get_mut(actor_id) else {
            return Err(actor_not_found(actor_id));
        };
        attacker.action_points -= ap_cost;
        attacker.reputation -= raid.failure_reputation_cost;

        let mut executed = ExecutedAction::local(
            ActionOutcome::RaidFailed {
                target: target_id.to_string(),
            },
            ap_cost,
        );
        executed.counterparty_id = Some(target_id.to_string());
        Ok(executed)
    }
}

fn execute_rest(
    model: &mut WorldModel,
    config: &WorldConfig,
    actor_id: &str,
) -> Result<ExecutedAction, RejectReason> {
    let bonus = events::ap_recovery_bonus(model);
    let Some(actor) = model.actors.get_mut(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    let before = actor.action_points;
    actor.action_points =
        (actor.action_points + config.rest_recovery + bonus).min(config.max_action_points);
    let recovered = actor.action_points - before;
    Ok(ExecutedAction::local(ActionOutcome::Rested { recovered }, 0))
}

/// A raid or negotiation target must be a distinct, active, co-located actor.
fn validate_target(
    model: &WorldModel,
    actor_id: &str,
    target_id: &str,
) -> Result<(), RejectReason> {
    if actor_id == target_id {
        return Err(RejectReason::InvalidTarget {
            target: target_id.to_string(),
        });
    }
    let Some(actor) = model.actors.get(actor_id) else {
        return Err(actor_not_found(actor_id));
    };
    match model.actors.get(target_id) {
        Some(target) if target.active && target.region == actor.region => Ok(()),
        _ => Err(RejectReason::InvalidTarget {
            target: target_id.to_string(),
        }),
    }
}
