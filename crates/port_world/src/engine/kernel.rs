//! WorldEngine: action intake, tick advancement, state hashing, snapshots.
//!
//! The engine is the single writer. `advance_tick` is a pure step function;
//! when to call it (fixed interval, wall clock) is the caller's concern.
//! External inputs for a tick (price feed reading, wall-clock stamp) are
//! passed in up front so resolution never blocks on I/O.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::events::{self, EventAdvanceReport};
use super::ledger::{ActionOutcome, Ledger, LedgerEntry};
use super::market::{self, OracleState};
use super::rng::TickRng;
use super::rules::{self, RejectReason};
use super::types::{Action, ActionEnvelope, ActionId, ActorId, WorldTime};
use super::world_model::{Actor, WorldConfig, WorldModel};

// ============================================================================
// Inputs & Reports
// ============================================================================

/// External readings fetched once before a tick resolves.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickInputs {
    /// Latest external price, or `None` when the feed is down.
    pub external_price: Option<f64>,
    /// Wall-clock stamp recorded on ledger entries; not part of the state.
    pub now_unix: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// The tick counter after this step.
    pub tick: WorldTime,
    pub state_hash: String,
    pub executed: usize,
    pub rejected: usize,
    pub events: EventAdvanceReport,
    pub degraded_feed: bool,
}

/// Read-only copy of the world handed to external consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldView {
    pub tick: WorldTime,
    pub state_hash: String,
    pub model: WorldModel,
    pub oracle: OracleState,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitError {
    ActorNotFound { actor_id: ActorId },
    ActorExpired { actor_id: ActorId, expired_at: WorldTime },
    GameFinished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterError {
    NotAuthorized { actor_id: ActorId },
    AlreadyRegistered { actor_id: ActorId },
    GameFinished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    GameFinished,
    /// A post-resolution contract check failed. The tick was not committed.
    InvariantViolation { message: String },
    Serde(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serde(err.to_string())
    }
}

// ============================================================================
// Intake
// ============================================================================

/// Clonable handle feeding the engine's submission queue. Handles share the
/// queue, so callers on other threads keep submitting while a tick resolves;
/// envelopes pushed after the tick's drain are picked up by the next drain.
///
/// Handle submissions skip the registration checks (`WorldEngine::submit`
/// performs them); an unknown or expired actor is rejected and ledgered at
/// resolution time instead.
#[derive(Debug, Clone)]
pub struct IntakeHandle {
    queue: Arc<Mutex<VecDeque<ActionEnvelope>>>,
    next_id: Arc<AtomicU64>,
}

impl IntakeHandle {
    pub fn submit(&self, actor_id: impl Into<ActorId>, action: Action) -> ActionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_queue(&self.queue).push_back(ActionEnvelope {
            id,
            actor_id: actor_id.into(),
            action,
        });
        id
    }

    pub fn len(&self) -> usize {
        lock_queue(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_queue(&self.queue).is_empty()
    }

    /// Independent copy of the queue state. Handle clones share the queue;
    /// engine clones must not.
    fn fork(&self) -> Self {
        Self {
            queue: Arc::new(Mutex::new(lock_queue(&self.queue).clone())),
            next_id: Arc::new(AtomicU64::new(self.next_id.load(Ordering::Relaxed))),
        }
    }
}

fn lock_queue(queue: &Mutex<VecDeque<ActionEnvelope>>) -> MutexGuard<'_, VecDeque<ActionEnvelope>> {
    // A poisoning panic can only come from a caller's panic mid-push; the
    // queue itself is never left half-written.
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// WorldEngine
// ============================================================================

#[derive(Debug)]
pub struct WorldEngine {
    tick: WorldTime,
    config: WorldConfig,
    seed: u64,
    model: WorldModel,
    oracle: OracleState,
    intake: IntakeHandle,
    ledger: Ledger,
    state_hash: String,
    finished: bool,
}

impl Clone for WorldEngine {
    fn clone(&self) -> Self {
        Self {
            tick: self.tick,
            config: self.config.clone(),
            seed: self.seed,
            model: self.model.clone(),
            oracle: self.oracle.clone(),
            intake: self.intake.fork(),
            ledger: self.ledger.clone(),
            state_hash: self.state_hash.clone(),
            finished: self.finished,
        }
    }
}

impl PartialEq for WorldEngine {
    fn eq(&self, other: &Self) -> bool {
        let queues_equal = Arc::ptr_eq(&self.intake.queue, &other.intake.queue)
            || *lock_queue(&self.intake.queue) == *lock_queue(&other.intake.queue);
        self.tick == other.tick
            && self.config == other.config
            && self.seed == other.seed
            && self.model == other.model
            && self.oracle == other.oracle
            && queues_equal
            && self.intake.next_id.load(Ordering::Relaxed)
                == other.intake.next_id.load(Ordering::Relaxed)
            && self.ledger == other.ledger
            && self.state_hash == other.state_hash
            && self.finished == other.finished
    }
}

impl WorldEngine {
    pub(super) fn from_parts(
        tick: WorldTime,
        config: WorldConfig,
        seed: u64,
        model: WorldModel,
        oracle: OracleState,
        pending: VecDeque<ActionEnvelope>,
        next_action_id: ActionId,
        ledger: Ledger,
        finished: bool,
    ) -> Result<Self, EngineError> {
        let state_hash = compute_state_hash(tick, &model, &oracle)?;
        Ok(Self {
            tick,
            config,
            seed,
            model,
            oracle,
            intake: IntakeHandle {
                queue: Arc::new(Mutex::new(pending)),
                next_id: Arc::new(AtomicU64::new(next_action_id)),
            },
            ledger,
            state_hash,
            finished,
        })
    }

    pub fn tick(&self) -> WorldTime {
        self.tick
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WorldConfig) {
        self.config = config.sanitized();
    }

    #[cfg(test)]
    pub(super) fn model_mut(&mut self) -> &mut WorldModel {
        &mut self.model
    }

    pub fn model(&self) -> &WorldModel {
        &self.model
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn state_hash(&self) -> &str {
        &self.state_hash
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pending_actions(&self) -> usize {
        self.intake.len()
    }

    /// A shareable submission handle. Clones stay valid across ticks and
    /// never borrow the engine, so intake keeps flowing while `advance_tick`
    /// holds the exclusive reference.
    pub fn intake(&self) -> IntakeHandle {
        self.intake.clone()
    }

    fn pending_snapshot(&self) -> Vec<ActionEnvelope> {
        lock_queue(&self.intake.queue).iter().cloned().collect()
    }

    fn next_action_id(&self) -> ActionId {
        self.intake.next_id.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------------
    // Registration & intake
    // ------------------------------------------------------------------------

    /// Register a new actor. Entry authorization (the paid-entry check) is
    /// an external collaborator's verdict, passed in as a boolean.
    pub fn register_actor(
        &mut self,
        actor_id: impl Into<ActorId>,
        name: impl Into<String>,
        entry_authorized: bool,
    ) -> Result<Actor, RegisterError> {
        let actor_id = actor_id.into();
        if self.finished {
            return Err(RegisterError::GameFinished);
        }
        if !entry_authorized {
            return Err(RegisterError::NotAuthorized { actor_id });
        }
        if self.model.actors.contains_key(&actor_id) {
            return Err(RegisterError::AlreadyRegistered { actor_id });
        }
        let expires_at = self.tick.saturating_add(self.config.entry_duration_ticks);
        let actor = Actor::new(actor_id.clone(), name, &self.config, expires_at);
        self.model.actors.insert(actor_id, actor.clone());
        Ok(actor)
    }

    /// Enqueue an action for the next tick. Only the actor's existence and
    /// entry are checked here; full validation happens at resolution time.
    pub fn submit(
        &self,
        actor_id: impl Into<ActorId>,
        action: Action,
    ) -> Result<ActionId, SubmitError> {
        let actor_id = actor_id.into();
        if self.finished {
            return Err(SubmitError::GameFinished);
        }
        let Some(actor) = self.model.actors.get(&actor_id) else {
            return Err(SubmitError::ActorNotFound { actor_id });
        };
        if !actor.active || actor.is_expired(self.tick) {
            return Err(SubmitError::ActorExpired {
                actor_id,
                expired_at: actor.entry_expires_at,
            });
        }
        Ok(self.intake.submit(actor_id, action))
    }

    // ------------------------------------------------------------------------
    // Tick pipeline
    // ------------------------------------------------------------------------

    /// Advance the world by one tick: drain the action buffer in submission
    /// order (one action per actor, first wins), resolve each action, then
    /// advance events and markets, hash, and commit.
    ///
    /// All mutation happens on a scratch copy; an invariant violation drops
    /// the scratch and leaves the last committed tick intact.
    pub fn advance_tick(&mut self, inputs: TickInputs) -> Result<TickReport, EngineError> {
        if self.finished {
            return Err(EngineError::GameFinished);
        }

        // Drain the intake first: envelopes submitted from here on, including
        // concurrently through handles, belong to the next tick.
        let batch: Vec<ActionEnvelope> = lock_queue(&self.intake.queue).drain(..).collect();

        let tick = self.tick;
        let mut scratch = self.model.clone();
        let mut oracle = self.oracle.clone();
        let mut rng = TickRng::new(self.seed, tick);
        let mut pending_entries: Vec<LedgerEntry> = Vec::new();
        let mut seq = 0u64;
        let mut push_entry = |entries: &mut Vec<LedgerEntry>,
                              seq: &mut u64,
                              actor_id: Option<ActorId>,
                              action: Option<Action>,
                              outcome: ActionOutcome| {
            entries.push(LedgerEntry {
                tick,
                seq: *seq,
                actor_id,
                action,
                outcome,
                ap_spent: 0,
                credit_delta: 0,
                counterparty_id: None,
                counterparty_delta: 0,
                treasury_delta: 0,
                timestamp: 0,
            });
            *seq += 1;
        };

        oracle.observe(inputs.external_price);
        let degraded_feed = oracle.degraded;
        if degraded_feed {
            push_entry(
                &mut pending_entries,
                &mut seq,
                None,
                None,
                ActionOutcome::FeedDegraded {
                    held_price: oracle.last_price,
                },
            );
        }

        // Resolve the batch in FIFO submission order, one action per actor.
        let mut acted: BTreeSet<ActorId> = BTreeSet::new();
        let mut executed = 0usize;
        let mut rejected = 0usize;
        for envelope in &batch {
            if acted.contains(&envelope.actor_id) {
                rejected += 1;
                push_entry(
                    &mut pending_entries,
                    &mut seq,
                    Some(envelope.actor_id.clone()),
                    Some(envelope.action.clone()),
                    ActionOutcome::Rejected {
                        reason: RejectReason::DuplicateAction {
                            actor_id: envelope.actor_id.clone(),
                        },
                    },
                );
                continue;
            }
            acted.insert(envelope.actor_id.clone());

            match rules::execute(&mut scratch, &self.config, &mut rng, tick, envelope) {
                Ok(result) => {
                    executed += 1;
                    pending_entries.push(LedgerEntry {
                        tick,
                        seq,
                        actor_id: Some(envelope.actor_id.clone()),
                        action: Some(envelope.action.clone()),
                        outcome: result.outcome,
                        ap_spent: result.ap_spent,
                        credit_delta: result.credit_delta,
                        counterparty_id: result.counterparty_id,
                        counterparty_delta: result.counterparty_delta,
                        treasury_delta: result.treasury_delta,
                        timestamp: 0,
                    });
                    seq += 1;
                }
                Err(reason) => {
                    rejected += 1;
                    push_entry(
                        &mut pending_entries,
                        &mut seq,
                        Some(envelope.actor_id.clone()),
                        Some(envelope.action.clone()),
                        ActionOutcome::Rejected { reason },
                    );
                }
            }
        }

        let event_report = events::advance(&mut scratch, &self.config, &mut rng);
        for kind in &event_report.expired {
            push_entry(
                &mut pending_entries,
                &mut seq,
                None,
                None,
                ActionOutcome::EventExpired { kind: *kind },
            );
        }
        if let Some(event) = &event_report.triggered {
            push_entry(
                &mut pending_entries,
                &mut seq,
                None,
                None,
                ActionOutcome::EventTriggered {
                    kind: event.kind,
                    magnitude: event.magnitude,
                    duration_ticks: event.remaining_ticks,
                },
            );
        }
        if let Some(kind) = &event_report.extended {
            push_entry(
                &mut pending_entries,
                &mut seq,
                None,
                None,
                ActionOutcome::EventExtended { kind: *kind },
            );
        }

        market::advance(&mut scratch, &self.config, &oracle);

        if let Err(message) = check_invariants(&scratch, &self.config) {
            // Put the batch back (ahead of anything submitted meanwhile) so
            // the aborted tick discards no submissions along with the scratch.
            let mut queue = lock_queue(&self.intake.queue);
            for envelope in batch.into_iter().rev() {
                queue.push_front(envelope);
            }
            return Err(EngineError::InvariantViolation { message });
        }

        // Commit.
        let next_tick = tick.saturating_add(1);
        let state_hash = compute_state_hash(next_tick, &scratch, &oracle)?;
        self.model = scratch;
        self.oracle = oracle;
        for mut entry in pending_entries {
            entry.timestamp = inputs.now_unix;
            self.ledger.append(entry);
        }
        self.tick = next_tick;
        self.state_hash = state_hash.clone();

        Ok(TickReport {
            tick: next_tick,
            state_hash,
            executed,
            rejected,
            events: event_report,
            degraded_feed,
        })
    }

    // ------------------------------------------------------------------------
    // Read model
    // ------------------------------------------------------------------------

    /// Read-only copy of the current world. Never hands out the live state.
    pub fn snapshot_view(&self) -> WorldView {
        WorldView {
            tick: self.tick,
            state_hash: self.state_hash.clone(),
            model: self.model.clone(),
            oracle: self.oracle.clone(),
        }
    }

    /// Actors ordered by credits descending (ties broken by id).
    pub fn leaderboard(&self) -> Vec<Actor> {
        let mut actors: Vec<Actor> = self.model.actors.values().cloned().collect();
        actors.sort_by(|a, b| b.credits.cmp(&a.credits).then_with(|| a.id.cmp(&b.id)));
        actors
    }

    /// Final credit balance per actor, for external settlement.
    pub fn settlement_summary(&self) -> BTreeMap<ActorId, i64> {
        self.model
            .actors
            .iter()
            .map(|(id, actor)| (id.clone(), actor.credits))
            .collect()
    }

    /// End the game: every actor is marked inactive (never deleted) and the
    /// final balances are returned for settlement.
    pub fn finish_game(&mut self, now_unix: u64) -> BTreeMap<ActorId, i64> {
        if self.finished {
            return self.settlement_summary();
        }
        self.finished = true;
        for actor in self.model.actors.values_mut() {
            actor.active = false;
        }
        let seq = self
            .ledger
            .entries()
            .iter()
            .rev()
            .take_while(|e| e.tick == self.tick)
            .count() as u64;
        self.ledger.append(LedgerEntry {
            tick: self.tick,
            seq,
            actor_id: None,
            action: None,
            outcome: ActionOutcome::GameFinished,
            ap_spent: 0,
            credit_delta: 0,
            counterparty_id: None,
            counterparty_delta: 0,
            treasury_delta: 0,
            timestamp: now_unix,
        });
        self.settlement_summary()
    }

    pub(super) fn parts(
        &self,
    ) -> (
        WorldTime,
        &WorldConfig,
        u64,
        &WorldModel,
        &OracleState,
        Vec<ActionEnvelope>,
        ActionId,
        &Ledger,
        bool,
    ) {
        (
            self.tick,
            &self.config,
            self.seed,
            &self.model,
            &self.oracle,
            self.pending_snapshot(),
            self.next_action_id(),
            &self.ledger,
            self.finished,
        )
    }
}

// ============================================================================
// Hashing & Invariants
// ============================================================================

#[derive(Serialize)]
struct HashedState<'a> {
    tick: WorldTime,
    model: &'a WorldModel,
    oracle: &'a OracleState,
}

/// SHA-256 over the canonical JSON serialization of the world. All keyed
/// collections are BTreeMaps, so the serialization (and hash) is
/// order-stable across runs.
pub(super) fn compute_state_hash(
    tick: WorldTime,
    model: &WorldModel,
    oracle: &OracleState,
) -> Result<String, EngineError> {
    let bytes = serde_json::to_vec(&HashedState {
        tick,
        model,
        oracle,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn check_invariants(model: &WorldModel, config: &WorldConfig) -> Result<(), String> {
    for (id, actor) in &model.actors {
        if actor.credits < 0 {
            return Err(format!("actor {id} has negative credits: {}", actor.credits));
        }
        if actor.action_points < 0 || actor.action_points > config.max_action_points {
            return Err(format!(
                "actor {id} action points out of range: {}",
                actor.action_points
            ));
        }
        for (kind, amount) in &actor.inventory.amounts {
            if *amount < 0 {
                return Err(format!("actor {id} has negative {kind}: {amount}"));
            }
        }
    }
    for (resource, market) in &model.markets {
        if market.current_price < market.floor_price()
            || market.current_price > market.ceiling_price()
        {
            return Err(format!(
                "market {resource} price {} outside [{}, {}]",
                market.current_price,
                market.floor_price(),
                market.ceiling_price()
            ));
        }
    }
    Ok(())
}
