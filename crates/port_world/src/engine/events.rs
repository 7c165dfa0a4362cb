//! World events: stochastic triggers, lifetimes, and subsystem modifiers.

use serde::{Deserialize, Serialize};

use super::rng::TickRng;
use super::world_model::{WorldConfig, WorldModel};

// ============================================================================
// Event Catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Storm,
    Boom,
    Crash,
    Festival,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Storm,
        EventKind::Boom,
        EventKind::Crash,
        EventKind::Festival,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Storm => "storm",
            EventKind::Boom => "boom",
            EventKind::Crash => "crash",
            EventKind::Festival => "festival",
        }
    }

    /// Multiplier applied to every market price while active. Magnitude
    /// scales the deviation from 1.0.
    pub fn market_factor(&self, magnitude: f64) -> f64 {
        match self {
            EventKind::Storm => 1.0 + 0.10 * magnitude,
            EventKind::Boom => 1.0 + 0.25 * magnitude,
            EventKind::Crash => 1.0 - 0.25 * magnitude,
            EventKind::Festival => 1.0 + 0.05 * magnitude,
        }
    }

    /// Multiplier applied to harvest yields while active.
    pub fn harvest_factor(&self, magnitude: f64) -> f64 {
        match self {
            EventKind::Storm => (1.0 - 0.5 * magnitude).max(0.0),
            _ => 1.0,
        }
    }

    /// Flat AP-recovery bonus while active.
    pub fn ap_recovery_bonus(&self, magnitude: f64) -> i64 {
        match self {
            EventKind::Festival => (5.0 * magnitude).round() as i64,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub kind: EventKind,
    pub magnitude: f64,
    pub remaining_ticks: u32,
}

// ============================================================================
// Modifier Aggregation
// ============================================================================

/// Combined market multiplier across all active events.
pub fn market_factor(model: &WorldModel) -> f64 {
    model
        .events
        .values()
        .map(|ev| ev.kind.market_factor(ev.magnitude))
        .product()
}

/// Combined harvest multiplier across all active events.
pub fn harvest_factor(model: &WorldModel) -> f64 {
    model
        .events
        .values()
        .map(|ev| ev.kind.harvest_factor(ev.magnitude))
        .product()
}

/// Total flat AP-recovery bonus across all active events.
pub fn ap_recovery_bonus(model: &WorldModel) -> i64 {
    model
        .events
        .values()
        .map(|ev| ev.kind.ap_recovery_bonus(ev.magnitude))
        .sum()
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventAdvanceReport {
    pub triggered: Option<ActiveEvent>,
    pub extended: Option<EventKind>,
    pub expired: Vec<EventKind>,
}

/// One event pass: age out active events, then maybe trigger a new one.
///
/// Same-kind re-triggers extend the active event's remaining duration
/// (`max(remaining, rolled)`) and keep its original magnitude; the keyed
/// storage makes same-kind stacking structurally impossible.
pub fn advance(model: &mut WorldModel, config: &WorldConfig, rng: &mut TickRng) -> EventAdvanceReport {
    let mut report = EventAdvanceReport::default();

    for event in model.events.values_mut() {
        event.remaining_ticks = event.remaining_ticks.saturating_sub(1);
    }
    let expired: Vec<EventKind> = model
        .events
        .values()
        .filter(|ev| ev.remaining_ticks == 0)
        .map(|ev| ev.kind)
        .collect();
    for kind in &expired {
        model.events.remove(kind);
    }
    report.expired = expired;

    if rng.chance(config.events.trigger_probability) {
        let kind = EventKind::ALL[(rng.next_u64() % EventKind::ALL.len() as u64) as usize];
        let duration = rng.range_u32(
            config.events.min_duration_ticks,
            config.events.max_duration_ticks,
        );
        let magnitude = rng.range_f64(config.events.min_magnitude, config.events.max_magnitude);

        match model.events.get_mut(&kind) {
            Some(active) => {
                active.remaining_ticks = active.remaining_ticks.max(duration);
                report.extended = Some(kind);
            }
            None => {
                let event = ActiveEvent {
                    kind,
                    magnitude,
                    remaining_ticks: duration,
                };
                model.events.insert(kind, event.clone());
                report.triggered = Some(event);
            }
        }
    }

    report
}
