//! Observer-facing change feed.
//!
//! Observers (UIs, recorders) receive whole-collection events: when anything
//! in a category changes, the event carries every entity of that category.
//! Late subscribers resynchronize from a snapshot handed out at subscribe
//! time, so missed events are harmless.
//!
//! The change scanner is the polling half: it periodically diffs the
//! registry against the observer mirror and picks up externally-driven
//! changes, i.e. protocol commands under the polled feedback policy and
//! manual management writes. The simulation engine broadcasts its own
//! changes directly and keeps the mirror in sync, so they never show up
//! here twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::SimCore;
use crate::store::EntityCategory;
use crate::types::{CircuitBreaker, TapChanger, TeleSignal, Telemetry};

/// One whole-collection update for observers.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    CircuitBreakers(Vec<CircuitBreaker>),
    TeleSignals(Vec<TeleSignal>),
    Telemetries(Vec<Telemetry>),
    TapChangers(Vec<TapChanger>),
}

impl ObserverEvent {
    pub fn category(&self) -> EntityCategory {
        match self {
            Self::CircuitBreakers(_) => EntityCategory::CircuitBreakers,
            Self::TeleSignals(_) => EntityCategory::TeleSignals,
            Self::Telemetries(_) => EntityCategory::Telemetries,
            Self::TapChangers(_) => EntityCategory::TapChangers,
        }
    }
}

/// Send the current collection of a category to all observers.
///
/// Called while the caller holds the core lock, so the event is consistent
/// with the state that produced it. A send error only means nobody is
/// subscribed.
pub(crate) fn emit(
    core: &SimCore,
    observers: &broadcast::Sender<ObserverEvent>,
    category: EntityCategory,
) {
    let event = match category {
        EntityCategory::CircuitBreakers => {
            ObserverEvent::CircuitBreakers(core.store().circuit_breakers())
        }
        EntityCategory::TeleSignals => ObserverEvent::TeleSignals(core.store().tele_signals()),
        EntityCategory::Telemetries => ObserverEvent::Telemetries(core.store().telemetries()),
        EntityCategory::TapChangers => ObserverEvent::TapChangers(core.store().tap_changers()),
    };
    let _ = observers.send(event);
}

/// Periodic registry-vs-mirror diff task.
pub(crate) struct ChangeScanner {
    pub core: Arc<RwLock<SimCore>>,
    pub observers: broadcast::Sender<ObserverEvent>,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

impl ChangeScanner {
    pub async fn run(self) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let mut core = self.core.write().await;
                    let changed = core.scan_changes();
                    if !changed.is_empty() {
                        debug!(categories = ?changed, "external changes detected");
                    }
                    for category in changed {
                        emit(&core, &self.observers, category);
                    }
                }
            }
        }
        debug!("change scanner stopped");
    }
}
