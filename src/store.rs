//! Domain entity store.
//!
//! Owns the circuit breaker, telesignal, telemetry and tap changer records.
//! Plain data container; registry bookkeeping and atomicity live in
//! [`crate::core`], behind the shared-state lock.

use std::collections::BTreeMap;

use crate::error::{Result, RtuSimError};
use crate::types::{CircuitBreaker, SimulatorSnapshot, TapChanger, TeleSignal, Telemetry};

/// Entity category, used for change marking and broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    CircuitBreakers,
    TeleSignals,
    Telemetries,
    TapChangers,
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CircuitBreakers => "circuit_breakers",
            Self::TeleSignals => "tele_signals",
            Self::Telemetries => "telemetries",
            Self::TapChangers => "tap_changers",
        };
        f.write_str(s)
    }
}

/// All four categories, for iteration.
pub const ALL_CATEGORIES: [EntityCategory; 4] = [
    EntityCategory::CircuitBreakers,
    EntityCategory::TeleSignals,
    EntityCategory::Telemetries,
    EntityCategory::TapChangers,
];

/// In-memory store of domain entities, keyed by entity id per category.
#[derive(Debug, Default)]
pub struct EntityStore {
    circuit_breakers: BTreeMap<String, CircuitBreaker>,
    tele_signals: BTreeMap<String, TeleSignal>,
    telemetries: BTreeMap<String, Telemetry>,
    tap_changers: BTreeMap<String, TapChanger>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_circuit_breaker(&mut self, cb: CircuitBreaker) -> Result<()> {
        if self.circuit_breakers.contains_key(&cb.id) {
            return Err(RtuSimError::DuplicateEntity(cb.id));
        }
        self.circuit_breakers.insert(cb.id.clone(), cb);
        Ok(())
    }

    pub fn insert_tele_signal(&mut self, ts: TeleSignal) -> Result<()> {
        if self.tele_signals.contains_key(&ts.id) {
            return Err(RtuSimError::DuplicateEntity(ts.id));
        }
        self.tele_signals.insert(ts.id.clone(), ts);
        Ok(())
    }

    pub fn insert_telemetry(&mut self, tm: Telemetry) -> Result<()> {
        if self.telemetries.contains_key(&tm.id) {
            return Err(RtuSimError::DuplicateEntity(tm.id));
        }
        self.telemetries.insert(tm.id.clone(), tm);
        Ok(())
    }

    pub fn insert_tap_changer(&mut self, tc: TapChanger) -> Result<()> {
        if self.tap_changers.contains_key(&tc.id) {
            return Err(RtuSimError::DuplicateEntity(tc.id));
        }
        self.tap_changers.insert(tc.id.clone(), tc);
        Ok(())
    }

    pub fn remove_circuit_breaker(&mut self, id: &str) -> Result<CircuitBreaker> {
        self.circuit_breakers
            .remove(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))
    }

    pub fn remove_tele_signal(&mut self, id: &str) -> Result<TeleSignal> {
        self.tele_signals
            .remove(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))
    }

    pub fn remove_telemetry(&mut self, id: &str) -> Result<Telemetry> {
        self.telemetries
            .remove(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))
    }

    pub fn remove_tap_changer(&mut self, id: &str) -> Result<TapChanger> {
        self.tap_changers
            .remove(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))
    }

    pub fn circuit_breaker(&self, id: &str) -> Option<&CircuitBreaker> {
        self.circuit_breakers.get(id)
    }

    pub fn circuit_breaker_mut(&mut self, id: &str) -> Option<&mut CircuitBreaker> {
        self.circuit_breakers.get_mut(id)
    }

    pub fn tele_signal(&self, id: &str) -> Option<&TeleSignal> {
        self.tele_signals.get(id)
    }

    pub fn tele_signal_mut(&mut self, id: &str) -> Option<&mut TeleSignal> {
        self.tele_signals.get_mut(id)
    }

    pub fn telemetry(&self, id: &str) -> Option<&Telemetry> {
        self.telemetries.get(id)
    }

    pub fn telemetry_mut(&mut self, id: &str) -> Option<&mut Telemetry> {
        self.telemetries.get_mut(id)
    }

    pub fn tap_changer(&self, id: &str) -> Option<&TapChanger> {
        self.tap_changers.get(id)
    }

    pub fn tap_changer_mut(&mut self, id: &str) -> Option<&mut TapChanger> {
        self.tap_changers.get_mut(id)
    }

    /// Whole-collection listing for one category's broadcast.
    pub fn circuit_breakers(&self) -> Vec<CircuitBreaker> {
        self.circuit_breakers.values().cloned().collect()
    }

    pub fn tele_signals(&self) -> Vec<TeleSignal> {
        self.tele_signals.values().cloned().collect()
    }

    pub fn telemetries(&self) -> Vec<Telemetry> {
        self.telemetries.values().cloned().collect()
    }

    pub fn tap_changers(&self) -> Vec<TapChanger> {
        self.tap_changers.values().cloned().collect()
    }

    /// Entity ids of simulatable entities, for the simulation engine.
    pub fn auto_entity_ids(&self) -> (Vec<String>, Vec<String>) {
        let signals = self
            .tele_signals
            .values()
            .filter(|ts| ts.auto_mode)
            .map(|ts| ts.id.clone())
            .collect();
        let telemetries = self
            .telemetries
            .values()
            .filter(|tm| tm.auto_mode)
            .map(|tm| tm.id.clone())
            .collect();
        (signals, telemetries)
    }

    /// Full snapshot of every category.
    pub fn snapshot(&self) -> SimulatorSnapshot {
        SimulatorSnapshot {
            circuit_breakers: self.circuit_breakers(),
            tele_signals: self.tele_signals(),
            telemetries: self.telemetries(),
            tap_changers: self.tap_changers(),
        }
    }

    /// Total entity count across categories.
    pub fn len(&self) -> usize {
        self.circuit_breakers.len()
            + self.tele_signals.len()
            + self.telemetries.len()
            + self.tap_changers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
