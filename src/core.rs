//! Shared simulator state.
//!
//! [`SimCore`] couples the IOA registry, the entity store and the observer
//! mirror behind one synchronization point. Every mutation from any actor -
//! the protocol bridge, the simulation engine, the change detector and the
//! management API - goes through a method here while the caller holds the
//! single core lock; no global state is touched from multiple tasks.
//!
//! Methods never perform protocol sends. They return the spontaneous
//! [`Report`]s that became due, and the caller flushes them to the link
//! after releasing the lock.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, RtuSimError};
use crate::link::Report;
use crate::registry::{CommandBinding, IoaRegistry, PointDescriptor, PointSummary};
use crate::store::{EntityCategory, EntityStore};
use crate::types::{
    CircuitBreaker, DoublePointState, Ioa, LocalRemote, PointKind, PointValue, SimulatorSnapshot,
    TapChanger, TeleSignal, Telemetry,
};

/// Result of applying an executed command.
#[derive(Debug)]
pub struct CommandEffect {
    /// Category whose collection changed (for observer feedback)
    pub category: EntityCategory,
    /// Spontaneous reports that became due; flush after unlocking
    pub reports: Vec<Report>,
}

/// Registry + entity store + observer mirror, guarded by one lock upstream.
#[derive(Debug, Default)]
pub struct SimCore {
    registry: IoaRegistry,
    store: EntityStore,
    /// Last per-IOA values pushed towards observers. The change detector
    /// compares the registry against this; the simulation engine and the
    /// immediate-feedback path keep it in sync for changes they broadcast
    /// themselves.
    mirror: HashMap<Ioa, PointValue>,
}

impl SimCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &IoaRegistry {
        &self.registry
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    // ---- entity management ------------------------------------------------

    /// Register a circuit breaker and all its points.
    ///
    /// All-or-nothing: a duplicate IOA anywhere rolls back every IOA already
    /// registered for this entity.
    pub fn add_circuit_breaker(&mut self, cb: CircuitBreaker) -> Result<()> {
        cb.validate()?;
        if self.store.circuit_breaker(&cb.id).is_some() {
            return Err(RtuSimError::DuplicateEntity(cb.id.clone()));
        }
        self.register_all(breaker_descriptors(&cb))?;
        self.seed_mirror(&cb.status_ioas());
        self.store.insert_circuit_breaker(cb)
    }

    pub fn add_tele_signal(&mut self, ts: TeleSignal) -> Result<()> {
        ts.validate()?;
        if self.store.tele_signal(&ts.id).is_some() {
            return Err(RtuSimError::DuplicateEntity(ts.id.clone()));
        }
        self.register_all(vec![tele_signal_descriptor(&ts)])?;
        self.seed_mirror(&[ts.ioa]);
        self.store.insert_tele_signal(ts)
    }

    pub fn add_telemetry(&mut self, tm: Telemetry) -> Result<()> {
        tm.validate()?;
        if self.store.telemetry(&tm.id).is_some() {
            return Err(RtuSimError::DuplicateEntity(tm.id.clone()));
        }
        self.register_all(vec![telemetry_descriptor(&tm)])?;
        self.seed_mirror(&[tm.ioa]);
        self.store.insert_telemetry(tm)
    }

    pub fn add_tap_changer(&mut self, tc: TapChanger) -> Result<()> {
        tc.validate()?;
        if self.store.tap_changer(&tc.id).is_some() {
            return Err(RtuSimError::DuplicateEntity(tc.id.clone()));
        }
        self.register_all(tap_changer_descriptors(&tc))?;
        self.seed_mirror(&tc.status_ioas());
        self.store.insert_tap_changer(tc)
    }

    /// Remove an entity: deregister all owned IOAs first, then discard the
    /// record.
    pub fn remove_circuit_breaker(&mut self, id: &str) -> Result<CircuitBreaker> {
        let cb = self.store.remove_circuit_breaker(id)?;
        self.forget_ioas(&cb.referenced_ioas());
        Ok(cb)
    }

    pub fn remove_tele_signal(&mut self, id: &str) -> Result<TeleSignal> {
        let ts = self.store.remove_tele_signal(id)?;
        self.forget_ioas(&[ts.ioa]);
        Ok(ts)
    }

    pub fn remove_telemetry(&mut self, id: &str) -> Result<Telemetry> {
        let tm = self.store.remove_telemetry(id)?;
        self.forget_ioas(&[tm.ioa]);
        Ok(tm)
    }

    pub fn remove_tap_changer(&mut self, id: &str) -> Result<TapChanger> {
        let tc = self.store.remove_tap_changer(id)?;
        self.forget_ioas(&tc.referenced_ioas());
        Ok(tc)
    }

    fn register_all(&mut self, descriptors: Vec<PointDescriptor>) -> Result<()> {
        let mut registered: Vec<Ioa> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let ioa = descriptor.ioa;
            if let Err(e) = self.registry.add(descriptor) {
                for done in registered {
                    // Rollback of points added moments ago cannot fail
                    let _ = self.registry.remove(done);
                }
                return Err(e);
            }
            registered.push(ioa);
        }
        Ok(())
    }

    fn forget_ioas(&mut self, ioas: &[Ioa]) {
        for &ioa in ioas {
            let _ = self.registry.remove(ioa);
            self.mirror.remove(&ioa);
        }
    }

    fn seed_mirror(&mut self, ioas: &[Ioa]) {
        for &ioa in ioas {
            if let Some(d) = self.registry.get(ioa) {
                self.mirror.insert(ioa, d.value);
            }
        }
    }

    // ---- manual value writes ---------------------------------------------

    /// Write a point value directly (management interface).
    ///
    /// The mirror is left stale on purpose: a manual write is an
    /// externally-driven change and reaches observers through the next
    /// change-detection cycle.
    pub fn update_point(&mut self, ioa: Ioa, value: PointValue) -> Result<Option<Report>> {
        self.registry.update_value(ioa, value)
    }

    /// Update a telesignal's value and/or auto mode from the management side.
    pub fn set_tele_signal(
        &mut self,
        id: &str,
        value: Option<bool>,
        auto_mode: Option<bool>,
    ) -> Result<Option<Report>> {
        let ts = self
            .store
            .tele_signal_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        let ioa = ts.ioa;
        if let Some(auto) = auto_mode {
            ts.auto_mode = auto;
        }
        match value {
            Some(v) => self.registry.update_value(ioa, PointValue::Single(v)),
            None => Ok(None),
        }
    }

    /// Update a telemetry's engineering value and/or auto mode.
    pub fn set_telemetry(
        &mut self,
        id: &str,
        value: Option<f64>,
        auto_mode: Option<bool>,
    ) -> Result<Option<Report>> {
        let tm = self
            .store
            .telemetry_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        let ioa = tm.ioa;
        let point_value = value.map(|v| engineering_to_point(tm, v));
        if let Some(auto) = auto_mode {
            tm.auto_mode = auto;
        }
        match point_value {
            Some(v) => self.registry.update_value(ioa, v),
            None => Ok(None),
        }
    }

    /// Switch a breaker between local and remote mode.
    pub fn set_breaker_mode(&mut self, id: &str, mode: LocalRemote) -> Result<Option<Report>> {
        let cb = self
            .store
            .circuit_breaker_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        cb.local_remote = mode;
        let ioa = cb.ioa_local_remote;
        self.registry.update_value(ioa, PointValue::Single(mode.as_bool()))
    }

    /// Switch a tap changer between local and remote mode.
    pub fn set_tap_changer_mode(&mut self, id: &str, mode: LocalRemote) -> Result<Option<Report>> {
        let tc = self
            .store
            .tap_changer_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        tc.local_remote = mode;
        let ioa = tc.ioa_local_remote;
        self.registry.update_value(ioa, PointValue::Single(mode.as_bool()))
    }

    // ---- command application (bridge, execute phase) ----------------------

    /// Apply an executed command into the entity store and the registry.
    ///
    /// Select never reaches this method; the bridge validates and
    /// acknowledges selects without mutating anything.
    pub fn apply_command(
        &mut self,
        command_ioa: Ioa,
        binding: &CommandBinding,
        value: PointValue,
    ) -> Result<CommandEffect> {
        let mut reports = Vec::new();

        // Record the carried value on the command point itself
        if let Some(report) = self.registry.update_value(command_ioa, value)? {
            reports.push(report);
        }

        let category = match binding {
            CommandBinding::BreakerOpen { entity_id } => {
                self.operate_breaker(entity_id, value.as_bool() != Some(false), false, &mut reports)?
            }
            CommandBinding::BreakerClose { entity_id } => {
                self.operate_breaker(entity_id, value.as_bool() != Some(false), true, &mut reports)?
            }
            CommandBinding::BreakerDouble { entity_id } => {
                let target = match value {
                    PointValue::Double(DoublePointState::Off) => false,
                    PointValue::Double(DoublePointState::On) => true,
                    _ => {
                        return Err(RtuSimError::validation(
                            "double command with indeterminate state",
                        ))
                    }
                };
                self.operate_breaker(entity_id, true, target, &mut reports)?
            }
            CommandBinding::TapRaiseLower { entity_id } => {
                let raise = match value {
                    PointValue::Double(DoublePointState::On) => true,
                    PointValue::Double(DoublePointState::Off) => false,
                    _ => {
                        return Err(RtuSimError::validation(
                            "double command with indeterminate state",
                        ))
                    }
                };
                self.move_tap(entity_id, raise, &mut reports)?
            }
            CommandBinding::TapAutoManual { entity_id } => {
                let automatic = value
                    .as_bool()
                    .ok_or_else(|| RtuSimError::validation("auto/manual command must be single"))?;
                self.set_tap_automatic(entity_id, automatic, &mut reports)?
            }
        };

        Ok(CommandEffect { category, reports })
    }

    fn operate_breaker(
        &mut self,
        id: &str,
        act: bool,
        close: bool,
        reports: &mut Vec<Report>,
    ) -> Result<EntityCategory> {
        let cb = self
            .store
            .circuit_breaker_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        if cb.local_remote == LocalRemote::Local {
            return Err(RtuSimError::refused(format!("breaker {id} is in local mode")));
        }
        if !act {
            // Command carried an OFF state for a dedicated open/close point:
            // acknowledged, nothing to drive.
            return Ok(EntityCategory::CircuitBreakers);
        }
        cb.closed = close;
        let status_open = cb.ioa_status_open;
        let status_close = cb.ioa_status_close;
        let status_dp = cb.ioa_status_dp;
        let position = cb.position();
        debug!(id, close, "breaker operated");

        self.push_update(status_open, PointValue::Single(!close), reports)?;
        self.push_update(status_close, PointValue::Single(close), reports)?;
        if let Some(dp) = status_dp {
            self.push_update(dp, PointValue::Double(position), reports)?;
        }
        Ok(EntityCategory::CircuitBreakers)
    }

    fn move_tap(
        &mut self,
        id: &str,
        raise: bool,
        reports: &mut Vec<Report>,
    ) -> Result<EntityCategory> {
        let tc = self
            .store
            .tap_changer_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        if tc.local_remote == LocalRemote::Local {
            return Err(RtuSimError::refused(format!("tap changer {id} is in local mode")));
        }
        // Saturating: the limits may sit at the edges of i16
        let next = if raise {
            tc.position.saturating_add(1).min(tc.max_position)
        } else {
            tc.position.saturating_sub(1).max(tc.min_position)
        };
        tc.position = next;
        let movement = if raise {
            DoublePointState::On
        } else {
            DoublePointState::Off
        };
        tc.last_movement = Some(movement);
        let position_ioa = tc.ioa_position;
        let movement_ioa = tc.ioa_status_raise_lower;
        debug!(id, raise, position = next, "tap changer moved");

        self.push_update(position_ioa, PointValue::Scaled(next), reports)?;
        self.push_update(movement_ioa, PointValue::Double(movement), reports)?;
        Ok(EntityCategory::TapChangers)
    }

    fn set_tap_automatic(
        &mut self,
        id: &str,
        automatic: bool,
        reports: &mut Vec<Report>,
    ) -> Result<EntityCategory> {
        let tc = self
            .store
            .tap_changer_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        if tc.local_remote == LocalRemote::Local {
            return Err(RtuSimError::refused(format!("tap changer {id} is in local mode")));
        }
        tc.automatic = automatic;
        let status_ioa = tc.ioa_status_auto_manual;
        self.push_update(status_ioa, PointValue::Single(automatic), reports)?;
        Ok(EntityCategory::TapChangers)
    }

    fn push_update(
        &mut self,
        ioa: Ioa,
        value: PointValue,
        reports: &mut Vec<Report>,
    ) -> Result<()> {
        if let Some(report) = self.registry.update_value(ioa, value)? {
            reports.push(report);
        }
        Ok(())
    }

    /// Mark IOAs as already pushed to observers (immediate-feedback path).
    pub fn mark_synced(&mut self, ioas: impl IntoIterator<Item = Ioa>) {
        for ioa in ioas {
            if let Some(d) = self.registry.get(ioa) {
                self.mirror.insert(ioa, d.value);
            }
        }
    }

    // ---- simulation hooks -------------------------------------------------

    /// Apply a simulated telesignal value.
    ///
    /// Updates registry, store and mirror together: the engine broadcasts
    /// its own changes, so the change detector must not see them again.
    pub fn simulate_tele_signal(&mut self, id: &str, value: bool) -> Result<Option<Report>> {
        let ts = self
            .store
            .tele_signal_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        let ioa = ts.ioa;
        let report = self.registry.update_value(ioa, PointValue::Single(value))?;
        if let Some(ts) = self.store.tele_signal_mut(id) {
            ts.value = value;
        }
        self.mark_synced([ioa]);
        Ok(report)
    }

    /// Apply a simulated telemetry engineering value.
    pub fn simulate_telemetry(&mut self, id: &str, value: f64) -> Result<Option<Report>> {
        let tm = self
            .store
            .telemetry_mut(id)
            .ok_or_else(|| RtuSimError::UnknownEntity(id.to_string()))?;
        let ioa = tm.ioa;
        let point_value = engineering_to_point(tm, value);
        let report = self.registry.update_value(ioa, point_value)?;
        let stored = self
            .registry
            .get(ioa)
            .map(|d| point_to_engineering(d))
            .unwrap_or(value);
        if let Some(tm) = self.store.telemetry_mut(id) {
            tm.value = stored;
        }
        self.mark_synced([ioa]);
        Ok(report)
    }

    /// Current parameters the engine needs for one telemetry step.
    pub fn telemetry_params(&self, id: &str) -> Option<(f64, f64, f64, f64)> {
        self.store
            .telemetry(id)
            .map(|tm| (tm.value, tm.min_value, tm.max_value, tm.scale_factor))
    }

    // ---- change detection -------------------------------------------------

    /// Compare every entity's status IOAs against the mirror.
    ///
    /// Differences update the mirror, copy the new value back into the
    /// entity record and mark the category changed. Returns the changed
    /// categories in a fixed order.
    pub fn scan_changes(&mut self) -> Vec<EntityCategory> {
        let mut changed = Vec::new();

        let mut breakers_changed = false;
        let breaker_ids: Vec<String> =
            self.store.circuit_breakers().iter().map(|cb| cb.id.clone()).collect();
        for id in breaker_ids {
            if self.refresh_breaker(&id) {
                breakers_changed = true;
            }
        }
        if breakers_changed {
            changed.push(EntityCategory::CircuitBreakers);
        }

        let mut signals_changed = false;
        let signal_ids: Vec<String> =
            self.store.tele_signals().iter().map(|ts| ts.id.clone()).collect();
        for id in signal_ids {
            if self.refresh_tele_signal(&id) {
                signals_changed = true;
            }
        }
        if signals_changed {
            changed.push(EntityCategory::TeleSignals);
        }

        let mut telemetries_changed = false;
        let telemetry_ids: Vec<String> =
            self.store.telemetries().iter().map(|tm| tm.id.clone()).collect();
        for id in telemetry_ids {
            if self.refresh_telemetry(&id) {
                telemetries_changed = true;
            }
        }
        if telemetries_changed {
            changed.push(EntityCategory::Telemetries);
        }

        let mut taps_changed = false;
        let tap_ids: Vec<String> =
            self.store.tap_changers().iter().map(|tc| tc.id.clone()).collect();
        for id in tap_ids {
            if self.refresh_tap_changer(&id) {
                taps_changed = true;
            }
        }
        if taps_changed {
            changed.push(EntityCategory::TapChangers);
        }

        changed
    }

    fn take_if_changed(&mut self, ioa: Ioa) -> Option<PointValue> {
        let current = self.registry.get(ioa)?.value;
        if self.mirror.get(&ioa) == Some(&current) {
            return None;
        }
        self.mirror.insert(ioa, current);
        Some(current)
    }

    fn refresh_breaker(&mut self, id: &str) -> bool {
        let Some(cb) = self.store.circuit_breaker(id) else {
            return false;
        };
        let status_open = cb.ioa_status_open;
        let status_close = cb.ioa_status_close;
        let local_remote = cb.ioa_local_remote;
        let status_dp = cb.ioa_status_dp;

        let mut changed = false;
        if self.take_if_changed(status_open).is_some() {
            changed = true;
        }
        if let Some(PointValue::Single(closed)) = self.take_if_changed(status_close) {
            if let Some(cb) = self.store.circuit_breaker_mut(id) {
                cb.closed = closed;
            }
            changed = true;
        }
        if let Some(PointValue::Single(remote)) = self.take_if_changed(local_remote) {
            if let Some(cb) = self.store.circuit_breaker_mut(id) {
                cb.local_remote = if remote { LocalRemote::Remote } else { LocalRemote::Local };
            }
            changed = true;
        }
        if let Some(dp) = status_dp {
            if self.take_if_changed(dp).is_some() {
                changed = true;
            }
        }
        changed
    }

    fn refresh_tele_signal(&mut self, id: &str) -> bool {
        let Some(ts) = self.store.tele_signal(id) else {
            return false;
        };
        let ioa = ts.ioa;
        if let Some(PointValue::Single(v)) = self.take_if_changed(ioa) {
            if let Some(ts) = self.store.tele_signal_mut(id) {
                ts.value = v;
            }
            return true;
        }
        false
    }

    fn refresh_telemetry(&mut self, id: &str) -> bool {
        let Some(tm) = self.store.telemetry(id) else {
            return false;
        };
        let ioa = tm.ioa;
        if self.take_if_changed(ioa).is_some() {
            let engineering = self
                .registry
                .get(ioa)
                .map(point_to_engineering)
                .unwrap_or_default();
            if let Some(tm) = self.store.telemetry_mut(id) {
                tm.value = engineering;
            }
            return true;
        }
        false
    }

    fn refresh_tap_changer(&mut self, id: &str) -> bool {
        let Some(tc) = self.store.tap_changer(id) else {
            return false;
        };
        let position = tc.ioa_position;
        let movement = tc.ioa_status_raise_lower;
        let auto = tc.ioa_status_auto_manual;
        let local_remote = tc.ioa_local_remote;

        let mut changed = false;
        if let Some(PointValue::Scaled(raw)) = self.take_if_changed(position) {
            if let Some(tc) = self.store.tap_changer_mut(id) {
                tc.position = raw;
            }
            changed = true;
        }
        if let Some(PointValue::Double(state)) = self.take_if_changed(movement) {
            if let Some(tc) = self.store.tap_changer_mut(id) {
                tc.last_movement = Some(state);
            }
            changed = true;
        }
        if let Some(PointValue::Single(automatic)) = self.take_if_changed(auto) {
            if let Some(tc) = self.store.tap_changer_mut(id) {
                tc.automatic = automatic;
            }
            changed = true;
        }
        if let Some(PointValue::Single(remote)) = self.take_if_changed(local_remote) {
            if let Some(tc) = self.store.tap_changer_mut(id) {
                tc.local_remote = if remote { LocalRemote::Remote } else { LocalRemote::Local };
            }
            changed = true;
        }
        changed
    }

    // ---- snapshot / export / import ---------------------------------------

    pub fn snapshot(&self) -> SimulatorSnapshot {
        self.store.snapshot()
    }

    pub fn summaries(&self) -> Vec<PointSummary> {
        self.registry.summaries()
    }

    /// Atomically replace all entities and their registry entries.
    ///
    /// The payload is staged into a fresh core first; any validation or
    /// duplicate-IOA failure leaves the live state untouched.
    pub fn import(&mut self, snapshot: SimulatorSnapshot) -> Result<()> {
        let mut staged = SimCore::new();
        for cb in snapshot.circuit_breakers {
            staged.add_circuit_breaker(cb)?;
        }
        for ts in snapshot.tele_signals {
            staged.add_tele_signal(ts)?;
        }
        for tm in snapshot.telemetries {
            staged.add_telemetry(tm)?;
        }
        for tc in snapshot.tap_changers {
            staged.add_tap_changer(tc)?;
        }
        *self = staged;
        Ok(())
    }
}

/// Convert a telemetry engineering value into its point representation.
fn engineering_to_point(tm: &Telemetry, value: f64) -> PointValue {
    if tm.is_integer_scaled() {
        PointValue::Scaled((value / tm.scale_factor).round() as i16)
    } else {
        PointValue::Float(value as f32)
    }
}

/// Engineering value from a telemetry-backed descriptor.
fn point_to_engineering(d: &PointDescriptor) -> f64 {
    match d.value {
        PointValue::Scaled(raw) => raw as f64 * d.scale_factor,
        other => other.as_f64(),
    }
}

fn breaker_descriptors(cb: &CircuitBreaker) -> Vec<PointDescriptor> {
    let mut descriptors = vec![
        PointDescriptor::new(cb.ioa_status_open, PointKind::SinglePoint, PointValue::Single(!cb.closed))
            .spontaneous(true),
        PointDescriptor::new(cb.ioa_status_close, PointKind::SinglePoint, PointValue::Single(cb.closed))
            .spontaneous(true),
        PointDescriptor::new(
            cb.ioa_local_remote,
            PointKind::SinglePoint,
            PointValue::Single(cb.local_remote.as_bool()),
        )
        .spontaneous(true),
        PointDescriptor::new(cb.ioa_control_open, PointKind::SingleCommand, PointValue::Single(false))
            .command(CommandBinding::BreakerOpen { entity_id: cb.id.clone() })
            .sbo(cb.select_before_operate),
        PointDescriptor::new(cb.ioa_control_close, PointKind::SingleCommand, PointValue::Single(false))
            .command(CommandBinding::BreakerClose { entity_id: cb.id.clone() })
            .sbo(cb.select_before_operate),
    ];
    if let (Some(status_dp), Some(control_dp)) = (cb.ioa_status_dp, cb.ioa_control_dp) {
        descriptors.push(
            PointDescriptor::new(status_dp, PointKind::DoublePoint, PointValue::Double(cb.position()))
                .spontaneous(true),
        );
        descriptors.push(
            PointDescriptor::new(
                control_dp,
                PointKind::DoubleCommand,
                PointValue::Double(DoublePointState::Intermediate),
            )
            .command(CommandBinding::BreakerDouble { entity_id: cb.id.clone() })
            .sbo(cb.select_before_operate),
        );
    }
    descriptors
}

fn tele_signal_descriptor(ts: &TeleSignal) -> PointDescriptor {
    let mut d = PointDescriptor::new(ts.ioa, PointKind::SinglePoint, PointValue::Single(ts.value))
        .spontaneous(true);
    if ts.auto_mode {
        d = d.auto(ts.update_interval_secs);
    } else {
        d.update_interval_secs = ts.update_interval_secs;
    }
    d
}

fn telemetry_descriptor(tm: &Telemetry) -> PointDescriptor {
    let (kind, value) = if tm.is_integer_scaled() {
        (PointKind::MeasuredScaled, PointValue::Scaled(tm.raw_value()))
    } else {
        (PointKind::MeasuredFloat, PointValue::Float(tm.value as f32))
    };
    let mut d = PointDescriptor::new(tm.ioa, kind, value)
        .spontaneous(true)
        .bounds(tm.min_value, tm.max_value)
        .scale(tm.scale_factor)
        .time_tagged(tm.time_tagged);
    if tm.auto_mode {
        d = d.auto(tm.update_interval_secs);
    } else {
        d.update_interval_secs = tm.update_interval_secs;
    }
    d
}

fn tap_changer_descriptors(tc: &TapChanger) -> Vec<PointDescriptor> {
    vec![
        PointDescriptor::new(tc.ioa_position, PointKind::MeasuredScaled, PointValue::Scaled(tc.position))
            .spontaneous(true)
            .bounds(tc.min_position as f64, tc.max_position as f64)
            .scale(1.0),
        PointDescriptor::new(
            tc.ioa_status_raise_lower,
            PointKind::DoublePoint,
            PointValue::Double(tc.last_movement.unwrap_or(DoublePointState::Intermediate)),
        )
        .spontaneous(true),
        PointDescriptor::new(
            tc.ioa_status_auto_manual,
            PointKind::SinglePoint,
            PointValue::Single(tc.automatic),
        )
        .spontaneous(true),
        PointDescriptor::new(
            tc.ioa_local_remote,
            PointKind::SinglePoint,
            PointValue::Single(tc.local_remote.as_bool()),
        )
        .spontaneous(true),
        PointDescriptor::new(
            tc.ioa_command_raise_lower,
            PointKind::DoubleCommand,
            PointValue::Double(DoublePointState::Intermediate),
        )
        .command(CommandBinding::TapRaiseLower { entity_id: tc.id.clone() }),
        PointDescriptor::new(
            tc.ioa_command_auto_manual,
            PointKind::SingleCommand,
            PointValue::Single(tc.automatic),
        )
        .command(CommandBinding::TapAutoManual { entity_id: tc.id.clone() }),
    ]
}
