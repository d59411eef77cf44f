//! Simulator facade.
//!
//! [`RtuSimulator`] owns the shared core and the three runtime tasks (inbound
//! bridge, simulation engine, change scanner) and exposes the management API:
//! entity lifecycle, manual writes, snapshot export/import and observer
//! subscription. The protocol stack is handed a [`ProtocolInbound`] for its
//! callbacks and drives the [`ProtocolLink`] the simulator was built with.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::{Bridge, FeedbackPolicy, InboundEvent, ProtocolInbound};
use crate::broadcast::{emit, ChangeScanner, ObserverEvent};
use crate::core::SimCore;
use crate::error::{Result, RtuSimError};
use crate::link::{ProtocolLink, Report};
use crate::registry::PointSummary;
use crate::simulation::SimulationEngine;
use crate::store::EntityCategory;
use crate::types::{
    CircuitBreaker, Ioa, LocalRemote, PointValue, SimulatorSnapshot, TapChanger, TeleSignal,
    Telemetry,
};

/// Default period of the external-change scan.
pub const DEFAULT_POLL_INTERVAL: u64 = 1;

/// Default simulation tick in milliseconds; entity intervals are multiples.
pub const DEFAULT_SIM_GRANULARITY_MS: u64 = 100;

/// Default bound of the inbound event queue.
pub const DEFAULT_INBOUND_QUEUE_DEPTH: usize = 64;

/// Default capacity of the observer channel.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

/// Default backoff in seconds after repeated simulation failures.
pub const DEFAULT_FAILURE_BACKOFF: u64 = 3;

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Period of the external-change scan
    pub poll_interval: Duration,
    /// Simulation tick granularity
    pub sim_granularity: Duration,
    /// Bound of the inbound event queue
    pub inbound_queue_depth: usize,
    /// Capacity of the observer broadcast channel
    pub observer_capacity: usize,
    /// How command feedback reaches observers
    pub feedback_policy: FeedbackPolicy,
    /// Backoff after repeated simulation cycle failures
    pub failure_backoff: Duration,
}

impl SimulatorConfig {
    /// Create a configuration with the defaults.
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL),
            sim_granularity: Duration::from_millis(DEFAULT_SIM_GRANULARITY_MS),
            inbound_queue_depth: DEFAULT_INBOUND_QUEUE_DEPTH,
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
            feedback_policy: FeedbackPolicy::default(),
            failure_backoff: Duration::from_secs(DEFAULT_FAILURE_BACKOFF),
        }
    }

    /// Set the external-change scan period.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the simulation tick granularity.
    pub fn sim_granularity(mut self, granularity: Duration) -> Self {
        self.sim_granularity = granularity;
        self
    }

    /// Set the inbound queue bound.
    pub fn inbound_queue_depth(mut self, depth: usize) -> Self {
        self.inbound_queue_depth = depth;
        self
    }

    /// Set the observer channel capacity.
    pub fn observer_capacity(mut self, capacity: usize) -> Self {
        self.observer_capacity = capacity;
        self
    }

    /// Set the command feedback policy.
    pub fn feedback_policy(mut self, policy: FeedbackPolicy) -> Self {
        self.feedback_policy = policy;
        self
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Substation RTU point simulator.
pub struct RtuSimulator {
    config: SimulatorConfig,
    core: Arc<RwLock<SimCore>>,
    link: Arc<dyn ProtocolLink>,
    observers: broadcast::Sender<ObserverEvent>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    inbound_rx: Option<mpsc::Receiver<InboundEvent>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    running: bool,
}

impl RtuSimulator {
    /// Create a simulator bound to a protocol link.
    pub fn new(link: Arc<dyn ProtocolLink>, config: SimulatorConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue_depth);
        let (observers, _) = broadcast::channel(config.observer_capacity);
        Self {
            config,
            core: Arc::new(RwLock::new(SimCore::new())),
            link,
            observers,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            running: false,
        }
    }

    /// Handle the protocol stack calls its callbacks into.
    pub fn inbound(&self) -> ProtocolInbound {
        ProtocolInbound::new(self.inbound_tx.clone())
    }

    /// Start the protocol stack and the runtime tasks.
    ///
    /// A stack startup failure is fatal: nothing is spawned and the error is
    /// returned.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        // A stopped simulator cannot be restarted; the runtime tasks are gone
        let rx = self.inbound_rx.take().ok_or(RtuSimError::Shutdown)?;

        self.link
            .start()
            .map_err(|e| RtuSimError::StackStartup(e.to_string()))?;

        let bridge = Bridge {
            core: self.core.clone(),
            link: self.link.clone(),
            observers: self.observers.clone(),
            feedback: self.config.feedback_policy,
            rx,
            cancel: self.cancel.clone(),
            selected: HashSet::new(),
        };
        self.tasks.push(tokio::spawn(bridge.run()));

        let engine = SimulationEngine {
            core: self.core.clone(),
            link: self.link.clone(),
            observers: self.observers.clone(),
            granularity: self.config.sim_granularity,
            failure_backoff: self.config.failure_backoff,
            cancel: self.cancel.clone(),
        };
        self.tasks.push(tokio::spawn(engine.run()));

        let scanner = ChangeScanner {
            core: self.core.clone(),
            observers: self.observers.clone(),
            poll_interval: self.config.poll_interval,
            cancel: self.cancel.clone(),
        };
        self.tasks.push(tokio::spawn(scanner.run()));

        self.running = true;
        info!("simulator started");
        Ok(())
    }

    /// Stop the runtime tasks and the protocol stack.
    ///
    /// Idempotent; the link is stopped exactly once.
    pub async fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("runtime task ended abnormally: {e}");
            }
        }
        self.link.stop();
        info!("simulator stopped");
    }

    // ---- entity lifecycle -------------------------------------------------

    pub async fn add_circuit_breaker(&self, cb: CircuitBreaker) -> Result<()> {
        let mut core = self.core.write().await;
        core.add_circuit_breaker(cb)?;
        emit(&core, &self.observers, EntityCategory::CircuitBreakers);
        Ok(())
    }

    pub async fn add_tele_signal(&self, ts: TeleSignal) -> Result<()> {
        let mut core = self.core.write().await;
        core.add_tele_signal(ts)?;
        emit(&core, &self.observers, EntityCategory::TeleSignals);
        Ok(())
    }

    pub async fn add_telemetry(&self, tm: Telemetry) -> Result<()> {
        let mut core = self.core.write().await;
        core.add_telemetry(tm)?;
        emit(&core, &self.observers, EntityCategory::Telemetries);
        Ok(())
    }

    pub async fn add_tap_changer(&self, tc: TapChanger) -> Result<()> {
        let mut core = self.core.write().await;
        core.add_tap_changer(tc)?;
        emit(&core, &self.observers, EntityCategory::TapChangers);
        Ok(())
    }

    pub async fn remove_circuit_breaker(&self, id: &str) -> Result<CircuitBreaker> {
        let mut core = self.core.write().await;
        let cb = core.remove_circuit_breaker(id)?;
        emit(&core, &self.observers, EntityCategory::CircuitBreakers);
        Ok(cb)
    }

    pub async fn remove_tele_signal(&self, id: &str) -> Result<TeleSignal> {
        let mut core = self.core.write().await;
        let ts = core.remove_tele_signal(id)?;
        emit(&core, &self.observers, EntityCategory::TeleSignals);
        Ok(ts)
    }

    pub async fn remove_telemetry(&self, id: &str) -> Result<Telemetry> {
        let mut core = self.core.write().await;
        let tm = core.remove_telemetry(id)?;
        emit(&core, &self.observers, EntityCategory::Telemetries);
        Ok(tm)
    }

    pub async fn remove_tap_changer(&self, id: &str) -> Result<TapChanger> {
        let mut core = self.core.write().await;
        let tc = core.remove_tap_changer(id)?;
        emit(&core, &self.observers, EntityCategory::TapChangers);
        Ok(tc)
    }

    // ---- manual writes ----------------------------------------------------

    /// Write a point value directly by address.
    pub async fn update_point(&self, ioa: Ioa, value: PointValue) -> Result<()> {
        let report = {
            let mut core = self.core.write().await;
            core.update_point(ioa, value)?
        };
        self.flush(report);
        Ok(())
    }

    /// Set a telesignal's value and/or auto mode.
    pub async fn update_tele_signal(
        &self,
        id: &str,
        value: Option<bool>,
        auto_mode: Option<bool>,
    ) -> Result<()> {
        let report = {
            let mut core = self.core.write().await;
            core.set_tele_signal(id, value, auto_mode)?
        };
        self.flush(report);
        Ok(())
    }

    /// Set a telemetry's engineering value and/or auto mode.
    pub async fn update_telemetry(
        &self,
        id: &str,
        value: Option<f64>,
        auto_mode: Option<bool>,
    ) -> Result<()> {
        let report = {
            let mut core = self.core.write().await;
            core.set_telemetry(id, value, auto_mode)?
        };
        self.flush(report);
        Ok(())
    }

    /// Switch a circuit breaker between local and remote mode.
    pub async fn set_breaker_mode(&self, id: &str, mode: LocalRemote) -> Result<()> {
        let report = {
            let mut core = self.core.write().await;
            core.set_breaker_mode(id, mode)?
        };
        self.flush(report);
        Ok(())
    }

    /// Switch a tap changer between local and remote mode.
    pub async fn set_tap_changer_mode(&self, id: &str, mode: LocalRemote) -> Result<()> {
        let report = {
            let mut core = self.core.write().await;
            core.set_tap_changer_mode(id, mode)?
        };
        self.flush(report);
        Ok(())
    }

    fn flush(&self, report: Option<Report>) {
        if let Some(report) = report {
            if let Err(e) = self.link.enqueue_report(report) {
                warn!("manual write report failed: {e}");
            }
        }
    }

    // ---- observation / persistence ----------------------------------------

    /// Subscribe to whole-collection change events.
    ///
    /// Returns the current state for initial synchronization together with
    /// the event receiver; events sent after the snapshot was taken are
    /// guaranteed to be visible either in it or on the channel.
    pub async fn subscribe(
        &self,
    ) -> (SimulatorSnapshot, Vec<PointSummary>, broadcast::Receiver<ObserverEvent>) {
        let core = self.core.read().await;
        let rx = self.observers.subscribe();
        (core.snapshot(), core.summaries(), rx)
    }

    /// Current entity state.
    pub async fn snapshot(&self) -> SimulatorSnapshot {
        self.core.read().await.snapshot()
    }

    /// Per-point summaries of the registry.
    pub async fn summaries(&self) -> Vec<PointSummary> {
        self.core.read().await.summaries()
    }

    /// Export the entity state as JSON.
    pub async fn export_json(&self) -> Result<String> {
        let snapshot = self.core.read().await.snapshot();
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Replace the entire entity state from a snapshot. All-or-nothing.
    pub async fn import(&self, snapshot: SimulatorSnapshot) -> Result<()> {
        let mut core = self.core.write().await;
        core.import(snapshot)?;
        for category in crate::store::ALL_CATEGORIES {
            emit(&core, &self.observers, category);
        }
        Ok(())
    }

    /// Replace the entire entity state from a JSON document.
    pub async fn import_json(&self, json: &str) -> Result<()> {
        let snapshot: SimulatorSnapshot = serde_json::from_str(json)?;
        self.import(snapshot).await
    }
}
