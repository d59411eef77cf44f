//! Autonomous value simulation.
//!
//! One periodic task walks every auto-mode entity on a fine-grained tick and
//! updates those whose own interval has elapsed. Telesignals toggle randomly;
//! telemetries mostly drift near their current value and occasionally jump to
//! a random point of their range, always landing on the scale-factor grid
//! (the registry quantizes and clamps on write).
//!
//! The engine broadcasts its own changes and keeps the observer mirror in
//! sync, so the change scanner never reports them a second time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broadcast::{emit, ObserverEvent};
use crate::core::SimCore;
use crate::error::Result;
use crate::link::{ProtocolLink, Report};
use crate::store::EntityCategory;

/// Fraction of updates that drift instead of jumping.
const DRIFT_PROBABILITY: f64 = 0.8;
/// Drift amplitude as a fraction of the value range.
const DRIFT_SPAN: f64 = 0.1;

pub(crate) struct SimulationEngine {
    pub core: Arc<RwLock<SimCore>>,
    pub link: Arc<dyn ProtocolLink>,
    pub observers: broadcast::Sender<ObserverEvent>,
    /// Tick granularity; entity intervals are checked against it
    pub granularity: Duration,
    /// Pause after repeated whole-cycle failures
    pub failure_backoff: Duration,
    pub cancel: CancellationToken,
}

impl SimulationEngine {
    pub async fn run(self) {
        let mut ticker = time::interval(self.granularity);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_update: HashMap<String, Instant> = HashMap::new();
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.step(&mut last_update).await {
                        consecutive_failures = 0;
                    } else {
                        consecutive_failures += 1;
                        if consecutive_failures >= 3 {
                            warn!("simulation failing repeatedly, backing off");
                            tokio::select! {
                                _ = self.cancel.cancelled() => break,
                                _ = time::sleep(self.failure_backoff) => {}
                            }
                            consecutive_failures = 0;
                        }
                    }
                }
            }
        }
        debug!("simulation engine stopped");
    }

    /// One simulation cycle. Returns false if any entity update failed.
    async fn step(&self, last_update: &mut HashMap<String, Instant>) -> bool {
        let now = Instant::now();
        let mut reports: Vec<Report> = Vec::new();
        let mut clean = true;

        {
            let mut core = self.core.write().await;
            let (signal_ids, telemetry_ids) = core.store().auto_entity_ids();

            let mut signals_changed = false;
            for id in signal_ids {
                let Some(interval) = core
                    .store()
                    .tele_signal(&id)
                    .map(|ts| Duration::from_secs(ts.update_interval_secs))
                else {
                    continue;
                };
                if !due(last_update, &id, now, interval) {
                    continue;
                }
                match self.step_tele_signal(&mut core, &id) {
                    Ok(Some(report)) => {
                        reports.push(report);
                        signals_changed = true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(%id, "telesignal simulation failed: {e}");
                        clean = false;
                    }
                }
            }

            let mut telemetries_changed = false;
            for id in telemetry_ids {
                let Some(interval) = core
                    .store()
                    .telemetry(&id)
                    .map(|tm| Duration::from_secs(tm.update_interval_secs))
                else {
                    continue;
                };
                if !due(last_update, &id, now, interval) {
                    continue;
                }
                match self.step_telemetry(&mut core, &id) {
                    Ok(Some(report)) => {
                        reports.push(report);
                        telemetries_changed = true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(%id, "telemetry simulation failed: {e}");
                        clean = false;
                    }
                }
            }

            if signals_changed {
                emit(&core, &self.observers, EntityCategory::TeleSignals);
            }
            if telemetries_changed {
                emit(&core, &self.observers, EntityCategory::Telemetries);
            }
        }

        // Flush after the lock is gone
        for report in reports {
            if let Err(e) = self.link.enqueue_report(report) {
                warn!("simulated report failed: {e}");
                clean = false;
            }
        }
        clean
    }

    fn step_tele_signal(&self, core: &mut SimCore, id: &str) -> Result<Option<Report>> {
        let value = rand::thread_rng().gen_bool(0.5);
        core.simulate_tele_signal(id, value)
    }

    fn step_telemetry(&self, core: &mut SimCore, id: &str) -> Result<Option<Report>> {
        let Some((current, min, max, step)) = core.telemetry_params(id) else {
            return Ok(None);
        };
        let next = next_telemetry_value(&mut rand::thread_rng(), current, min, max, step);
        core.simulate_telemetry(id, next)
    }
}

/// Check and update an entity's own interval clock.
fn due(last_update: &mut HashMap<String, Instant>, id: &str, now: Instant, interval: Duration) -> bool {
    match last_update.get(id) {
        Some(&last) if now.duration_since(last) < interval => false,
        _ => {
            last_update.insert(id.to_string(), now);
            true
        }
    }
}

/// Pick the next value: usually a small drift around the current value,
/// sometimes a jump to a random grid point of the range.
fn next_telemetry_value<R: Rng>(rng: &mut R, current: f64, min: f64, max: f64, step: f64) -> f64 {
    let range = max - min;
    if range <= 0.0 || step <= 0.0 {
        return current;
    }
    if rng.gen_bool(DRIFT_PROBABILITY) {
        let delta = rng.gen_range(-DRIFT_SPAN..=DRIFT_SPAN) * range;
        (current + delta).clamp(min, max)
    } else {
        let steps = (range / step).round() as i64;
        min + rng.gen_range(0..=steps) as f64 * step
    }
}
