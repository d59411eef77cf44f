//! Inbound bridge from the protocol stack.
//!
//! The stack's callbacks run on its own threads and must return immediately,
//! so [`ProtocolInbound`] only enqueues into a bounded channel and reports
//! whether the event was accepted. A single worker task drains the queue and
//! does the real work: command validation, select-before-operate bookkeeping,
//! the interrogation response sequence and clock synchronization. One worker
//! means inbound commands are serialized; two near-simultaneous commands are
//! handled one after the other, each seeing the state the previous one left.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::{emit, ObserverEvent};
use crate::core::SimCore;
use crate::error::RtuSimError;
use crate::link::{AckResult, CommandAck, ConnectionEvent, ProtocolLink, ReportBatch};
use crate::registry::CommandBinding;
use crate::types::{Ioa, PointKind, PointValue};

/// Station interrogation qualifier. Other QOI values get a negative
/// confirmation and no data.
pub const QOI_STATION: u8 = 20;

/// How command feedback reaches observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackPolicy {
    /// The bridge pushes the changed collection right after execution.
    Immediate,
    /// Feedback rides the periodic change scan.
    #[default]
    Polled,
}

/// One event handed over by the protocol stack.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Command {
        /// Raw address as received; may not name a registered point
        ioa: u32,
        kind: PointKind,
        value: PointValue,
        select: bool,
    },
    Interrogation {
        qualifier: u8,
    },
    /// Per-IOA read request, answered with that single point's value
    Read {
        ioa: u32,
    },
    ClockSync,
    Connection(ConnectionEvent),
}

/// Cheap-to-clone handle the protocol stack calls into.
///
/// Every method enqueues and returns; `false` means the queue is full and
/// the stack should answer with a negative confirmation itself.
#[derive(Debug, Clone)]
pub struct ProtocolInbound {
    tx: mpsc::Sender<InboundEvent>,
}

impl ProtocolInbound {
    pub(crate) fn new(tx: mpsc::Sender<InboundEvent>) -> Self {
        Self { tx }
    }

    /// Hand over an inbound command (select or execute).
    pub fn on_command(&self, ioa: u32, kind: PointKind, value: PointValue, select: bool) -> bool {
        self.push(InboundEvent::Command { ioa, kind, value, select })
    }

    /// Hand over an interrogation request.
    pub fn on_interrogation(&self, qualifier: u8) -> bool {
        self.push(InboundEvent::Interrogation { qualifier })
    }

    /// Hand over a per-IOA read request.
    pub fn on_read(&self, ioa: u32) -> bool {
        self.push(InboundEvent::Read { ioa })
    }

    /// Hand over a clock synchronization request.
    pub fn on_clock_sync(&self) -> bool {
        self.push(InboundEvent::ClockSync)
    }

    /// Hand over a connection lifecycle event.
    pub fn on_connection(&self, event: ConnectionEvent) -> bool {
        self.push(InboundEvent::Connection(event))
    }

    fn push(&self, event: InboundEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("inbound queue rejected event: {e}");
                false
            }
        }
    }
}

/// Worker task draining the inbound queue.
pub(crate) struct Bridge {
    pub core: Arc<RwLock<SimCore>>,
    pub link: Arc<dyn ProtocolLink>,
    pub observers: broadcast::Sender<ObserverEvent>,
    pub feedback: FeedbackPolicy,
    pub rx: mpsc::Receiver<InboundEvent>,
    pub cancel: CancellationToken,
    /// Command points with a pending select
    pub selected: HashSet<Ioa>,
}

impl Bridge {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
        debug!("inbound bridge stopped");
    }

    async fn handle(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Command { ioa, kind, value, select } => {
                self.handle_command(ioa, kind, value, select).await;
            }
            InboundEvent::Interrogation { qualifier } => {
                self.handle_interrogation(qualifier).await;
            }
            InboundEvent::Read { ioa } => {
                self.handle_read(ioa).await;
            }
            InboundEvent::ClockSync => {
                debug!("clock synchronization requested");
                if let Err(e) = self.link.send_clock_sync_ack(SystemTime::now()) {
                    warn!("clock sync ack failed: {e}");
                }
            }
            InboundEvent::Connection(event) => {
                info!("protocol connection {event}");
            }
        }
    }

    async fn handle_command(&mut self, raw_ioa: u32, kind: PointKind, value: PointValue, select: bool) {
        // Resolve the point and copy out what the execution needs, then
        // release the lock before anything is sent.
        let resolved = {
            let core = self.core.read().await;
            match core.registry().lookup(raw_ioa) {
                Ok(d) => {
                    if d.kind != kind || !value.matches_kind(d.kind) {
                        Err(AckResult::MismatchedKind)
                    } else {
                        match &d.command {
                            Some(binding) => Ok((d.ioa, binding.clone(), d.select_before_operate)),
                            // A monitoring point is not commandable
                            None => Err(AckResult::MismatchedKind),
                        }
                    }
                }
                Err(_) => Err(AckResult::UnknownAddress),
            }
        };

        let (ioa, binding, sbo) = match resolved {
            Ok(parts) => parts,
            Err(result) => {
                debug!(ioa = raw_ioa, select, ?result, "command rejected");
                self.ack(raw_ioa, select, result);
                return;
            }
        };

        if select {
            // Select arms the point and mutates nothing else.
            if sbo {
                self.selected.insert(ioa);
            }
            debug!(ioa = raw_ioa, "command selected");
            self.ack(raw_ioa, true, AckResult::Confirmed);
            return;
        }

        if sbo && !self.selected.remove(&ioa) {
            debug!(ioa = raw_ioa, "execute without prior select");
            self.ack(raw_ioa, false, AckResult::Refused);
            return;
        }

        let outcome = {
            let mut core = self.core.write().await;
            match core.apply_command(ioa, &binding, value) {
                Ok(effect) => {
                    if self.feedback == FeedbackPolicy::Immediate {
                        core.mark_synced(effect.reports.iter().map(|r| r.ioa));
                        emit(&core, &self.observers, effect.category);
                    }
                    Ok(effect.reports)
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(reports) => {
                self.ack(raw_ioa, false, AckResult::Confirmed);
                for report in reports {
                    if let Err(e) = self.link.enqueue_report(report) {
                        warn!("command feedback report failed: {e}");
                    }
                }
            }
            Err(RtuSimError::Refused(reason)) => {
                info!(ioa = raw_ioa, "command refused: {reason}");
                self.ack(raw_ioa, false, AckResult::Refused);
            }
            Err(e) => {
                warn!(ioa = raw_ioa, "command failed: {e}");
                self.ack(raw_ioa, false, AckResult::Refused);
            }
        }
    }

    async fn handle_interrogation(&mut self, qualifier: u8) {
        if qualifier != QOI_STATION {
            debug!(qualifier, "unsupported interrogation qualifier");
            if let Err(e) = self.link.send_interrogation_ack(qualifier, true) {
                warn!("interrogation nack failed: {e}");
            }
            return;
        }

        // Snapshot the batches first so no lock is held across sends.
        let batches: Vec<ReportBatch> = {
            let core = self.core.read().await;
            core.registry().interrogation_batches()
        };

        if let Err(e) = self.link.send_interrogation_ack(qualifier, false) {
            warn!("interrogation ack failed: {e}");
            return;
        }
        for batch in batches {
            if let Err(e) = self.link.send_interrogation_batch(batch) {
                warn!("interrogation batch failed: {e}");
            }
        }
        if let Err(e) = self.link.send_interrogation_term(qualifier) {
            warn!("interrogation termination failed: {e}");
        }
        debug!("interrogation response complete");
    }

    async fn handle_read(&self, raw_ioa: u32) {
        let response = {
            let core = self.core.read().await;
            core.registry().lookup(raw_ioa).ok().map(|d| d.report())
        };
        if response.is_none() {
            debug!(ioa = raw_ioa, "read of unknown address");
        }
        if let Err(e) = self.link.send_read_response(raw_ioa, response) {
            warn!("read response failed: {e}");
        }
    }

    fn ack(&self, ioa: u32, select: bool, result: AckResult) {
        let ack = CommandAck { ioa, select, result };
        if let Err(e) = self.link.send_command_ack(ack) {
            warn!("command ack failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkRecord, RecordingLink};
    use crate::types::{CircuitBreaker, DoublePointState, LocalRemote, TeleSignal, Telemetry};
    use std::time::Duration;

    fn ioa(v: u32) -> Ioa {
        Ioa::new(v).unwrap()
    }

    fn breaker(id: &str, base: u32, sbo: bool) -> CircuitBreaker {
        CircuitBreaker {
            id: id.to_string(),
            name: format!("BRK {id}"),
            ioa_status_open: ioa(base),
            ioa_status_close: ioa(base + 1),
            ioa_control_open: ioa(base + 2),
            ioa_control_close: ioa(base + 3),
            ioa_local_remote: ioa(base + 4),
            ioa_status_dp: None,
            ioa_control_dp: None,
            has_double_point: false,
            select_before_operate: sbo,
            closed: false,
            local_remote: LocalRemote::Remote,
        }
    }

    struct Harness {
        core: Arc<RwLock<SimCore>>,
        link: Arc<RecordingLink>,
        inbound: ProtocolInbound,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_bridge(core: SimCore, feedback: FeedbackPolicy) -> Harness {
        let core = Arc::new(RwLock::new(core));
        let link = Arc::new(RecordingLink::new());
        let (tx, rx) = mpsc::channel(16);
        let (observers, _) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let bridge = Bridge {
            core: core.clone(),
            link: link.clone(),
            observers,
            feedback,
            rx,
            cancel: cancel.clone(),
            selected: HashSet::new(),
        };
        let handle = tokio::spawn(bridge.run());
        Harness { core, link, inbound: ProtocolInbound::new(tx), cancel, handle }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn stop(h: Harness) {
        h.cancel.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_execute_confirms_and_reports() {
        let mut core = SimCore::new();
        core.add_circuit_breaker(breaker("cb-1", 100, false)).unwrap();
        let h = spawn_bridge(core, FeedbackPolicy::Polled);

        assert!(h.inbound.on_command(103, PointKind::SingleCommand, PointValue::Single(true), false));
        settle().await;

        let records = h.link.records();
        assert_eq!(
            records[0],
            LinkRecord::CommandAck(CommandAck { ioa: 103, select: false, result: AckResult::Confirmed })
        );
        // Both status points reported spontaneously after the ack
        assert_eq!(h.link.reports().len(), 2);
        assert!(h.core.read().await.store().circuit_breaker("cb-1").unwrap().closed);
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_address_ack() {
        let h = spawn_bridge(SimCore::new(), FeedbackPolicy::Polled);
        h.inbound.on_command(999, PointKind::SingleCommand, PointValue::Single(true), false);
        settle().await;

        assert_eq!(
            h.link.records(),
            vec![LinkRecord::CommandAck(CommandAck {
                ioa: 999,
                select: false,
                result: AckResult::UnknownAddress,
            })]
        );
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_kind_mismatch_ack() {
        let mut core = SimCore::new();
        core.add_circuit_breaker(breaker("cb-1", 100, false)).unwrap();
        let h = spawn_bridge(core, FeedbackPolicy::Polled);

        // Double command aimed at a single-command point
        h.inbound.on_command(
            103,
            PointKind::DoubleCommand,
            PointValue::Double(DoublePointState::On),
            false,
        );
        // Command aimed at a monitoring point
        h.inbound.on_command(100, PointKind::SinglePoint, PointValue::Single(true), false);
        settle().await;

        let records = h.link.records();
        assert_eq!(records.len(), 2);
        for record in records {
            match record {
                LinkRecord::CommandAck(ack) => assert_eq!(ack.result, AckResult::MismatchedKind),
                other => panic!("unexpected record: {other:?}"),
            }
        }
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sbo_execute_without_select_is_refused() {
        let mut core = SimCore::new();
        core.add_circuit_breaker(breaker("cb-1", 100, true)).unwrap();
        let h = spawn_bridge(core, FeedbackPolicy::Polled);

        h.inbound.on_command(103, PointKind::SingleCommand, PointValue::Single(true), false);
        settle().await;

        assert_eq!(
            h.link.records(),
            vec![LinkRecord::CommandAck(CommandAck {
                ioa: 103,
                select: false,
                result: AckResult::Refused,
            })]
        );
        assert!(!h.core.read().await.store().circuit_breaker("cb-1").unwrap().closed);
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sbo_select_then_execute() {
        let mut core = SimCore::new();
        core.add_circuit_breaker(breaker("cb-1", 100, true)).unwrap();
        let h = spawn_bridge(core, FeedbackPolicy::Polled);

        h.inbound.on_command(103, PointKind::SingleCommand, PointValue::Single(true), true);
        settle().await;
        // Select confirmed, nothing mutated yet
        assert_eq!(
            h.link.records(),
            vec![LinkRecord::CommandAck(CommandAck {
                ioa: 103,
                select: true,
                result: AckResult::Confirmed,
            })]
        );
        assert!(!h.core.read().await.store().circuit_breaker("cb-1").unwrap().closed);

        h.link.clear();
        h.inbound.on_command(103, PointKind::SingleCommand, PointValue::Single(true), false);
        settle().await;
        assert!(h.core.read().await.store().circuit_breaker("cb-1").unwrap().closed);

        // The select is consumed: a second bare execute is refused
        h.link.clear();
        h.inbound.on_command(102, PointKind::SingleCommand, PointValue::Single(true), false);
        settle().await;
        assert_eq!(
            h.link.records(),
            vec![LinkRecord::CommandAck(CommandAck {
                ioa: 102,
                select: false,
                result: AckResult::Refused,
            })]
        );
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_mode_command_refused() {
        let mut core = SimCore::new();
        let mut cb = breaker("cb-1", 100, false);
        cb.local_remote = LocalRemote::Local;
        core.add_circuit_breaker(cb).unwrap();
        let h = spawn_bridge(core, FeedbackPolicy::Polled);

        h.inbound.on_command(103, PointKind::SingleCommand, PointValue::Single(true), false);
        settle().await;

        assert_eq!(
            h.link.records(),
            vec![LinkRecord::CommandAck(CommandAck {
                ioa: 103,
                select: false,
                result: AckResult::Refused,
            })]
        );
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrogation_sequence_order() {
        let mut core = SimCore::new();
        core.add_circuit_breaker(breaker("cb-1", 100, false)).unwrap();
        core.add_tele_signal(TeleSignal {
            id: "ts-1".to_string(),
            name: "alarm".to_string(),
            ioa: ioa(400),
            value: true,
            auto_mode: false,
            update_interval_secs: 5,
        })
        .unwrap();
        core.add_telemetry(Telemetry {
            id: "tm-1".to_string(),
            name: "P".to_string(),
            ioa: ioa(200),
            value: 10.0,
            unit: "MW".to_string(),
            min_value: 0.0,
            max_value: 100.0,
            scale_factor: 0.5,
            auto_mode: false,
            update_interval_secs: 1,
            time_tagged: true,
        })
        .unwrap();
        let h = spawn_bridge(core, FeedbackPolicy::Polled);

        h.inbound.on_interrogation(QOI_STATION);
        settle().await;

        let records = h.link.records();
        assert_eq!(
            records.first(),
            Some(&LinkRecord::InterrogationAck { qualifier: QOI_STATION, negative: false })
        );
        assert_eq!(
            records.last(),
            Some(&LinkRecord::InterrogationTerm { qualifier: QOI_STATION })
        );
        // Time-tagged measurement batch comes last among the batches
        let batches: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                LinkRecord::InterrogationBatch(b) => Some(b.clone()),
                _ => None,
            })
            .collect();
        assert!(!batches.is_empty());
        let last = batches.last().unwrap();
        assert!(last.time_tagged);
        assert_eq!(last.kind, PointKind::MeasuredFloat);
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrogation_unsupported_qualifier() {
        let h = spawn_bridge(SimCore::new(), FeedbackPolicy::Polled);
        h.inbound.on_interrogation(21);
        settle().await;

        assert_eq!(
            h.link.records(),
            vec![LinkRecord::InterrogationAck { qualifier: 21, negative: true }]
        );
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_answers_with_current_value() {
        let mut core = SimCore::new();
        core.add_circuit_breaker(breaker("cb-1", 100, false)).unwrap();
        let h = spawn_bridge(core, FeedbackPolicy::Polled);

        h.inbound.on_read(101);
        settle().await;

        match h.link.records().as_slice() {
            [LinkRecord::ReadResponse { ioa: 101, response: Some(report) }] => {
                assert_eq!(report.ioa, ioa(101));
                assert_eq!(report.kind, PointKind::SinglePoint);
                // Breaker starts open, so the closed-status point is false
                assert_eq!(report.value, PointValue::Single(false));
            }
            other => panic!("unexpected records: {other:?}"),
        }
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_unknown_address_is_negative() {
        let h = spawn_bridge(SimCore::new(), FeedbackPolicy::Polled);
        h.inbound.on_read(999);
        settle().await;

        assert_eq!(
            h.link.records(),
            vec![LinkRecord::ReadResponse { ioa: 999, response: None }]
        );
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_events_produce_no_traffic() {
        let h = spawn_bridge(SimCore::new(), FeedbackPolicy::Polled);
        h.inbound.on_connection(ConnectionEvent::Opened);
        h.inbound.on_connection(ConnectionEvent::Activated);
        h.inbound.on_connection(ConnectionEvent::Closed);
        settle().await;

        assert!(h.link.records().is_empty());
        stop(h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_sync_ack() {
        let h = spawn_bridge(SimCore::new(), FeedbackPolicy::Polled);
        h.inbound.on_clock_sync();
        settle().await;

        assert_eq!(h.link.records(), vec![LinkRecord::ClockSyncAck]);
        stop(h).await;
    }

    #[tokio::test]
    async fn test_queue_full_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let inbound = ProtocolInbound::new(tx);
        assert!(inbound.on_clock_sync());
        // Queue depth 1, nobody draining
        assert!(!inbound.on_clock_sync());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_feedback_emits_and_suppresses_rescan() {
        let mut core = SimCore::new();
        core.add_circuit_breaker(breaker("cb-1", 100, false)).unwrap();
        let core = Arc::new(RwLock::new(core));
        let link = Arc::new(RecordingLink::new());
        let (tx, rx) = mpsc::channel(16);
        let (observers, mut events) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let bridge = Bridge {
            core: core.clone(),
            link,
            observers,
            feedback: FeedbackPolicy::Immediate,
            rx,
            cancel: cancel.clone(),
            selected: HashSet::new(),
        };
        let handle = tokio::spawn(bridge.run());
        let inbound = ProtocolInbound::new(tx);

        inbound.on_command(103, PointKind::SingleCommand, PointValue::Single(true), false);
        settle().await;

        match events.try_recv().unwrap() {
            ObserverEvent::CircuitBreakers(list) => assert!(list[0].closed),
            other => panic!("unexpected event: {other:?}"),
        }
        // The bridge synced the mirror, so the scanner finds nothing
        assert!(core.write().await.scan_changes().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
