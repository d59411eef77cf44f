//! Protocol-stack boundary.
//!
//! The IEC 104 engine (framing, sequence windowing, timing supervision) is an
//! external collaborator. This module defines the outbound primitives the
//! core drives it with: spontaneous reports, command acknowledgments and the
//! general-interrogation response sequence. Every call is expected to enqueue
//! into the stack's own outbound queue and return promptly.

use std::time::SystemTime;

use crate::error::Result;
use crate::types::{Ioa, PointKind, PointValue};

/// A single spontaneous report (COT 3) for one point.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub ioa: Ioa,
    pub kind: PointKind,
    pub value: PointValue,
    /// Report with the CP56Time2a type variant
    pub time_tagged: bool,
}

/// One interrogation-response unit: every point of a single kind.
///
/// A response unit must never mix information-object types, so batches are
/// built per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBatch {
    pub kind: PointKind,
    pub time_tagged: bool,
    pub points: Vec<(Ioa, PointValue)>,
}

/// Outcome of an inbound command, in causes-of-transmission vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    /// Activation confirmed (COT 7)
    Confirmed,
    /// Unknown information object address (COT 47)
    UnknownAddress,
    /// Command kind does not match the registered point (COT 44)
    MismatchedKind,
    /// Negative confirmation: command refused (e.g. entity in local mode)
    Refused,
}

impl AckResult {
    /// Check if the command was accepted.
    #[inline]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Acknowledgment of an inbound command ASDU.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    /// Raw address as received; may not name a registered point
    pub ioa: u32,
    pub select: bool,
    pub result: AckResult,
}

/// Connection lifecycle events delivered by the protocol stack. Log-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed,
    Activated,
    Deactivated,
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
        };
        f.write_str(s)
    }
}

/// Outbound primitives of the external IEC 104 slave stack.
///
/// Implementations must be cheap and non-blocking: sends go to the stack's
/// own outbound queue. The core never holds its state lock across these
/// calls.
pub trait ProtocolLink: Send + Sync {
    /// Start the protocol engine. Failure here is fatal to simulator startup.
    fn start(&self) -> Result<()>;

    /// Stop the protocol engine. Called exactly once at shutdown.
    fn stop(&self);

    /// Enqueue a spontaneous report.
    fn enqueue_report(&self, report: Report) -> Result<()>;

    /// Acknowledge an inbound command.
    fn send_command_ack(&self, ack: CommandAck) -> Result<()>;

    /// Confirm (or negatively confirm) an interrogation request.
    fn send_interrogation_ack(&self, qualifier: u8, negative: bool) -> Result<()>;

    /// Send one interrogation-response batch.
    fn send_interrogation_batch(&self, batch: ReportBatch) -> Result<()>;

    /// Terminate the interrogation response sequence.
    fn send_interrogation_term(&self, qualifier: u8) -> Result<()>;

    /// Answer a single-point read request.
    ///
    /// `response` carries the point's current value, or `None` when the
    /// address is not registered and the request is answered negatively.
    fn send_read_response(&self, ioa: u32, response: Option<Report>) -> Result<()>;

    /// Acknowledge a clock synchronization request with the local time.
    fn send_clock_sync_ack(&self, time: SystemTime) -> Result<()>;
}

/// A link that discards all outbound traffic.
#[derive(Debug, Default)]
pub struct NullLink;

impl ProtocolLink for NullLink {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    fn enqueue_report(&self, _report: Report) -> Result<()> {
        Ok(())
    }

    fn send_command_ack(&self, _ack: CommandAck) -> Result<()> {
        Ok(())
    }

    fn send_interrogation_ack(&self, _qualifier: u8, _negative: bool) -> Result<()> {
        Ok(())
    }

    fn send_interrogation_batch(&self, _batch: ReportBatch) -> Result<()> {
        Ok(())
    }

    fn send_interrogation_term(&self, _qualifier: u8) -> Result<()> {
        Ok(())
    }

    fn send_read_response(&self, _ioa: u32, _response: Option<Report>) -> Result<()> {
        Ok(())
    }

    fn send_clock_sync_ack(&self, _time: SystemTime) -> Result<()> {
        Ok(())
    }
}

/// Everything a [`RecordingLink`] captures, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkRecord {
    Report(Report),
    CommandAck(CommandAck),
    InterrogationAck { qualifier: u8, negative: bool },
    InterrogationBatch(ReportBatch),
    InterrogationTerm { qualifier: u8 },
    ReadResponse { ioa: u32, response: Option<Report> },
    ClockSyncAck,
}

/// A link that records outbound traffic. Used by the crate's own tests and
/// useful for testing code built on the simulator.
#[derive(Debug, Default)]
pub struct RecordingLink {
    records: std::sync::Mutex<Vec<LinkRecord>>,
    started: std::sync::atomic::AtomicUsize,
    stopped: std::sync::atomic::AtomicUsize,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: LinkRecord) {
        self.records.lock().expect("recording link poisoned").push(record);
    }

    /// All captured records, in order.
    pub fn records(&self) -> Vec<LinkRecord> {
        self.records.lock().expect("recording link poisoned").clone()
    }

    /// Captured spontaneous reports only.
    pub fn reports(&self) -> Vec<Report> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                LinkRecord::Report(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    /// How many times `start` was called.
    pub fn start_count(&self) -> usize {
        self.started.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// How many times `stop` was called.
    pub fn stop_count(&self) -> usize {
        self.stopped.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Drop all captured records.
    pub fn clear(&self) {
        self.records.lock().expect("recording link poisoned").clear();
    }
}

impl ProtocolLink for RecordingLink {
    fn start(&self) -> Result<()> {
        self.started.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn enqueue_report(&self, report: Report) -> Result<()> {
        self.push(LinkRecord::Report(report));
        Ok(())
    }

    fn send_command_ack(&self, ack: CommandAck) -> Result<()> {
        self.push(LinkRecord::CommandAck(ack));
        Ok(())
    }

    fn send_interrogation_ack(&self, qualifier: u8, negative: bool) -> Result<()> {
        self.push(LinkRecord::InterrogationAck { qualifier, negative });
        Ok(())
    }

    fn send_interrogation_batch(&self, batch: ReportBatch) -> Result<()> {
        self.push(LinkRecord::InterrogationBatch(batch));
        Ok(())
    }

    fn send_interrogation_term(&self, qualifier: u8) -> Result<()> {
        self.push(LinkRecord::InterrogationTerm { qualifier });
        Ok(())
    }

    fn send_read_response(&self, ioa: u32, response: Option<Report>) -> Result<()> {
        self.push(LinkRecord::ReadResponse { ioa, response });
        Ok(())
    }

    fn send_clock_sync_ack(&self, _time: SystemTime) -> Result<()> {
        self.push(LinkRecord::ClockSyncAck);
        Ok(())
    }
}
