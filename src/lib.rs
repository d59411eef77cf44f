//! # voltage_rtu_sim
//!
//! Substation RTU point simulator core for IEC 60870-5-104 slaves.
//!
//! This crate models substation equipment (circuit breakers, telesignals,
//! telemetries, tap changers) as addressable protocol points and keeps the
//! equipment state, the point table and connected observers synchronized.
//! The IEC 104 engine itself (framing, sequencing, timers) is an external
//! collaborator wired in through two narrow seams.
//!
//! ## Features
//!
//! - **IOA Registry**: Single point table mapping information object
//!   addresses to typed values, with quantization and bounds on write
//! - **Command Bridge**: Serialized handling of inbound commands with
//!   select-before-operate, kind checking and local/remote interlocks
//! - **Autonomous Simulation**: Per-entity random walks on individual
//!   update intervals
//! - **Observer Feed**: Whole-collection change events with snapshot
//!   resynchronization for late subscribers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voltage_rtu_sim::{NullLink, RtuSimulator, SimulatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> voltage_rtu_sim::Result<()> {
//!     // NullLink stands in for the real IEC 104 slave stack
//!     let mut sim = RtuSimulator::new(Arc::new(NullLink), SimulatorConfig::new());
//!     sim.start()?;
//!
//!     // The stack calls its callbacks through this handle
//!     let inbound = sim.inbound();
//!
//!     // Observers resynchronize from the snapshot, then follow events
//!     let (snapshot, points, mut events) = sim.subscribe().await;
//!     println!("{} points registered", points.len());
//!     while let Ok(event) = events.recv().await {
//!         println!("changed: {:?}", event.category());
//!     }
//!
//!     sim.shutdown().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bridge;
pub mod broadcast;
pub mod core;
pub mod error;
pub mod link;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;

mod simulation;

// Re-export main types
pub use bridge::{FeedbackPolicy, InboundEvent, ProtocolInbound, QOI_STATION};
pub use broadcast::ObserverEvent;
pub use error::{Result, RtuSimError};
pub use link::{
    AckResult, CommandAck, ConnectionEvent, LinkRecord, NullLink, ProtocolLink, RecordingLink,
    Report, ReportBatch,
};
pub use registry::{CommandBinding, IoaRegistry, PointDescriptor, PointSummary};
pub use server::{RtuSimulator, SimulatorConfig};
pub use store::{EntityCategory, EntityStore};
pub use types::*;
