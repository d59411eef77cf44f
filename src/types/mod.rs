//! Core type definitions.
//!
//! - `Ioa`, `PointKind`, `PointValue` - protocol point vocabulary
//! - `CircuitBreaker`, `TeleSignal`, `Telemetry`, `TapChanger` - domain
//!   entities
//! - `SimulatorSnapshot` - whole-station snapshot / export payload

mod entity;
mod point;

pub use entity::*;
pub use point::*;
