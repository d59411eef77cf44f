//! Protocol point types.
//!
//! This module defines the vocabulary shared by the IOA registry and the
//! protocol-stack boundary: point classification, value variants and the
//! four-state double point.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RtuSimError};

/// Maximum information object address (3 bytes on the wire).
pub const MAX_IOA: u32 = 0x00FF_FFFF;

/// Information Object Address (IOA).
///
/// Protocol-level unique identifier of a data point, 1..=2^24-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ioa(u32);

impl Ioa {
    /// Create an IOA, validating the 24-bit range.
    #[inline]
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 || value > MAX_IOA {
            return Err(RtuSimError::validation(format!(
                "IOA {value} outside 1..={MAX_IOA}"
            )));
        }
        Ok(Self(value))
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Ioa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Ioa {
    type Error = RtuSimError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

/// Protocol point classification.
///
/// An explicit tagged classification rather than reusing wire type codes as
/// map keys; `type_code()` gives the IEC 60870-5-101 type identification the
/// point is reported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointKind {
    /// Single-point information (M_SP_NA_1)
    SinglePoint,
    /// Double-point information (M_DP_NA_1)
    DoublePoint,
    /// Measured value, scaled (M_ME_NB_1)
    MeasuredScaled,
    /// Measured value, short floating point (M_ME_NC_1)
    MeasuredFloat,
    /// Single command (C_SC_NA_1)
    SingleCommand,
    /// Double command (C_DC_NA_1)
    DoubleCommand,
}

impl PointKind {
    /// IEC type identification used when reporting this point.
    ///
    /// `time_tagged` selects the CP56Time2a variant where one exists.
    #[inline]
    pub const fn type_code(&self, time_tagged: bool) -> u8 {
        match self {
            Self::SinglePoint => 1,
            Self::DoublePoint => 3,
            Self::MeasuredScaled => 11,
            Self::MeasuredFloat => {
                if time_tagged {
                    36
                } else {
                    13
                }
            }
            Self::SingleCommand => 45,
            Self::DoubleCommand => 46,
        }
    }

    /// Get the IEC standard name (e.g., "M_SP_NA_1").
    #[inline]
    pub const fn standard_name(&self) -> &'static str {
        match self {
            Self::SinglePoint => "M_SP_NA_1",
            Self::DoublePoint => "M_DP_NA_1",
            Self::MeasuredScaled => "M_ME_NB_1",
            Self::MeasuredFloat => "M_ME_NC_1",
            Self::SingleCommand => "C_SC_NA_1",
            Self::DoubleCommand => "C_DC_NA_1",
        }
    }

    /// Check if this kind carries commands (control direction).
    #[inline]
    pub const fn is_command(&self) -> bool {
        matches!(self, Self::SingleCommand | Self::DoubleCommand)
    }

    /// Check if this kind is reported in general-interrogation responses.
    ///
    /// Only monitoring-direction points are; command points never appear in
    /// GI batches.
    #[inline]
    pub const fn is_monitoring(&self) -> bool {
        !self.is_command()
    }
}

impl std::fmt::Display for PointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.standard_name())
    }
}

/// Double-point information value.
///
/// Four states as transmitted in the DPI field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DoublePointState {
    /// Indeterminate or intermediate (00)
    Intermediate = 0,
    /// Determined OFF (01)
    Off = 1,
    /// Determined ON (10)
    On = 2,
    /// Indeterminate or faulty (11)
    Faulty = 3,
}

impl DoublePointState {
    /// Parse from the lower 2 bits.
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Intermediate,
            1 => Self::Off,
            2 => Self::On,
            _ => Self::Faulty,
        }
    }

    /// Convert to the raw 2-bit value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Point value variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    /// Single-point or single-command state
    Single(bool),
    /// Double-point or double-command state
    Double(DoublePointState),
    /// Scaled measurement (raw integer steps)
    Scaled(i16),
    /// Short floating point measurement
    Float(f32),
}

impl PointValue {
    /// Convert to f64 if numeric.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Single(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Double(v) => v.as_u8() as f64,
            Self::Scaled(v) => *v as f64,
            Self::Float(v) => *v as f64,
        }
    }

    /// Convert to bool if this is a two-state value.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Single(v) => Some(*v),
            Self::Double(DoublePointState::On) => Some(true),
            Self::Double(DoublePointState::Off) => Some(false),
            _ => None,
        }
    }

    /// Check that this value shape is legal for a point of `kind`.
    ///
    /// Command points carry the same value shapes as their status
    /// counterparts (single commands a boolean, double commands a DPI state).
    #[inline]
    pub const fn matches_kind(&self, kind: PointKind) -> bool {
        matches!(
            (self, kind),
            (Self::Single(_), PointKind::SinglePoint | PointKind::SingleCommand)
                | (Self::Double(_), PointKind::DoublePoint | PointKind::DoubleCommand)
                | (Self::Scaled(_), PointKind::MeasuredScaled)
                | (Self::Float(_), PointKind::MeasuredFloat)
        )
    }
}

/// Round a value to the nearest multiple of `step`.
#[inline]
pub fn quantize_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}

/// Number of decimal places implied by a scale factor (capped at 6).
///
/// A step of 0.5 implies 1 decimal, 0.25 implies 2, 1.0 implies 0.
pub fn decimal_places(step: f64) -> u32 {
    let mut digits = 0u32;
    let mut s = step.abs();
    while s.fract() > 1e-9 && (1.0 - s.fract()) > 1e-9 && digits < 6 {
        s *= 10.0;
        digits += 1;
    }
    digits
}

/// Round a value to `digits` decimal places.
#[inline]
pub fn round_decimals(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}
