//! Domain entity records.
//!
//! Circuit breakers, telesignals, telemetries and tap changers, each
//! cross-referencing one or more IOAs in the registry. Records are plain
//! serde structs so they can be exported and re-imported keyed by entity id.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RtuSimError};
use crate::types::point::{DoublePointState, Ioa};

/// Local/remote operating mode of a controllable entity.
///
/// Execute commands are refused while the entity is in `Local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalRemote {
    Local,
    Remote,
}

impl LocalRemote {
    /// Single-point representation: true when remote.
    #[inline]
    pub const fn as_bool(self) -> bool {
        matches!(self, Self::Remote)
    }
}

impl Default for LocalRemote {
    fn default() -> Self {
        Self::Remote
    }
}

/// Circuit breaker with open/close status and control points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub id: String,
    pub name: String,
    /// Single-point status: breaker is open
    pub ioa_status_open: Ioa,
    /// Single-point status: breaker is closed
    pub ioa_status_close: Ioa,
    /// Single command: open the breaker
    pub ioa_control_open: Ioa,
    /// Single command: close the breaker
    pub ioa_control_close: Ioa,
    /// Single-point status: local/remote mode
    pub ioa_local_remote: Ioa,
    /// Double-point status, present iff `has_double_point`
    #[serde(default)]
    pub ioa_status_dp: Option<Ioa>,
    /// Double command, present iff `has_double_point`
    #[serde(default)]
    pub ioa_control_dp: Option<Ioa>,
    #[serde(default)]
    pub has_double_point: bool,
    /// Select-before-operate required on the control points
    #[serde(default)]
    pub select_before_operate: bool,
    /// Current position: true when closed
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub local_remote: LocalRemote,
}

impl CircuitBreaker {
    /// Double-point position feedback for the current state.
    #[inline]
    pub fn position(&self) -> DoublePointState {
        if self.closed {
            DoublePointState::On
        } else {
            DoublePointState::Off
        }
    }

    /// All IOAs owned by this breaker.
    pub fn referenced_ioas(&self) -> Vec<Ioa> {
        let mut ioas = vec![
            self.ioa_status_open,
            self.ioa_status_close,
            self.ioa_control_open,
            self.ioa_control_close,
            self.ioa_local_remote,
        ];
        ioas.extend(self.ioa_status_dp);
        ioas.extend(self.ioa_control_dp);
        ioas
    }

    /// Monitoring-direction IOAs watched by the change detector.
    pub fn status_ioas(&self) -> Vec<Ioa> {
        let mut ioas = vec![
            self.ioa_status_open,
            self.ioa_status_close,
            self.ioa_local_remote,
        ];
        ioas.extend(self.ioa_status_dp);
        ioas
    }

    /// Check field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RtuSimError::validation("circuit breaker id is empty"));
        }
        if self.has_double_point {
            if self.ioa_status_dp.is_none() || self.ioa_control_dp.is_none() {
                return Err(RtuSimError::validation(format!(
                    "breaker {}: has_double_point set but double-point IOAs missing",
                    self.id
                )));
            }
        } else if self.ioa_status_dp.is_some() || self.ioa_control_dp.is_some() {
            return Err(RtuSimError::validation(format!(
                "breaker {}: double-point IOAs given without has_double_point",
                self.id
            )));
        }
        Ok(())
    }
}

/// Single-point telesignal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleSignal {
    pub id: String,
    pub name: String,
    pub ioa: Ioa,
    #[serde(default)]
    pub value: bool,
    /// Autonomous simulation enabled. Defaults to false: nothing moves
    /// until explicitly enabled.
    #[serde(default)]
    pub auto_mode: bool,
    #[serde(default = "default_interval")]
    pub update_interval_secs: u64,
}

impl TeleSignal {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RtuSimError::validation("telesignal id is empty"));
        }
        if self.update_interval_secs == 0 {
            return Err(RtuSimError::validation(format!(
                "telesignal {}: update interval must be >= 1s",
                self.id
            )));
        }
        Ok(())
    }
}

/// Measured-value telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub id: String,
    pub name: String,
    pub ioa: Ioa,
    /// Engineering value
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    pub min_value: f64,
    pub max_value: f64,
    pub scale_factor: f64,
    #[serde(default)]
    pub auto_mode: bool,
    #[serde(default = "default_interval")]
    pub update_interval_secs: u64,
    /// Report with the CP56Time2a type variant. Only float-backed
    /// telemetries support this.
    #[serde(default)]
    pub time_tagged: bool,
}

impl Telemetry {
    /// Whether this telemetry is backed by an integer-scaled point.
    ///
    /// `scale_factor >= 1` stores `value / scale_factor` as an integer;
    /// finer factors use a native short-float point for precision.
    #[inline]
    pub fn is_integer_scaled(&self) -> bool {
        self.scale_factor >= 1.0
    }

    /// Raw integer representation for integer-scaled points.
    #[inline]
    pub fn raw_value(&self) -> i16 {
        (self.value / self.scale_factor).round() as i16
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RtuSimError::validation("telemetry id is empty"));
        }
        if !(self.scale_factor > 0.0) {
            return Err(RtuSimError::validation(format!(
                "telemetry {}: scale_factor must be > 0",
                self.id
            )));
        }
        if self.min_value >= self.max_value {
            return Err(RtuSimError::validation(format!(
                "telemetry {}: min_value must be below max_value",
                self.id
            )));
        }
        if self.update_interval_secs == 0 {
            return Err(RtuSimError::validation(format!(
                "telemetry {}: update interval must be >= 1s",
                self.id
            )));
        }
        if self.time_tagged && self.is_integer_scaled() {
            return Err(RtuSimError::validation(format!(
                "telemetry {}: time tagging requires a float-backed point (scale_factor < 1)",
                self.id
            )));
        }
        Ok(())
    }
}

/// On-load tap changer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapChanger {
    pub id: String,
    pub name: String,
    /// Scaled measurement: tap position
    pub ioa_position: Ioa,
    /// Double-point status: last movement (Off=lower, On=raise)
    pub ioa_status_raise_lower: Ioa,
    /// Double command: raise/lower
    pub ioa_command_raise_lower: Ioa,
    /// Single-point status: automatic regulation active
    pub ioa_status_auto_manual: Ioa,
    /// Single command: switch automatic regulation
    pub ioa_command_auto_manual: Ioa,
    /// Single-point status: local/remote mode
    pub ioa_local_remote: Ioa,
    #[serde(default)]
    pub position: i16,
    pub min_position: i16,
    pub max_position: i16,
    /// Automatic regulation status (the auto/manual status point)
    #[serde(default)]
    pub automatic: bool,
    #[serde(default)]
    pub last_movement: Option<DoublePointState>,
    #[serde(default)]
    pub local_remote: LocalRemote,
}

impl TapChanger {
    pub fn referenced_ioas(&self) -> Vec<Ioa> {
        vec![
            self.ioa_position,
            self.ioa_status_raise_lower,
            self.ioa_command_raise_lower,
            self.ioa_status_auto_manual,
            self.ioa_command_auto_manual,
            self.ioa_local_remote,
        ]
    }

    /// Monitoring-direction IOAs watched by the change detector.
    pub fn status_ioas(&self) -> Vec<Ioa> {
        vec![
            self.ioa_position,
            self.ioa_status_raise_lower,
            self.ioa_status_auto_manual,
            self.ioa_local_remote,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RtuSimError::validation("tap changer id is empty"));
        }
        if self.min_position >= self.max_position {
            return Err(RtuSimError::validation(format!(
                "tap changer {}: min_position must be below max_position",
                self.id
            )));
        }
        if self.position < self.min_position || self.position > self.max_position {
            return Err(RtuSimError::validation(format!(
                "tap changer {}: position {} outside {}..={}",
                self.id, self.position, self.min_position, self.max_position
            )));
        }
        Ok(())
    }
}

fn default_interval() -> u64 {
    5
}

/// Full snapshot of every entity category.
///
/// This is both the observer snapshot-on-subscribe payload and the
/// export/import wire format.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulatorSnapshot {
    #[serde(default)]
    pub circuit_breakers: Vec<CircuitBreaker>,
    #[serde(default)]
    pub tele_signals: Vec<TeleSignal>,
    #[serde(default)]
    pub telemetries: Vec<Telemetry>,
    #[serde(default)]
    pub tap_changers: Vec<TapChanger>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ioa(v: u32) -> Ioa {
        Ioa::new(v).unwrap()
    }

    pub(crate) fn sample_breaker(id: &str) -> CircuitBreaker {
        CircuitBreaker {
            id: id.to_string(),
            name: "BRK-1".to_string(),
            ioa_status_open: ioa(100),
            ioa_status_close: ioa(101),
            ioa_control_open: ioa(5000),
            ioa_control_close: ioa(5001),
            ioa_local_remote: ioa(102),
            ioa_status_dp: None,
            ioa_control_dp: None,
            has_double_point: false,
            select_before_operate: false,
            closed: false,
            local_remote: LocalRemote::Remote,
        }
    }

    #[test]
    fn test_breaker_double_point_validation() {
        let mut cb = sample_breaker("cb-1");
        assert!(cb.validate().is_ok());

        cb.has_double_point = true;
        assert!(cb.validate().is_err());

        cb.ioa_status_dp = Some(ioa(110));
        cb.ioa_control_dp = Some(ioa(5010));
        assert!(cb.validate().is_ok());

        cb.has_double_point = false;
        assert!(cb.validate().is_err());
    }

    #[test]
    fn test_breaker_referenced_ioas() {
        let mut cb = sample_breaker("cb-1");
        assert_eq!(cb.referenced_ioas().len(), 5);

        cb.has_double_point = true;
        cb.ioa_status_dp = Some(ioa(110));
        cb.ioa_control_dp = Some(ioa(5010));
        assert_eq!(cb.referenced_ioas().len(), 7);
        assert_eq!(cb.status_ioas().len(), 4);
    }

    #[test]
    fn test_breaker_position() {
        let mut cb = sample_breaker("cb-1");
        assert_eq!(cb.position(), DoublePointState::Off);
        cb.closed = true;
        assert_eq!(cb.position(), DoublePointState::On);
    }

    #[test]
    fn test_telemetry_representation_choice() {
        let mut tm = Telemetry {
            id: "tm-1".to_string(),
            name: "Feeder current".to_string(),
            ioa: ioa(200),
            value: 57.0,
            unit: "A".to_string(),
            min_value: 0.0,
            max_value: 100.0,
            scale_factor: 1.0,
            auto_mode: false,
            update_interval_secs: 5,
            time_tagged: false,
        };
        assert!(tm.validate().is_ok());
        assert!(tm.is_integer_scaled());
        assert_eq!(tm.raw_value(), 57);

        tm.scale_factor = 0.5;
        assert!(!tm.is_integer_scaled());

        tm.scale_factor = 0.0;
        assert!(tm.validate().is_err());

        tm.scale_factor = 1.0;
        tm.min_value = 100.0;
        assert!(tm.validate().is_err());
    }

    #[test]
    fn test_tap_changer_validation() {
        let mut tc = TapChanger {
            id: "tc-1".to_string(),
            name: "TR-1 OLTC".to_string(),
            ioa_position: ioa(300),
            ioa_status_raise_lower: ioa(301),
            ioa_command_raise_lower: ioa(5300),
            ioa_status_auto_manual: ioa(302),
            ioa_command_auto_manual: ioa(5301),
            ioa_local_remote: ioa(303),
            position: 5,
            min_position: 1,
            max_position: 17,
            automatic: false,
            last_movement: None,
            local_remote: LocalRemote::Remote,
        };
        assert!(tc.validate().is_ok());
        assert_eq!(tc.referenced_ioas().len(), 6);
        assert_eq!(tc.status_ioas().len(), 4);

        tc.position = 0;
        assert!(tc.validate().is_err());
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let snapshot = SimulatorSnapshot {
            circuit_breakers: vec![sample_breaker("cb-1")],
            tele_signals: vec![TeleSignal {
                id: "ts-1".to_string(),
                name: "Door alarm".to_string(),
                ioa: ioa(400),
                value: true,
                auto_mode: true,
                update_interval_secs: 2,
            }],
            telemetries: Vec::new(),
            tap_changers: Vec::new(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SimulatorSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
