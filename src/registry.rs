//! IOA registry.
//!
//! Single source of truth for what protocol-visible value each information
//! object address currently holds. All value mutation funnels through
//! [`IoaRegistry::update_value`], which applies clamping and quantization and
//! decides whether a spontaneous report is due.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RtuSimError};
use crate::link::{Report, ReportBatch};
use crate::types::{
    decimal_places, quantize_to_step, round_decimals, Ioa, PointKind, PointValue,
};

/// Binding from a command point to the domain entity it controls.
///
/// An explicit tagged binding instead of stored callbacks: the bridge worker
/// interprets it against the entity store, so command handling stays on one
/// serialized path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBinding {
    /// Single command: open the breaker
    BreakerOpen { entity_id: String },
    /// Single command: close the breaker
    BreakerClose { entity_id: String },
    /// Double command: Off=open, On=close
    BreakerDouble { entity_id: String },
    /// Double command: Off=lower, On=raise
    TapRaiseLower { entity_id: String },
    /// Single command: automatic regulation on/off
    TapAutoManual { entity_id: String },
}

impl CommandBinding {
    /// Id of the entity this command operates on.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::BreakerOpen { entity_id }
            | Self::BreakerClose { entity_id }
            | Self::BreakerDouble { entity_id }
            | Self::TapRaiseLower { entity_id }
            | Self::TapAutoManual { entity_id } => entity_id,
        }
    }
}

/// Registry entry for one protocol point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDescriptor {
    pub ioa: Ioa,
    pub kind: PointKind,
    pub value: PointValue,
    /// Report to the protocol stack on every change
    pub spontaneous: bool,
    /// Inbound command handling, present on command points
    pub command: Option<CommandBinding>,
    /// Two-phase select-before-operate required on this command point
    pub select_before_operate: bool,
    pub auto_mode: bool,
    /// Engineering-unit bounds for measurements
    pub min_value: f64,
    pub max_value: f64,
    /// Quantization step, > 0
    pub scale_factor: f64,
    pub update_interval_secs: u64,
    /// Report with the time-tagged type variant
    pub time_tagged: bool,
}

impl PointDescriptor {
    /// Create a descriptor with neutral defaults.
    pub fn new(ioa: Ioa, kind: PointKind, value: PointValue) -> Self {
        Self {
            ioa,
            kind,
            value,
            spontaneous: false,
            command: None,
            select_before_operate: false,
            auto_mode: false,
            min_value: 0.0,
            max_value: 1.0,
            scale_factor: 1.0,
            update_interval_secs: 0,
            time_tagged: false,
        }
    }

    /// Enable spontaneous reporting.
    pub fn spontaneous(mut self, on: bool) -> Self {
        self.spontaneous = on;
        self
    }

    /// Attach a command binding.
    pub fn command(mut self, binding: CommandBinding) -> Self {
        self.command = Some(binding);
        self
    }

    /// Require select-before-operate.
    pub fn sbo(mut self, on: bool) -> Self {
        self.select_before_operate = on;
        self
    }

    /// Set engineering bounds.
    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    /// Set the quantization step.
    pub fn scale(mut self, factor: f64) -> Self {
        self.scale_factor = factor;
        self
    }

    /// Enable autonomous simulation with the given interval.
    pub fn auto(mut self, interval_secs: u64) -> Self {
        self.auto_mode = true;
        self.update_interval_secs = interval_secs;
        self
    }

    /// Report with the time-tagged type variant.
    pub fn time_tagged(mut self, on: bool) -> Self {
        self.time_tagged = on;
        self
    }

    /// Spontaneous report carrying the current value.
    pub fn report(&self) -> Report {
        Report {
            ioa: self.ioa,
            kind: self.kind,
            value: self.value,
            time_tagged: self.time_tagged,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.value.matches_kind(self.kind) {
            return Err(RtuSimError::validation(format!(
                "IOA {}: value {:?} illegal for {}",
                self.ioa, self.value, self.kind
            )));
        }
        if !(self.scale_factor > 0.0) {
            return Err(RtuSimError::validation(format!(
                "IOA {}: scale_factor must be > 0",
                self.ioa
            )));
        }
        if self.command.is_some() && !self.kind.is_command() {
            return Err(RtuSimError::validation(format!(
                "IOA {}: command binding on non-command point {}",
                self.ioa, self.kind
            )));
        }
        Ok(())
    }
}

/// Per-IOA summary synthesized from the live registry for new observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSummary {
    pub ioa: Ioa,
    pub kind: PointKind,
    pub value: PointValue,
    pub auto_mode: bool,
}

/// Mapping from IOA to point descriptor.
///
/// IOAs are unique across the whole registry; a BTreeMap keeps interrogation
/// batches ordered by ascending address.
#[derive(Debug, Default)]
pub struct IoaRegistry {
    points: BTreeMap<Ioa, PointDescriptor>,
}

impl IoaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a point. Fails without side effects if the IOA is taken.
    pub fn add(&mut self, descriptor: PointDescriptor) -> Result<()> {
        descriptor.validate()?;
        if self.points.contains_key(&descriptor.ioa) {
            return Err(RtuSimError::DuplicateAddress(descriptor.ioa.value()));
        }
        tracing::debug!(ioa = descriptor.ioa.value(), kind = %descriptor.kind, "registering point");
        self.points.insert(descriptor.ioa, descriptor);
        Ok(())
    }

    /// Deregister a point.
    pub fn remove(&mut self, ioa: Ioa) -> Result<PointDescriptor> {
        self.points
            .remove(&ioa)
            .ok_or(RtuSimError::UnknownAddress(ioa.value()))
    }

    pub fn get(&self, ioa: Ioa) -> Option<&PointDescriptor> {
        self.points.get(&ioa)
    }

    pub fn contains(&self, ioa: Ioa) -> bool {
        self.points.contains_key(&ioa)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Look up a point by raw address; 0 and out-of-range addresses map to
    /// the same unknown-address error the protocol answer is built from.
    pub fn lookup(&self, raw_ioa: u32) -> Result<&PointDescriptor> {
        Ioa::new(raw_ioa)
            .ok()
            .and_then(|ioa| self.points.get(&ioa))
            .ok_or(RtuSimError::UnknownAddress(raw_ioa))
    }

    /// Store a new value for a point.
    ///
    /// Returns `Ok(None)` without any side effect when the clamped value
    /// equals the stored one, suppressing redundant spontaneous reports and
    /// broadcasts. Otherwise the value is clamped and quantized per the
    /// descriptor and stored, and a report is returned for the caller to
    /// flush if the point is flagged spontaneous. The caller flushes after
    /// releasing its lock; the registry never talks to the stack itself.
    pub fn update_value(&mut self, ioa: Ioa, new_value: PointValue) -> Result<Option<Report>> {
        let descriptor = self
            .points
            .get_mut(&ioa)
            .ok_or(RtuSimError::UnknownAddress(ioa.value()))?;

        if !new_value.matches_kind(descriptor.kind) {
            return Err(RtuSimError::validation(format!(
                "IOA {}: value {:?} illegal for {}",
                ioa, new_value, descriptor.kind
            )));
        }

        let constrained = constrain(descriptor, new_value);
        if constrained == descriptor.value {
            return Ok(None);
        }

        descriptor.value = constrained;
        Ok(descriptor.spontaneous.then(|| descriptor.report()))
    }

    /// Iterate all descriptors in ascending IOA order.
    pub fn iter(&self) -> impl Iterator<Item = &PointDescriptor> {
        self.points.values()
    }

    /// Per-IOA summaries for a newly connected observer.
    pub fn summaries(&self) -> Vec<PointSummary> {
        self.points
            .values()
            .map(|d| PointSummary {
                ioa: d.ioa,
                kind: d.kind,
                value: d.value,
                auto_mode: d.auto_mode,
            })
            .collect()
    }

    /// Build the general-interrogation response batches.
    ///
    /// One batch per protocol-visible type present in the registry, never
    /// mixing types. Command points are not interrogable. The batch of
    /// time-tagged measurements is always last, immediately before the
    /// terminating marker the caller sends.
    pub fn interrogation_batches(&self) -> Vec<ReportBatch> {
        const PLAIN_ORDER: [PointKind; 4] = [
            PointKind::MeasuredScaled,
            PointKind::SinglePoint,
            PointKind::DoublePoint,
            PointKind::MeasuredFloat,
        ];

        let mut batches = Vec::new();
        for kind in PLAIN_ORDER {
            let points: Vec<_> = self
                .points
                .values()
                .filter(|d| d.kind == kind && !d.time_tagged)
                .map(|d| (d.ioa, d.value))
                .collect();
            if !points.is_empty() {
                batches.push(ReportBatch { kind, time_tagged: false, points });
            }
        }

        let tagged: Vec<_> = self
            .points
            .values()
            .filter(|d| d.kind == PointKind::MeasuredFloat && d.time_tagged)
            .map(|d| (d.ioa, d.value))
            .collect();
        if !tagged.is_empty() {
            batches.push(ReportBatch {
                kind: PointKind::MeasuredFloat,
                time_tagged: true,
                points: tagged,
            });
        }

        batches
    }
}

/// Clamp and quantize a candidate value per its descriptor.
fn constrain(descriptor: &PointDescriptor, value: PointValue) -> PointValue {
    match value {
        PointValue::Single(_) | PointValue::Double(_) => value,
        PointValue::Scaled(raw) => {
            // Raw integers are already in scale-factor steps; clamp to the
            // raw equivalents of the engineering bounds.
            let lo = (descriptor.min_value / descriptor.scale_factor).round() as i16;
            let hi = (descriptor.max_value / descriptor.scale_factor).round() as i16;
            PointValue::Scaled(raw.clamp(lo.min(hi), hi.max(lo)))
        }
        PointValue::Float(v) => {
            let stepped = quantize_to_step(v as f64, descriptor.scale_factor);
            let clamped = stepped.clamp(descriptor.min_value, descriptor.max_value);
            let digits = decimal_places(descriptor.scale_factor);
            PointValue::Float(round_decimals(clamped, digits) as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ioa(v: u32) -> Ioa {
        Ioa::new(v).unwrap()
    }

    fn float_point(addr: u32) -> PointDescriptor {
        PointDescriptor::new(ioa(addr), PointKind::MeasuredFloat, PointValue::Float(0.0))
            .bounds(0.0, 10.0)
            .scale(0.5)
    }

    #[test]
    fn test_add_duplicate_fails_and_preserves_original() {
        let mut reg = IoaRegistry::new();
        reg.add(PointDescriptor::new(
            ioa(100),
            PointKind::SinglePoint,
            PointValue::Single(true),
        ))
        .unwrap();

        let err = reg
            .add(PointDescriptor::new(
                ioa(100),
                PointKind::MeasuredFloat,
                PointValue::Float(3.0),
            ))
            .unwrap_err();
        assert!(matches!(err, RtuSimError::DuplicateAddress(100)));

        // Original descriptor unchanged
        let d = reg.get(ioa(100)).unwrap();
        assert_eq!(d.kind, PointKind::SinglePoint);
        assert_eq!(d.value, PointValue::Single(true));
    }

    #[test]
    fn test_remove_unknown() {
        let mut reg = IoaRegistry::new();
        assert!(matches!(
            reg.remove(ioa(9)).unwrap_err(),
            RtuSimError::UnknownAddress(9)
        ));
    }

    #[test]
    fn test_update_unknown_address() {
        let mut reg = IoaRegistry::new();
        assert!(matches!(
            reg.update_value(ioa(5), PointValue::Single(true)).unwrap_err(),
            RtuSimError::UnknownAddress(5)
        ));
        assert!(matches!(
            reg.lookup(5).unwrap_err(),
            RtuSimError::UnknownAddress(5)
        ));
        assert!(matches!(
            reg.lookup(0).unwrap_err(),
            RtuSimError::UnknownAddress(0)
        ));
    }

    #[test]
    fn test_update_equal_value_is_noop() {
        let mut reg = IoaRegistry::new();
        reg.add(
            PointDescriptor::new(ioa(1), PointKind::SinglePoint, PointValue::Single(false))
                .spontaneous(true),
        )
        .unwrap();

        // Same value: no report even though the point is spontaneous
        assert!(reg.update_value(ioa(1), PointValue::Single(false)).unwrap().is_none());
        // Changed value: report due
        let report = reg.update_value(ioa(1), PointValue::Single(true)).unwrap().unwrap();
        assert_eq!(report.value, PointValue::Single(true));
        assert_eq!(report.kind, PointKind::SinglePoint);
    }

    #[test]
    fn test_update_without_spontaneous_flag_yields_no_report() {
        let mut reg = IoaRegistry::new();
        reg.add(PointDescriptor::new(
            ioa(1),
            PointKind::SinglePoint,
            PointValue::Single(false),
        ))
        .unwrap();
        assert!(reg.update_value(ioa(1), PointValue::Single(true)).unwrap().is_none());
        assert_eq!(reg.get(ioa(1)).unwrap().value, PointValue::Single(true));
    }

    #[test]
    fn test_float_quantization_and_clamping() {
        let mut reg = IoaRegistry::new();
        reg.add(float_point(10)).unwrap();

        reg.update_value(ioa(10), PointValue::Float(3.26)).unwrap();
        assert_eq!(reg.get(ioa(10)).unwrap().value, PointValue::Float(3.5));

        reg.update_value(ioa(10), PointValue::Float(11.7)).unwrap();
        assert_eq!(reg.get(ioa(10)).unwrap().value, PointValue::Float(10.0));

        reg.update_value(ioa(10), PointValue::Float(-2.0)).unwrap();
        assert_eq!(reg.get(ioa(10)).unwrap().value, PointValue::Float(0.0));
    }

    #[test]
    fn test_float_values_stay_on_grid() {
        let mut reg = IoaRegistry::new();
        reg.add(float_point(10)).unwrap();

        for candidate in [0.1, 1.74, 5.5, 9.99, 3.141] {
            reg.update_value(ioa(10), PointValue::Float(candidate)).unwrap();
            let PointValue::Float(v) = reg.get(ioa(10)).unwrap().value else {
                panic!("kind changed");
            };
            let doubled = (v as f64) * 2.0;
            assert!(
                (doubled - doubled.round()).abs() < 1e-6,
                "{v} is not a multiple of 0.5"
            );
            assert!((0.0..=10.0).contains(&(v as f64)));
        }
    }

    #[test]
    fn test_scaled_clamping() {
        let mut reg = IoaRegistry::new();
        reg.add(
            PointDescriptor::new(ioa(20), PointKind::MeasuredScaled, PointValue::Scaled(0))
                .bounds(0.0, 100.0)
                .scale(1.0),
        )
        .unwrap();

        reg.update_value(ioa(20), PointValue::Scaled(250)).unwrap();
        assert_eq!(reg.get(ioa(20)).unwrap().value, PointValue::Scaled(100));

        reg.update_value(ioa(20), PointValue::Scaled(-5)).unwrap();
        assert_eq!(reg.get(ioa(20)).unwrap().value, PointValue::Scaled(0));
    }

    #[test]
    fn test_update_kind_mismatch() {
        let mut reg = IoaRegistry::new();
        reg.add(float_point(10)).unwrap();
        assert!(matches!(
            reg.update_value(ioa(10), PointValue::Single(true)).unwrap_err(),
            RtuSimError::Validation(_)
        ));
    }

    #[test]
    fn test_command_binding_requires_command_kind() {
        let mut reg = IoaRegistry::new();
        let bad = PointDescriptor::new(ioa(1), PointKind::SinglePoint, PointValue::Single(false))
            .command(CommandBinding::BreakerOpen { entity_id: "cb".into() });
        assert!(reg.add(bad).is_err());

        let good =
            PointDescriptor::new(ioa(1), PointKind::SingleCommand, PointValue::Single(false))
                .command(CommandBinding::BreakerOpen { entity_id: "cb".into() });
        assert!(reg.add(good).is_ok());
    }

    #[test]
    fn test_interrogation_batches_group_by_kind() {
        let mut reg = IoaRegistry::new();
        reg.add(PointDescriptor::new(
            ioa(1),
            PointKind::SinglePoint,
            PointValue::Single(true),
        ))
        .unwrap();
        reg.add(PointDescriptor::new(
            ioa(2),
            PointKind::SinglePoint,
            PointValue::Single(false),
        ))
        .unwrap();
        reg.add(
            PointDescriptor::new(ioa(3), PointKind::MeasuredScaled, PointValue::Scaled(7))
                .bounds(0.0, 100.0),
        )
        .unwrap();
        // Command points never show up in GI responses
        reg.add(PointDescriptor::new(
            ioa(4),
            PointKind::SingleCommand,
            PointValue::Single(false),
        ))
        .unwrap();

        let batches = reg.interrogation_batches();
        assert_eq!(batches.len(), 2);
        let scaled = batches.iter().find(|b| b.kind == PointKind::MeasuredScaled).unwrap();
        assert_eq!(scaled.points, vec![(ioa(3), PointValue::Scaled(7))]);
        let single = batches.iter().find(|b| b.kind == PointKind::SinglePoint).unwrap();
        assert_eq!(single.points.len(), 2);
    }

    #[test]
    fn test_interrogation_time_tagged_batch_is_last() {
        let mut reg = IoaRegistry::new();
        reg.add(
            PointDescriptor::new(ioa(1), PointKind::MeasuredFloat, PointValue::Float(1.0))
                .bounds(0.0, 10.0)
                .time_tagged(true),
        )
        .unwrap();
        reg.add(PointDescriptor::new(
            ioa(2),
            PointKind::SinglePoint,
            PointValue::Single(true),
        ))
        .unwrap();
        reg.add(
            PointDescriptor::new(ioa(3), PointKind::MeasuredFloat, PointValue::Float(2.0))
                .bounds(0.0, 10.0),
        )
        .unwrap();

        let batches = reg.interrogation_batches();
        assert_eq!(batches.len(), 3);
        let last = batches.last().unwrap();
        assert!(last.time_tagged);
        assert_eq!(last.kind, PointKind::MeasuredFloat);
        assert_eq!(last.points, vec![(ioa(1), PointValue::Float(1.0))]);
    }

    #[test]
    fn test_summaries_reflect_live_registry() {
        let mut reg = IoaRegistry::new();
        reg.add(
            PointDescriptor::new(ioa(8), PointKind::MeasuredFloat, PointValue::Float(4.5))
                .bounds(0.0, 10.0)
                .scale(0.5)
                .auto(2),
        )
        .unwrap();

        let summaries = reg.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].ioa, ioa(8));
        assert_eq!(summaries[0].kind, PointKind::MeasuredFloat);
        assert_eq!(summaries[0].value, PointValue::Float(4.5));
        assert!(summaries[0].auto_mode);
    }
}
