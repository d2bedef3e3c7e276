//! Post-processing applied to readings before dispatch

use crate::core::types::RawValue;
use std::collections::BTreeMap;

/// Linear calibration with optional quadratic correction
///
/// `y = (x - zero_offset) * scale_factor`, then `y += nonlinearity * y^2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationModel {
    pub zero_offset: f64,
    pub scale_factor: f64,
    pub nonlinearity: f64,
}

impl CalibrationModel {
    /// Build from `calibration_params`; `None` when no correction keys are present
    pub fn from_params(params: &BTreeMap<String, f64>) -> Option<Self> {
        let has_any = ["zero_offset", "scale_factor", "nonlinearity"]
            .iter()
            .any(|k| params.contains_key(*k));
        if !has_any {
            return None;
        }
        Some(Self {
            zero_offset: params.get("zero_offset").copied().unwrap_or(0.0),
            scale_factor: params.get("scale_factor").copied().unwrap_or(1.0),
            nonlinearity: params.get("nonlinearity").copied().unwrap_or(0.0),
        })
    }

    pub fn apply_scalar(&self, x: f64) -> f64 {
        let y = (x - self.zero_offset) * self.scale_factor;
        if self.nonlinearity != 0.0 {
            y + self.nonlinearity * y * y
        } else {
            y
        }
    }

    pub fn apply(&self, value: &RawValue) -> RawValue {
        value.map(|x| self.apply_scalar(x))
    }
}
