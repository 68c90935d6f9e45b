//! Floating-point APR curve, used for display and simulation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AprError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// APR curve in deposit units and percent.
///
/// At or below `low_threshold` the pool pays `max_apr`; at or above
/// `high_threshold` it pays `min_apr`; in between the rate falls linearly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AprCurve {
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub min_apr: f64,
    pub max_apr: f64,
}

impl Default for AprCurve {
    fn default() -> Self {
        Self {
            low_threshold: 10_000.0,
            high_threshold: 100_000.0,
            min_apr: 10.0,
            max_apr: 30.0,
        }
    }
}

impl AprCurve {
    /// Build a curve, rejecting parameters that `interpolate` would refuse.
    pub fn new(
        low_threshold: f64,
        high_threshold: f64,
        min_apr: f64,
        max_apr: f64,
    ) -> Result<Self, AprError> {
        let curve = Self {
            low_threshold,
            high_threshold,
            min_apr,
            max_apr,
        };
        curve.validate()?;
        Ok(curve)
    }

    pub fn validate(&self) -> Result<(), AprError> {
        let fields = [
            ("low_threshold", self.low_threshold),
            ("high_threshold", self.high_threshold),
            ("min_apr", self.min_apr),
            ("max_apr", self.max_apr),
        ];
        if let Some((name, v)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AprError::InvalidConfiguration(format!(
                "{} is not finite ({})",
                name, v
            )));
        }
        if self.high_threshold <= self.low_threshold {
            return Err(AprError::InvalidConfiguration(format!(
                "high_threshold ({}) must be greater than low_threshold ({})",
                self.high_threshold, self.low_threshold
            )));
        }
        if self.min_apr > self.max_apr {
            return Err(AprError::InvalidConfiguration(format!(
                "min_apr ({}) must not exceed max_apr ({})",
                self.min_apr, self.max_apr
            )));
        }
        Ok(())
    }

    /// APR (percent) paid at `deposit_amount`. See [`interpolate`].
    pub fn apr_at(&self, deposit_amount: f64) -> Result<f64, AprError> {
        interpolate(deposit_amount, self)
    }
}

/// Map a deposit total to an APR percentage in `[min_apr, max_apr]`.
pub fn interpolate(deposit_amount: f64, curve: &AprCurve) -> Result<f64, AprError> {
    curve.validate()?;
    if !deposit_amount.is_finite() || deposit_amount < 0.0 {
        return Err(AprError::InvalidInput(format!(
            "deposit amount must be a non-negative number, got {}",
            deposit_amount
        )));
    }
    if deposit_amount <= curve.low_threshold {
        return Ok(curve.max_apr);
    }
    if deposit_amount >= curve.high_threshold {
        return Ok(curve.min_apr);
    }
    let ratio = (deposit_amount - curve.low_threshold)
        / (curve.high_threshold - curve.low_threshold);
    let apr = curve.max_apr - ratio * (curve.max_apr - curve.min_apr);
    Ok(apr.clamp(curve.min_apr, curve.max_apr))
}
