//! Fixed-point APR curve: whole-token thresholds and basis-point rates.
//!
//! Integer arithmetic mirrors the on-chain controller: the interpolated
//! discount is truncated before it is subtracted from the ceiling rate.

use crate::apr::curve::{AprCurve, AprError};
use serde::{Deserialize, Serialize};

pub const BPS_PER_PERCENT: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BpsCurve {
    pub low_threshold: u64,
    pub high_threshold: u64,
    pub min_apr_bps: u32,
    pub max_apr_bps: u32,
}

impl BpsCurve {
    pub fn new(
        low_threshold: u64,
        high_threshold: u64,
        min_apr_bps: u32,
        max_apr_bps: u32,
    ) -> Result<Self, AprError> {
        let curve = Self {
            low_threshold,
            high_threshold,
            min_apr_bps,
            max_apr_bps,
        };
        curve.validate()?;
        Ok(curve)
    }

    /// Convert a percent curve: thresholds truncated to whole tokens, rates rounded to the nearest bp.
    pub fn from_percent(curve: &AprCurve) -> Result<Self, AprError> {
        curve.validate()?;
        if curve.low_threshold < 0.0 || curve.min_apr < 0.0 {
            return Err(AprError::InvalidConfiguration(
                "fixed-point curve needs non-negative thresholds and rates".to_string(),
            ));
        }
        let to_bps = |pct: f64| -> Result<u32, AprError> {
            let bps = (pct * f64::from(BPS_PER_PERCENT)).round();
            if bps > f64::from(u32::MAX) {
                return Err(AprError::InvalidConfiguration(format!(
                    "rate {}% does not fit in basis points",
                    pct
                )));
            }
            Ok(bps as u32)
        };
        if curve.high_threshold >= u64::MAX as f64 {
            return Err(AprError::InvalidConfiguration(format!(
                "high_threshold {} does not fit in whole tokens",
                curve.high_threshold
            )));
        }
        Self::new(
            curve.low_threshold.trunc() as u64,
            curve.high_threshold.trunc() as u64,
            to_bps(curve.min_apr)?,
            to_bps(curve.max_apr)?,
        )
    }

    pub fn validate(&self) -> Result<(), AprError> {
        if self.high_threshold <= self.low_threshold {
            return Err(AprError::InvalidConfiguration(format!(
                "high_threshold ({}) must be greater than low_threshold ({})",
                self.high_threshold, self.low_threshold
            )));
        }
        if self.min_apr_bps > self.max_apr_bps {
            return Err(AprError::InvalidConfiguration(format!(
                "min_apr_bps ({}) must not exceed max_apr_bps ({})",
                self.min_apr_bps, self.max_apr_bps
            )));
        }
        Ok(())
    }

    /// APR in basis points at `deposit_tokens` (whole tokens).
    pub fn apr_bps(&self, deposit_tokens: u64) -> Result<u32, AprError> {
        self.validate()?;
        if deposit_tokens <= self.low_threshold {
            return Ok(self.max_apr_bps);
        }
        if deposit_tokens >= self.high_threshold {
            return Ok(self.min_apr_bps);
        }
        let progressed = u128::from(deposit_tokens - self.low_threshold);
        let range = u128::from(self.high_threshold - self.low_threshold);
        let spread = u128::from(self.max_apr_bps - self.min_apr_bps);
        // progressed < range, so the discount is strictly below spread and fits in u32
        let discount = (progressed * spread / range) as u32;
        Ok(self.max_apr_bps - discount)
    }
}
