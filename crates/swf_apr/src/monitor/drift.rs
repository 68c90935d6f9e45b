//! Compare the controller's published APR against the curve.

use crate::apr::{AprError, BpsCurve};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub total_deposits_tokens: u64,
    pub expected_bps: u32,
    pub onchain_bps: u32,
    /// `onchain_bps - expected_bps`.
    pub delta_bps: i64,
    pub within_tolerance: bool,
}

pub fn check_drift(
    curve: &BpsCurve,
    total_deposits_tokens: u64,
    onchain_bps: u32,
    tolerance_bps: u32,
) -> Result<DriftReport, AprError> {
    let expected_bps = curve.apr_bps(total_deposits_tokens)?;
    let delta_bps = i64::from(onchain_bps) - i64::from(expected_bps);
    Ok(DriftReport {
        total_deposits_tokens,
        expected_bps,
        onchain_bps,
        delta_bps,
        within_tolerance: delta_bps.unsigned_abs() <= u64::from(tolerance_bps),
    })
}
