//! Reward projection and APR ladders over the dynamic curve.

use crate::apr::{AprCurve, AprError};
use serde::{Deserialize, Serialize};

pub const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StakeProjection {
    pub pool_total_before: f64,
    pub pool_total_after: f64,
    pub stake: f64,
    pub days: f64,
    pub apr_before_pct: f64,
    pub apr_after_pct: f64,
    /// Simple interest at `apr_after_pct` over `days`.
    pub projected_reward: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LadderRow {
    pub deposit: f64,
    pub apr_pct: f64,
}

fn non_negative(name: &str, v: f64) -> Result<f64, AprError> {
    if !v.is_finite() || v < 0.0 {
        return Err(AprError::InvalidInput(format!(
            "{} must be a non-negative number, got {}",
            name, v
        )));
    }
    Ok(v)
}

/// Project what a new stake earns once it joins the pool.
///
/// The stake itself moves the pool along the curve, so the rate is taken at
/// `pool_total + stake`, not at the current total.
pub fn project_stake(
    curve: &AprCurve,
    pool_total: f64,
    stake: f64,
    days: f64,
) -> Result<StakeProjection, AprError> {
    curve.validate()?;
    let pool_total = non_negative("pool total", pool_total)?;
    let stake = non_negative("stake", stake)?;
    let days = non_negative("days", days)?;
    let after = pool_total + stake;
    let apr_before_pct = curve.apr_at(pool_total)?;
    let apr_after_pct = curve.apr_at(after)?;
    let projected_reward = stake * (apr_after_pct / 100.0) * (days / DAYS_PER_YEAR);
    Ok(StakeProjection {
        pool_total_before: pool_total,
        pool_total_after: after,
        stake,
        days,
        apr_before_pct,
        apr_after_pct,
        projected_reward,
    })
}

/// `steps + 1` evenly spaced rows from `from` to `to` inclusive.
pub fn apr_ladder(
    curve: &AprCurve,
    from: f64,
    to: f64,
    steps: u32,
) -> Result<Vec<LadderRow>, AprError> {
    curve.validate()?;
    let from = non_negative("from", from)?;
    let to = non_negative("to", to)?;
    if steps == 0 {
        return Err(AprError::InvalidInput("steps must be at least 1".to_string()));
    }
    if to < from {
        return Err(AprError::InvalidInput(format!(
            "ladder end {} is below start {}",
            to, from
        )));
    }
    let width = (to - from) / f64::from(steps);
    (0..=steps)
        .map(|i| {
            // last row lands exactly on `to`
            let deposit = if i == steps {
                to
            } else {
                from + width * f64::from(i)
            };
            Ok(LadderRow {
                deposit,
                apr_pct: curve.apr_at(deposit)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_moves_pool_along_curve() {
        let p = project_stake(&AprCurve::default(), 40_000.0, 15_000.0, 365.0).unwrap();
        assert_eq!(p.pool_total_after, 55_000.0);
        assert!(p.apr_before_pct > p.apr_after_pct);
        assert_eq!(p.apr_after_pct, 20.0);
        assert!((p.projected_reward - 3_000.0).abs() < 1e-9);
    }

    #[test]
    fn zero_days_earns_nothing() {
        let p = project_stake(&AprCurve::default(), 0.0, 1_000.0, 0.0).unwrap();
        assert_eq!(p.apr_after_pct, 30.0);
        assert_eq!(p.projected_reward, 0.0);
    }

    #[test]
    fn projection_rejects_bad_input() {
        let c = AprCurve::default();
        assert!(matches!(
            project_stake(&c, 0.0, -5.0, 30.0),
            Err(AprError::InvalidInput(_))
        ));
        assert!(matches!(
            project_stake(&c, 0.0, 5.0, f64::NAN),
            Err(AprError::InvalidInput(_))
        ));
    }

    #[test]
    fn ladder_spans_curve() {
        let rows = apr_ladder(&AprCurve::default(), 0.0, 120_000.0, 12).unwrap();
        assert_eq!(rows.len(), 13);
        assert_eq!(rows[0].apr_pct, 30.0);
        assert_eq!(rows[12].deposit, 120_000.0);
        assert_eq!(rows[12].apr_pct, 10.0);
        assert!(rows.windows(2).all(|w| w[0].apr_pct >= w[1].apr_pct));
    }

    #[test]
    fn ladder_rejects_bad_range() {
        let c = AprCurve::default();
        assert!(apr_ladder(&c, 0.0, 10.0, 0).is_err());
        assert!(apr_ladder(&c, 10.0, 0.0, 4).is_err());
    }
}
