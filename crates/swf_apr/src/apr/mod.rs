//! Dynamic APR curve: piecewise-linear interpolation between a ceiling and a floor rate.

mod bps;
mod curve;

pub use bps::{BpsCurve, BPS_PER_PERCENT};
pub use curve::{interpolate, AprCurve, AprError};
