//! Staking simulator: projected APR and rewards for a prospective stake.

mod projection;

pub use projection::{apr_ladder, project_stake, LadderRow, StakeProjection, DAYS_PER_YEAR};
