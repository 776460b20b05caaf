use serde::{Deserialize, Serialize};

use crate::rebalance::RangeSpec;

/// Scale of the per-unit fee growth accumulators.
pub const FEE_GROWTH_SCALE: u128 = 1_000_000_000_000_000_000;

/// One liquidity bucket over a contiguous price interval.
///
/// `liquidity` is the swap-depth scalar conserved across rebalances;
/// `reserve_x/y` are the principal balances backing LP withdrawals.
/// LP fees live outside the reserves, in the growth accumulators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityRange {
  pub range_id: u64,
  pub price_lower: u128,
  pub price_upper: u128,
  pub liquidity: u128,
  pub reserve_x: u128,
  pub reserve_y: u128,
  pub lp_issued: u128,
  /// fee growth per unit of lp, at FEE_GROWTH_SCALE
  pub fee_growth_x: u128,
  pub fee_growth_y: u128,
  /// lifetime LP fee counters
  pub fees_accrued_x: u128,
  pub fees_accrued_y: u128,
  pub active: bool,
}

impl LiquidityRange {
  pub fn center(&self) -> u128 {
    self.price_lower + (self.price_upper - self.price_lower) / 2
  }

  pub fn spec(&self) -> RangeSpec {
    RangeSpec {
      price_lower: self.price_lower,
      price_upper: self.price_upper,
      liquidity: self.liquidity,
    }
  }
}
