use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::fixed_point::mul_div;
use crate::pool::range::{LiquidityRange, FEE_GROWTH_SCALE};

/// Depositors are addressed by an opaque owner string; the zero-address
/// analogue holding seed liquidity and the genesis locks.
pub const GENESIS_OWNER: &str = "genesis";

/// One owner's stake in one range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpPosition {
  pub lp_tokens: u128,
  /// fee growth snapshots at the last interaction
  pub entry_growth_x: u128,
  pub entry_growth_y: u128,
  /// settled but unclaimed fees
  pub owed_x: u128,
  pub owed_y: u128,
}

impl LpPosition {
  pub fn new(lp_tokens: u128, range: &LiquidityRange) -> Self {
    Self {
      lp_tokens,
      entry_growth_x: range.fee_growth_x,
      entry_growth_y: range.fee_growth_y,
      owed_x: 0,
      owed_y: 0,
    }
  }

  /// Credit the growth delta since the last interaction and advance the
  /// entry snapshot.
  pub fn settle(&mut self, range: &LiquidityRange) -> EngineResult<()> {
    self.owed_x += mul_div(
      self.lp_tokens,
      range.fee_growth_x - self.entry_growth_x,
      FEE_GROWTH_SCALE,
    )?;
    self.owed_y += mul_div(
      self.lp_tokens,
      range.fee_growth_y - self.entry_growth_y,
      FEE_GROWTH_SCALE,
    )?;
    self.entry_growth_x = range.fee_growth_x;
    self.entry_growth_y = range.fee_growth_y;
    Ok(())
  }

  /// Unclaimed fees without mutating the snapshot.
  pub fn pending(&self, range: &LiquidityRange) -> EngineResult<(u128, u128)> {
    let x = self.owed_x
      + mul_div(
        self.lp_tokens,
        range.fee_growth_x - self.entry_growth_x,
        FEE_GROWTH_SCALE,
      )?;
    let y = self.owed_y
      + mul_div(
        self.lp_tokens,
        range.fee_growth_y - self.entry_growth_y,
        FEE_GROWTH_SCALE,
      )?;
    Ok((x, y))
  }
}
