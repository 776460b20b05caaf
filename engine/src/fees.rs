use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fixed_point::{mul_div, BPS_SCALE, VOL_SCALE};

/// Fixed discount schedule, bps off the computed fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraderTier {
  Retail,
  Silver,
  Gold,
  Platinum,
}

impl TraderTier {
  pub fn discount_bps(&self) -> u64 {
    match self {
      TraderTier::Retail => 0,
      TraderTier::Silver => 500,
      TraderTier::Gold => 1_000,
      TraderTier::Platinum => 2_000,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
  pub total_bps: u64,
  pub protocol_bps: u64,
}

/// Stateless dynamic fee calculator. Volume accounting is the caller's
/// concern; passing volume_24h = 0 simply forfeits the discount.
#[derive(Debug, Clone)]
pub struct FeeManager {
  base_fee_bps: u64,
  min_fee_bps: u64,
  max_fee_bps: u64,
  protocol_share_bps: u64,
  volatility_multiplier: u128,
  volume_threshold: u128,
  volume_discount_factor: u64,
}

impl FeeManager {
  pub fn new(cfg: &EngineConfig) -> Self {
    Self {
      base_fee_bps: cfg.base_fee_bps,
      min_fee_bps: cfg.min_fee_bps,
      max_fee_bps: cfg.max_fee_bps,
      protocol_share_bps: cfg.protocol_share_bps,
      volatility_multiplier: cfg.volatility_multiplier,
      volume_threshold: cfg.volume_threshold,
      volume_discount_factor: cfg.volume_discount_factor,
    }
  }

  pub fn compute_fee(
    &self,
    volatility: u128,
    volume_24h: u128,
    liquidity: u128,
    trade_size: u128,
    tier: Option<TraderTier>,
  ) -> EngineResult<FeeQuote> {
    if liquidity == 0 {
      return Err(EngineError::InvalidParams(
        "liquidity must be positive".to_string(),
      ));
    }
    let bps = BPS_SCALE as u128;

    // volatility bump: base * vol * multiplier / V^2
    let bump = mul_div(
      self.base_fee_bps as u128,
      volatility
        .checked_mul(self.volatility_multiplier)
        .ok_or(EngineError::Internal("volatility bump overflow".to_string()))?,
      VOL_SCALE * VOL_SCALE,
    )?;
    let mut fee = self.base_fee_bps as u128 + bump;

    // capped volume discount
    let vol_ratio = mul_div(volume_24h, bps, self.volume_threshold)?.min(5_000);
    let discount = mul_div(vol_ratio, self.volume_discount_factor as u128, bps)?;
    fee = mul_div(fee, bps - discount, bps)?;

    // liquidity penalty above 10% utilization
    let size_ratio = mul_div(trade_size, bps, liquidity)?;
    if size_ratio > 1_000 {
      let excess = (size_ratio - 1_000).min(2_000);
      fee = mul_div(fee, bps + excess, bps)?;
    }

    if let Some(tier) = tier {
      fee = mul_div(fee, bps - tier.discount_bps() as u128, bps)?;
    }

    let total_bps = fee.clamp(self.min_fee_bps as u128, self.max_fee_bps as u128) as u64;
    let protocol_bps =
      mul_div(total_bps as u128, self.protocol_share_bps as u128, bps)? as u64;
    Ok(FeeQuote {
      total_bps,
      protocol_bps,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fees() -> FeeManager {
    FeeManager::new(&EngineConfig::default())
  }

  #[test]
  fn volatility_monotonicity() {
    let f = fees();
    let t1 = f
      .compute_fee(100_000, 0, 1_000_000_000, 100_000, None)
      .unwrap();
    let t2 = f
      .compute_fee(200_000, 0, 1_000_000_000, 100_000, None)
      .unwrap();
    assert_eq!(t1.total_bps, 36);
    assert_eq!(t2.total_bps, 42);
    assert!(t2.total_bps >= t1.total_bps);
    assert_eq!(t1.protocol_bps, 3);
  }

  #[test]
  fn large_trade_pays_liquidity_penalty() {
    let f = fees();
    let small = f
      .compute_fee(100_000, 0, 1_000_000_000, 100_000, None)
      .unwrap();
    // 20% of available liquidity
    let large = f
      .compute_fee(100_000, 0, 1_000_000_000, 200_000_000, None)
      .unwrap();
    assert!(large.total_bps > small.total_bps);
    // penalty excess is capped at 2_000 bps
    let huge = f
      .compute_fee(100_000, 0, 1_000_000_000, 900_000_000, None)
      .unwrap();
    assert_eq!(
      huge.total_bps,
      small.total_bps * (BPS_SCALE + 2_000) / BPS_SCALE
    );
  }

  #[test]
  fn volume_discount_caps_at_half_ratio() {
    let f = fees();
    let none = f.compute_fee(0, 0, 1_000_000_000, 1_000, None).unwrap();
    let some = f
      .compute_fee(0, 500_000_000, 1_000_000_000, 1_000, None)
      .unwrap();
    let capped = f
      .compute_fee(0, 10_000_000_000, 1_000_000_000, 1_000, None)
      .unwrap();
    assert!(some.total_bps < none.total_bps);
    // ratio saturates at 5_000 even for 10x threshold volume
    assert_eq!(capped.total_bps, none.total_bps * 9_500 / 10_000);
  }

  #[test]
  fn tier_discount_and_clamps() {
    let f = fees();
    let retail = f
      .compute_fee(100_000, 0, 1_000_000_000, 100_000, Some(TraderTier::Retail))
      .unwrap();
    let platinum = f
      .compute_fee(
        100_000,
        0,
        1_000_000_000,
        100_000,
        Some(TraderTier::Platinum),
      )
      .unwrap();
    assert!(platinum.total_bps < retail.total_bps);

    // extreme volatility clamps at the ceiling
    let ceiling = f
      .compute_fee(10_000_000, 0, 1_000_000_000, 1_000, None)
      .unwrap();
    assert_eq!(ceiling.total_bps, 300);
    // the floor holds even under every discount at once
    let floor = f
      .compute_fee(0, 10_000_000_000, 1_000_000_000, 1, Some(TraderTier::Platinum))
      .unwrap();
    assert!(floor.total_bps >= 5);
  }

  #[test]
  fn zero_liquidity_is_invalid() {
    assert!(matches!(
      fees().compute_fee(0, 0, 0, 1, None),
      Err(EngineError::InvalidParams(_))
    ));
  }
}
