use serde::{Deserialize, Serialize};

use crate::fixed_point::VOL_SCALE;

/// Tunables of the core. Scaled-integer fields use the scale noted per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// EWMA decay factor at VOL_SCALE
  pub alpha_scaled: u128,
  /// price ring capacity
  pub window_size: usize,
  /// oracle lockout, seconds
  pub min_rebalance_interval: u64,
  /// forced refresh, seconds
  pub max_rebalance_interval: u64,
  /// volatility delta (VOL_SCALE) that arms the rebalance trigger
  pub rebalance_threshold: u128,
  /// oracle sanity gate on a single update
  pub max_price_jump_bps: u64,
  pub base_fee_bps: u64,
  pub max_fee_bps: u64,
  pub min_fee_bps: u64,
  pub protocol_share_bps: u64,
  /// minimum relative range width accepted in a proposal
  pub min_range_size_bps: u64,
  /// LP floor per range, locked on genesis deposit
  pub min_liquidity: u128,
  /// volatility fee bump gain at VOL_SCALE
  pub volatility_multiplier: u128,
  /// 24h volume granting the full nominal discount
  pub volume_threshold: u128,
  /// fraction (bps) of the volume ratio converted into discount
  pub volume_discount_factor: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      alpha_scaled: 3 * VOL_SCALE / 10,
      window_size: 20,
      min_rebalance_interval: 60,
      max_rebalance_interval: 3_600,
      rebalance_threshold: 20_000,
      max_price_jump_bps: 3_000,
      base_fee_bps: 30,
      max_fee_bps: 300,
      min_fee_bps: 5,
      protocol_share_bps: 1_000,
      min_range_size_bps: 50,
      min_liquidity: 1_000,
      volatility_multiplier: 2 * VOL_SCALE,
      volume_threshold: 1_000_000_000,
      volume_discount_factor: 1_000,
    }
  }
}
