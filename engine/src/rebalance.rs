use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fixed_point::{mul_div, BPS_SCALE, VOL_SCALE};
use crate::oracle::Regime;

/// Proposal tolerance for liquidity conservation, 0.1%.
pub const CONSERVATION_TOLERANCE_BPS: u64 = 10;
/// Proximity weight bounds for liquidity allocation.
const BASE_WEIGHT: u128 = 10_000;
const MAX_WEIGHT_BONUS: u128 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
  pub price_lower: u128,
  pub price_upper: u128,
  pub liquidity: u128,
}

impl RangeSpec {
  pub fn center(&self) -> u128 {
    self.price_lower + (self.price_upper - self.price_lower) / 2
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceProposal {
  pub proposal_id: u64,
  pub ranges: Vec<RangeSpec>,
  pub trigger_volatility: u128,
  pub efficiency_score: u64,
  pub created_at: u64,
}

/// Concentration factor (VOL_SCALE) and range count per volatility tier.
fn tier_layout(regime: Regime) -> (u128, usize) {
  match regime {
    Regime::UltraLow => (4_000, 2),
    Regime::Low => (6_000, 3),
    Regime::Medium => (10_000, 4),
    Regime::High => (18_000, 5),
    Regime::Extreme => (25_000, 6),
  }
}

/// Pure layout derivation and validation. Holds only the proposal counter
/// and the geometry floors.
#[derive(Debug, Clone)]
pub struct RebalancingEngine {
  min_range_size_bps: u64,
  min_liquidity: u128,
  next_proposal_id: u64,
}

impl RebalancingEngine {
  pub fn new(cfg: &EngineConfig) -> Self {
    Self {
      min_range_size_bps: cfg.min_range_size_bps,
      min_liquidity: cfg.min_liquidity,
      next_proposal_id: 1,
    }
  }

  pub fn concentration_for(volatility: u128) -> (u128, usize) {
    tier_layout(Regime::classify(volatility))
  }

  /// Derive a range layout for the given volatility tier. Deterministic.
  pub fn propose(
    &mut self,
    current_price: u128,
    volatility: u128,
    total_liquidity: u128,
    now: u64,
  ) -> EngineResult<RebalanceProposal> {
    if current_price == 0 || total_liquidity == 0 {
      return Err(EngineError::InvalidParams(
        "price and liquidity must be positive".to_string(),
      ));
    }
    let (concentration, num_ranges) = tier_layout(Regime::classify(volatility));

    // half-span in bps of the current price, capped at 50% and floored so
    // every slice of the partition clears the minimum relative range size
    // (+2 bps absorbs the floor division in the validity check)
    let half_bps = mul_div(concentration, BPS_SCALE as u128, VOL_SCALE)?.min(5_000);
    let floor_bps = (num_ranges as u128) * (self.min_range_size_bps as u128 + 2) / 2;
    let half_bps = half_bps.max(floor_bps);

    let half_span = mul_div(current_price, half_bps, BPS_SCALE as u128)?;
    let step = 2 * half_span / num_ranges as u128;
    if step == 0 {
      return Err(EngineError::InvalidParams("price too small to partition".to_string()));
    }
    let min_price = current_price - half_span;

    let mut weights = Vec::with_capacity(num_ranges);
    for i in 0..num_ranges {
      let lower = min_price + i as u128 * step;
      let center = lower + step / 2;
      let distance = center.abs_diff(current_price);
      let bonus = mul_div(
        half_span.saturating_sub(distance),
        MAX_WEIGHT_BONUS,
        half_span,
      )?;
      weights.push(BASE_WEIGHT + bonus.min(MAX_WEIGHT_BONUS));
    }
    let weight_sum: u128 = weights.iter().sum();

    let mut ranges = Vec::with_capacity(num_ranges);
    let mut allocated = 0u128;
    for (i, weight) in weights.iter().enumerate() {
      let lower = min_price + i as u128 * step;
      let liquidity = if i == num_ranges - 1 {
        // residual keeps the sum exact
        total_liquidity - allocated
      } else {
        mul_div(total_liquidity, *weight, weight_sum)?
      };
      allocated += liquidity;
      ranges.push(RangeSpec {
        price_lower: lower,
        price_upper: lower + step,
        liquidity,
      });
    }
    if ranges.iter().any(|r| r.liquidity < self.min_liquidity) {
      return Err(EngineError::InvalidParams(
        "total liquidity too small to partition".to_string(),
      ));
    }

    let efficiency_score = self.score(&ranges, current_price, volatility);
    let proposal_id = self.next_proposal_id;
    self.next_proposal_id += 1;
    Ok(RebalanceProposal {
      proposal_id,
      ranges,
      trigger_volatility: volatility,
      efficiency_score,
      created_at: now,
    })
  }

  /// Check a proposed layout against the live one. Returns the efficiency
  /// gain (may be negative); rejects on conservation or geometry failures.
  pub fn validate(
    &self,
    current: &[RangeSpec],
    proposed: &[RangeSpec],
    current_price: u128,
    volatility: u128,
  ) -> EngineResult<i64> {
    if proposed.is_empty() {
      return Err(EngineError::InvalidProposal("empty range set".to_string()));
    }
    let old_total: u128 = current.iter().map(|r| r.liquidity).sum();
    let new_total: u128 = proposed.iter().map(|r| r.liquidity).sum();
    if old_total == 0 {
      return Err(EngineError::InvalidProposal("no current liquidity".to_string()));
    }
    let tolerance = mul_div(old_total, CONSERVATION_TOLERANCE_BPS as u128, BPS_SCALE as u128)?;
    if new_total.abs_diff(old_total) > tolerance {
      return Err(EngineError::InvalidProposal(format!(
        "liquidity not conserved: {} -> {}",
        old_total, new_total
      )));
    }
    validate_geometry(proposed, self.min_range_size_bps)?;
    for pair in proposed.windows(2) {
      if pair[1].price_lower < pair[0].price_upper {
        return Err(EngineError::InvalidProposal(format!(
          "ranges overlap at {}",
          pair[1].price_lower
        )));
      }
    }
    if proposed.iter().any(|r| r.liquidity == 0) {
      return Err(EngineError::InvalidProposal("zero-liquidity range".to_string()));
    }

    let gain =
      self.score(proposed, current_price, volatility) as i64 - self.score(current, current_price, volatility) as i64;
    Ok(gain)
  }

  /// Liquidity-weighted proximity score in [0, 10_000]. Full marks inside
  /// the 2-sigma band around the current price, harmonic decay beyond.
  pub fn score(&self, ranges: &[RangeSpec], current_price: u128, volatility: u128) -> u64 {
    if ranges.is_empty() || current_price == 0 {
      return 0;
    }
    let total: u128 = ranges.iter().map(|r| r.liquidity).sum();
    if total == 0 {
      return 0;
    }
    let band = mul_div(current_price, 2 * volatility, VOL_SCALE)
      .unwrap_or(0)
      .max(current_price / BPS_SCALE as u128);
    let mut weighted = 0u128;
    for r in ranges {
      let distance = r.center().abs_diff(current_price);
      let s = if distance <= band {
        BPS_SCALE as u128
      } else {
        mul_div(BPS_SCALE as u128, band, distance).unwrap_or(0)
      };
      weighted = weighted.saturating_add(r.liquidity.saturating_mul(s));
    }
    (weighted / total).min(BPS_SCALE as u128) as u64
  }
}

/// Per-range geometry rules shared by proposal validation and pool init.
pub fn validate_geometry(ranges: &[RangeSpec], min_range_size_bps: u64) -> EngineResult<()> {
  for r in ranges {
    if r.price_lower == 0 || r.price_lower >= r.price_upper {
      return Err(EngineError::InvalidRange(format!(
        "bad bounds [{}, {}]",
        r.price_lower, r.price_upper
      )));
    }
    let rel = mul_div(
      r.price_upper - r.price_lower,
      BPS_SCALE as u128,
      r.price_lower,
    )?;
    if rel < min_range_size_bps as u128 {
      return Err(EngineError::InvalidRange(format!(
        "range width {} bps below minimum {}",
        rel, min_range_size_bps
      )));
    }
  }
  for pair in ranges.windows(2) {
    if pair[1].price_lower < pair[0].price_lower {
      return Err(EngineError::InvalidRange(
        "ranges not sorted by lower bound".to_string(),
      ));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fixed_point::PRICE_SCALE;

  fn engine() -> RebalancingEngine {
    RebalancingEngine::new(&EngineConfig::default())
  }

  #[test]
  fn tier_mapping_matches_regimes() {
    assert_eq!(RebalancingEngine::concentration_for(10_000), (4_000, 2));
    assert_eq!(RebalancingEngine::concentration_for(20_000), (6_000, 3));
    assert_eq!(RebalancingEngine::concentration_for(45_000), (10_000, 4));
    assert_eq!(RebalancingEngine::concentration_for(100_000), (18_000, 5));
    assert_eq!(RebalancingEngine::concentration_for(500_000), (25_000, 6));
  }

  #[test]
  fn proposal_conserves_liquidity_exactly() {
    let mut e = engine();
    for vol in [10_000u128, 25_000, 50_000, 100_000, 200_000] {
      let total = 31_415_926u128;
      let p = e.propose(PRICE_SCALE, vol, total, 7).unwrap();
      let sum: u128 = p.ranges.iter().map(|r| r.liquidity).sum();
      assert_eq!(sum, total, "vol tier {}", vol);
      let (_, n) = RebalancingEngine::concentration_for(vol);
      assert_eq!(p.ranges.len(), n);
      assert_eq!(p.trigger_volatility, vol);
    }
  }

  #[test]
  fn proposal_ranges_are_a_valid_partition() {
    let mut e = engine();
    let p = e.propose(PRICE_SCALE, 100_000, 10_000_000, 0).unwrap();
    let current = vec![RangeSpec {
      price_lower: PRICE_SCALE / 2,
      price_upper: 2 * PRICE_SCALE,
      liquidity: 10_000_000,
    }];
    let gain = e.validate(&current, &p.ranges, PRICE_SCALE, 100_000).unwrap();
    assert!(gain > 0, "concentrated layout should beat one wide band");
  }

  #[test]
  fn every_tier_produces_self_valid_layouts() {
    // the low tiers only stay above the width floor thanks to the
    // half-span floor, so check all of them
    let mut e = engine();
    for vol in [0u128, 16_000, 40_000, 70_000, 150_000] {
      let p = e.propose(PRICE_SCALE, vol, 50_000_000, 0).unwrap();
      let current = p.ranges.clone();
      assert!(e.validate(&current, &p.ranges, PRICE_SCALE, vol).is_ok());
    }
  }

  #[test]
  fn validate_rejects_conservation_breach() {
    let e = engine();
    let current = vec![RangeSpec {
      price_lower: PRICE_SCALE * 95 / 100,
      price_upper: PRICE_SCALE * 105 / 100,
      liquidity: 1_000_000,
    }];
    let mut proposed = current.clone();
    proposed[0].liquidity = 998_000; // 0.2% off
    assert!(matches!(
      e.validate(&current, &proposed, PRICE_SCALE, 10_000),
      Err(EngineError::InvalidProposal(_))
    ));
    // within 0.1% passes
    proposed[0].liquidity = 999_500;
    assert!(e.validate(&current, &proposed, PRICE_SCALE, 10_000).is_ok());
  }

  #[test]
  fn validate_rejects_overlap_and_disorder() {
    let e = engine();
    let current = vec![RangeSpec {
      price_lower: PRICE_SCALE * 9 / 10,
      price_upper: PRICE_SCALE * 11 / 10,
      liquidity: 2_000_000,
    }];
    let overlapping = vec![
      RangeSpec {
        price_lower: PRICE_SCALE * 9 / 10,
        price_upper: PRICE_SCALE,
        liquidity: 1_000_000,
      },
      RangeSpec {
        price_lower: PRICE_SCALE * 99 / 100,
        price_upper: PRICE_SCALE * 11 / 10,
        liquidity: 1_000_000,
      },
    ];
    assert!(matches!(
      e.validate(&current, &overlapping, PRICE_SCALE, 10_000),
      Err(EngineError::InvalidProposal(_))
    ));
  }

  #[test]
  fn range_width_boundary() {
    // exactly the 50 bps minimum is accepted
    let exact = vec![RangeSpec {
      price_lower: PRICE_SCALE,
      price_upper: PRICE_SCALE + PRICE_SCALE * 50 / 10_000,
      liquidity: 1_000_000,
    }];
    assert!(validate_geometry(&exact, 50).is_ok());
    // one bps-quantum narrower is rejected
    let narrow = vec![RangeSpec {
      price_lower: PRICE_SCALE,
      price_upper: PRICE_SCALE + PRICE_SCALE * 49 / 10_000,
      liquidity: 1_000_000,
    }];
    assert!(matches!(
      validate_geometry(&narrow, 50),
      Err(EngineError::InvalidRange(_))
    ));
  }

  #[test]
  fn score_prefers_tight_layouts() {
    let e = engine();
    let vol = 50_000u128;
    let tight = vec![RangeSpec {
      price_lower: PRICE_SCALE * 99 / 100,
      price_upper: PRICE_SCALE * 101 / 100,
      liquidity: 1_000_000,
    }];
    let wide = vec![RangeSpec {
      price_lower: PRICE_SCALE * 3 / 2,
      price_upper: PRICE_SCALE * 2,
      liquidity: 1_000_000,
    }];
    let s_tight = e.score(&tight, PRICE_SCALE, vol);
    let s_wide = e.score(&wide, PRICE_SCALE, vol);
    assert_eq!(s_tight, 10_000);
    assert!(s_wide < s_tight);
    assert!(e.score(&[], PRICE_SCALE, vol) == 0);
  }
}
