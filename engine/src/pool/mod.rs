pub use position::*;
pub use range::*;
pub use swap::SwapDirection;

pub mod position;
pub mod range;
mod swap;

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fixed_point::{mul_div, sqrt, BPS_SCALE, PRICE_SCALE};
use crate::rebalance::{
  validate_geometry, RangeSpec, RebalanceProposal, CONSERVATION_TOLERANCE_BPS,
};
use crate::snapshot::{PoolSnapshot, PositionInfo, RangeSnapshot};
use swap::compute_swap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPair {
  pub asset_x: u32,
  pub asset_y: u32,
}

impl AssetPair {
  pub fn new(asset_x: u32, asset_y: u32) -> EngineResult<Self> {
    if asset_x >= asset_y {
      return Err(EngineError::InvalidParams(format!(
        "asset ids must satisfy x < y, got ({}, {})",
        asset_x, asset_y
      )));
    }
    Ok(Self { asset_x, asset_y })
  }
}

/// Owns the pool state: asset pair, price, ranges, LP positions and fee
/// accumulators. Every operation is transactional: fallible math runs on
/// staged values and state is only mutated after all guards pass.
#[derive(Debug, Clone)]
pub struct PoolEngine {
  cfg: EngineConfig,
  pair: AssetPair,
  current_price: u128,
  ranges: Vec<LiquidityRange>,
  positions: BTreeMap<(String, u64), LpPosition>,
  next_range_id: u64,
  protocol_fees_x: u128,
  protocol_fees_y: u128,
  last_rebalance_time: u64,
  initialized: bool,
}

impl PoolEngine {
  pub fn new(cfg: EngineConfig) -> Self {
    Self {
      cfg,
      pair: AssetPair::default(),
      current_price: 0,
      ranges: Vec::new(),
      positions: BTreeMap::new(),
      next_range_id: 1,
      protocol_fees_x: 0,
      protocol_fees_y: 0,
      last_rebalance_time: 0,
      initialized: false,
    }
  }

  /// Seed the pool. Ranges must be ordered and well formed; concentric
  /// (nested) bands are accepted here, disjointness is a property of
  /// rebalanced layouts only.
  pub fn init_pool(
    &mut self,
    pair: AssetPair,
    initial_price: u128,
    ranges: &[RangeSpec],
    now: u64,
  ) -> EngineResult<()> {
    if self.initialized {
      return Err(EngineError::AlreadyInitialized);
    }
    if initial_price == 0 {
      return Err(EngineError::InvalidParams(
        "initial price must be positive".to_string(),
      ));
    }
    if ranges.is_empty() {
      return Err(EngineError::InvalidRange("no ranges".to_string()));
    }
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| (r.price_lower, r.price_upper));
    validate_geometry(&sorted, self.cfg.min_range_size_bps)?;
    for r in &sorted {
      if r.liquidity < self.cfg.min_liquidity {
        return Err(EngineError::InvalidRange(format!(
          "range liquidity {} below minimum {}",
          r.liquidity, self.cfg.min_liquidity
        )));
      }
    }

    let mut built = Vec::with_capacity(sorted.len());
    for spec in &sorted {
      let range_id = self.next_range_id;
      self.next_range_id += 1;
      let reserve_y = mul_div(spec.liquidity, initial_price, PRICE_SCALE)?;
      built.push(LiquidityRange {
        range_id,
        price_lower: spec.price_lower,
        price_upper: spec.price_upper,
        liquidity: spec.liquidity,
        reserve_x: spec.liquidity,
        reserve_y,
        lp_issued: spec.liquidity,
        fee_growth_x: 0,
        fee_growth_y: 0,
        fees_accrued_x: 0,
        fees_accrued_y: 0,
        active: true,
      });
    }
    for range in &built {
      self.positions.insert(
        (GENESIS_OWNER.to_string(), range.range_id),
        LpPosition::new(range.lp_issued, range),
      );
    }
    self.pair = pair;
    self.current_price = initial_price;
    self.ranges = built;
    self.last_rebalance_time = now;
    self.initialized = true;
    info!(
      "pool initialized: pair ({}, {}), {} ranges, total liquidity {}",
      pair.asset_x,
      pair.asset_y,
      self.ranges.len(),
      self.total_liquidity()
    );
    Ok(())
  }

  pub fn current_price(&self) -> u128 {
    self.current_price
  }

  pub fn pair(&self) -> AssetPair {
    self.pair
  }

  pub fn last_rebalance_time(&self) -> u64 {
    self.last_rebalance_time
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// Sum of liquidity over active ranges.
  pub fn total_liquidity(&self) -> u128 {
    self
      .ranges
      .iter()
      .filter(|r| r.active)
      .map(|r| r.liquidity)
      .sum()
  }

  pub fn active_range_specs(&self) -> Vec<RangeSpec> {
    self
      .ranges
      .iter()
      .filter(|r| r.active)
      .map(|r| r.spec())
      .collect()
  }

  pub fn ranges(&self) -> &[LiquidityRange] {
    &self.ranges
  }

  /// Depth of the tightest active range straddling the current price,
  /// the liquidity a marginal trade sees.
  pub fn liquidity_at_price(&self) -> u128 {
    self
      .ranges
      .iter()
      .filter(|r| r.active && r.price_lower <= self.current_price && self.current_price < r.price_upper)
      .map(|r| r.liquidity)
      .sum()
  }

  fn ensure_initialized(&self) -> EngineResult<()> {
    if !self.initialized {
      return Err(EngineError::NotInitialized);
    }
    Ok(())
  }

  fn range_index(&self, range_id: u64) -> EngineResult<usize> {
    self
      .ranges
      .iter()
      .position(|r| r.range_id == range_id)
      .ok_or_else(|| EngineError::InvalidRange(format!("unknown range {}", range_id)))
  }

  pub fn add_liquidity(
    &mut self,
    owner: &str,
    range_id: u64,
    amount_x_desired: u128,
    amount_y_desired: u128,
    amount_x_min: u128,
    amount_y_min: u128,
    deadline: u64,
    now: u64,
  ) -> EngineResult<(u128, u128, u128)> {
    self.ensure_initialized()?;
    if now > deadline {
      return Err(EngineError::DeadlineExpired);
    }
    if amount_x_desired == 0 || amount_y_desired == 0 {
      return Err(EngineError::InvalidParams(
        "deposit amounts must be positive".to_string(),
      ));
    }
    let idx = self.range_index(range_id)?;
    let range = &self.ranges[idx];
    if !range.active {
      return Err(EngineError::InvalidRange(format!(
        "range {} is not active",
        range_id
      )));
    }

    // stage all math before mutating
    let (x_actual, y_actual, lp_minted, liquidity_add, genesis_lock) = if range.lp_issued == 0 {
      // genesis deposit to this range
      let product = amount_x_desired
        .checked_mul(amount_y_desired)
        .ok_or(EngineError::Internal("deposit product overflow".to_string()))?;
      let lp_total = sqrt(product);
      if lp_total <= self.cfg.min_liquidity {
        return Err(EngineError::InvalidParams(format!(
          "initial deposit mints {} lp, minimum is {}",
          lp_total, self.cfg.min_liquidity
        )));
      }
      (
        amount_x_desired,
        amount_y_desired,
        lp_total - self.cfg.min_liquidity,
        lp_total,
        self.cfg.min_liquidity,
      )
    } else {
      if range.reserve_x == 0 || range.reserve_y == 0 {
        return Err(EngineError::InvalidRange(format!(
          "range {} reserves depleted",
          range_id
        )));
      }
      let y_opt = mul_div(amount_x_desired, range.reserve_y, range.reserve_x)?;
      let (x_actual, y_actual) = if y_opt <= amount_y_desired {
        (amount_x_desired, y_opt)
      } else {
        let x_opt = mul_div(amount_y_desired, range.reserve_x, range.reserve_y)?;
        (x_opt, amount_y_desired)
      };
      let lp_minted = mul_div(x_actual, range.lp_issued, range.reserve_x)?
        .min(mul_div(y_actual, range.lp_issued, range.reserve_y)?);
      if lp_minted == 0 {
        return Err(EngineError::InvalidParams("deposit too small".to_string()));
      }
      let liquidity_add = mul_div(lp_minted, range.liquidity, range.lp_issued)?;
      (x_actual, y_actual, lp_minted, liquidity_add, 0)
    };
    if x_actual < amount_x_min {
      return Err(EngineError::SlippageExceeded {
        out: x_actual,
        min_out: amount_x_min,
      });
    }
    if y_actual < amount_y_min {
      return Err(EngineError::SlippageExceeded {
        out: y_actual,
        min_out: amount_y_min,
      });
    }

    // settle the depositor against current growth before changing stake
    let range = &self.ranges[idx];
    let mut position = self
      .positions
      .get(&(owner.to_string(), range_id))
      .cloned()
      .unwrap_or_else(|| LpPosition::new(0, range));
    position.settle(range)?;
    position.lp_tokens += lp_minted;

    let mut genesis_position = if genesis_lock > 0 {
      let mut g = self
        .positions
        .get(&(GENESIS_OWNER.to_string(), range_id))
        .cloned()
        .unwrap_or_else(|| LpPosition::new(0, range));
      g.settle(range)?;
      g.lp_tokens += genesis_lock;
      Some(g)
    } else {
      None
    };

    // commit
    let range = &mut self.ranges[idx];
    range.reserve_x += x_actual;
    range.reserve_y += y_actual;
    range.lp_issued += lp_minted + genesis_lock;
    range.liquidity += liquidity_add;
    self
      .positions
      .insert((owner.to_string(), range_id), position);
    if let Some(g) = genesis_position.take() {
      self.positions.insert((GENESIS_OWNER.to_string(), range_id), g);
    }
    debug!(
      "add_liquidity: owner={} range={} x={} y={} lp={}",
      owner, range_id, x_actual, y_actual, lp_minted
    );
    Ok((x_actual, y_actual, lp_minted))
  }

  pub fn remove_liquidity(
    &mut self,
    owner: &str,
    range_id: u64,
    lp_amount: u128,
    amount_x_min: u128,
    amount_y_min: u128,
    deadline: u64,
    now: u64,
  ) -> EngineResult<(u128, u128)> {
    self.ensure_initialized()?;
    if now > deadline {
      return Err(EngineError::DeadlineExpired);
    }
    if lp_amount == 0 {
      return Err(EngineError::InvalidParams(
        "lp amount must be positive".to_string(),
      ));
    }
    let idx = self.range_index(range_id)?;
    let key = (owner.to_string(), range_id);
    let position = self
      .positions
      .get(&key)
      .ok_or_else(|| EngineError::InvalidParams(format!("no position for {}", owner)))?;
    if lp_amount > position.lp_tokens {
      return Err(EngineError::InvalidParams(format!(
        "lp amount {} exceeds position {}",
        lp_amount, position.lp_tokens
      )));
    }

    let range = &self.ranges[idx];
    let x_out = mul_div(lp_amount, range.reserve_x, range.lp_issued)?;
    let y_out = mul_div(lp_amount, range.reserve_y, range.lp_issued)?;
    if x_out < amount_x_min {
      return Err(EngineError::SlippageExceeded {
        out: x_out,
        min_out: amount_x_min,
      });
    }
    if y_out < amount_y_min {
      return Err(EngineError::SlippageExceeded {
        out: y_out,
        min_out: amount_y_min,
      });
    }
    let liquidity_remove = mul_div(lp_amount, range.liquidity, range.lp_issued)?;

    let mut position = position.clone();
    position.settle(range)?;
    position.lp_tokens -= lp_amount;
    // accrued fees ride along with the withdrawal
    let fees_x = std::mem::take(&mut position.owed_x);
    let fees_y = std::mem::take(&mut position.owed_y);

    // commit
    let range = &mut self.ranges[idx];
    range.reserve_x -= x_out;
    range.reserve_y -= y_out;
    range.lp_issued -= lp_amount;
    range.liquidity -= liquidity_remove;
    if range.active && range.liquidity < self.cfg.min_liquidity {
      range.active = false;
      info!("range {} deactivated below the liquidity floor", range_id);
    }
    if position.lp_tokens == 0 {
      self.positions.remove(&key);
    } else {
      self.positions.insert(key, position);
    }
    debug!(
      "remove_liquidity: owner={} range={} x={} y={} lp={}",
      owner, range_id, x_out, y_out, lp_amount
    );
    Ok((x_out + fees_x, y_out + fees_y))
  }

  /// Pay out settled fees without touching the principal.
  pub fn claim_fees(&mut self, owner: &str, range_id: u64) -> EngineResult<(u128, u128)> {
    self.ensure_initialized()?;
    let idx = self.range_index(range_id)?;
    let key = (owner.to_string(), range_id);
    let position = self
      .positions
      .get(&key)
      .ok_or_else(|| EngineError::InvalidParams(format!("no position for {}", owner)))?;
    let mut position = position.clone();
    position.settle(&self.ranges[idx])?;
    let fees_x = std::mem::take(&mut position.owed_x);
    let fees_y = std::mem::take(&mut position.owed_y);
    if position.lp_tokens == 0 {
      self.positions.remove(&key);
    } else {
      self.positions.insert(key, position);
    }
    Ok((fees_x, fees_y))
  }

  pub fn list_positions(&self, owner: &str) -> Vec<PositionInfo> {
    self
      .positions
      .iter()
      .filter(|((o, _), _)| o == owner)
      .filter_map(|((_, range_id), pos)| {
        let idx = self.ranges.iter().position(|r| r.range_id == *range_id)?;
        let (unclaimed_x, unclaimed_y) = pos.pending(&self.ranges[idx]).ok()?;
        Some(PositionInfo {
          range_id: *range_id,
          lp_tokens: pos.lp_tokens,
          unclaimed_x,
          unclaimed_y,
        })
      })
      .collect()
  }

  fn direction_for(&self, asset_in: u32) -> EngineResult<SwapDirection> {
    if asset_in == self.pair.asset_x {
      Ok(SwapDirection::XtoY)
    } else if asset_in == self.pair.asset_y {
      Ok(SwapDirection::YtoX)
    } else {
      Err(EngineError::InvalidAsset(asset_in))
    }
  }

  /// Price a swap without mutating state, at the default fee.
  pub fn quote_swap(&self, asset_in: u32, amount_in: u128) -> EngineResult<(u128, u64, u64)> {
    self.ensure_initialized()?;
    let direction = self.direction_for(asset_in)?;
    let outcome = compute_swap(
      &self.ranges,
      self.current_price,
      direction,
      amount_in,
      self.cfg.base_fee_bps,
      self.cfg.protocol_share_bps,
    )?;
    let impact = mul_div(
      self.current_price.abs_diff(outcome.new_price),
      BPS_SCALE as u128,
      self.current_price,
    )? as u64;
    Ok((outcome.amount_out, impact, self.cfg.base_fee_bps))
  }

  pub fn swap(
    &mut self,
    asset_in: u32,
    amount_in: u128,
    min_amount_out: u128,
    deadline: u64,
    now: u64,
    fee_bps: u64,
    protocol_share_bps: u64,
  ) -> EngineResult<u128> {
    self.ensure_initialized()?;
    let direction = self.direction_for(asset_in)?;
    if now > deadline {
      return Err(EngineError::DeadlineExpired);
    }
    let outcome = compute_swap(
      &self.ranges,
      self.current_price,
      direction,
      amount_in,
      fee_bps,
      protocol_share_bps,
    )?;
    if outcome.amount_out < min_amount_out {
      return Err(EngineError::SlippageExceeded {
        out: outcome.amount_out,
        min_out: min_amount_out,
      });
    }

    // stage the fee growth math, then commit infallibly
    let mut plan = Vec::with_capacity(outcome.slices.len());
    for slice in &outcome.slices {
      let idx = self.range_index(slice.range_id)?;
      let range = &self.ranges[idx];
      let growth = if range.lp_issued > 0 {
        Some(mul_div(slice.lp_fee, FEE_GROWTH_SCALE, range.lp_issued)?)
      } else {
        None
      };
      plan.push((idx, growth));
    }

    for ((idx, growth), slice) in plan.into_iter().zip(outcome.slices.iter()) {
      let range = &mut self.ranges[idx];
      match direction {
        SwapDirection::XtoY => {
          range.reserve_x += slice.amount_in;
          range.reserve_y -= slice.amount_out;
          match growth {
            Some(g) => {
              range.fee_growth_x += g;
              range.fees_accrued_x += slice.lp_fee;
            }
            None => self.protocol_fees_x += slice.lp_fee,
          }
        }
        SwapDirection::YtoX => {
          range.reserve_y += slice.amount_in;
          range.reserve_x -= slice.amount_out;
          match growth {
            Some(g) => {
              range.fee_growth_y += g;
              range.fees_accrued_y += slice.lp_fee;
            }
            None => self.protocol_fees_y += slice.lp_fee,
          }
        }
      }
    }
    match direction {
      SwapDirection::XtoY => self.protocol_fees_x += outcome.protocol_cut,
      SwapDirection::YtoX => self.protocol_fees_y += outcome.protocol_cut,
    }
    self.current_price = outcome.new_price;
    debug!(
      "swap: asset_in={} in={} out={} fee={} price={}",
      asset_in, amount_in, outcome.amount_out, outcome.fee_total, self.current_price
    );
    Ok(outcome.amount_out)
  }

  /// Replace the active range set atomically. Either the whole proposal
  /// applies or the state is untouched.
  pub fn apply_rebalance(&mut self, proposal: &RebalanceProposal, now: u64) -> EngineResult<()> {
    self.ensure_initialized()?;
    self.validate_proposal(proposal)?;

    let old_total = self.total_liquidity();
    let new_total: u128 = proposal.ranges.iter().map(|r| r.liquidity).sum();

    // settle every position on scratch copies; nothing is mutated until
    // the whole new state is built
    let mut settled: Vec<((String, u64), LpPosition)> = Vec::with_capacity(self.positions.len());
    for (key, pos) in &self.positions {
      let idx = self.range_index(key.1)?;
      let mut pos = pos.clone();
      pos.settle(&self.ranges[idx])?;
      settled.push((key.clone(), pos));
    }

    let total_reserve_x: u128 = self.ranges.iter().map(|r| r.reserve_x).sum();
    let total_reserve_y: u128 = self.ranges.iter().map(|r| r.reserve_y).sum();
    let carried_fees_x: u128 = self.ranges.iter().map(|r| r.fees_accrued_x).sum();
    let carried_fees_y: u128 = self.ranges.iter().map(|r| r.fees_accrued_y).sum();

    let mut new_ranges = Vec::with_capacity(proposal.ranges.len());
    let mut next_id = self.next_range_id;
    let mut assigned_x = 0u128;
    let mut assigned_y = 0u128;
    let count = proposal.ranges.len();
    for (i, spec) in proposal.ranges.iter().enumerate() {
      let (reserve_x, reserve_y) = if i == count - 1 {
        (total_reserve_x - assigned_x, total_reserve_y - assigned_y)
      } else {
        (
          mul_div(total_reserve_x, spec.liquidity, new_total)?,
          mul_div(total_reserve_y, spec.liquidity, new_total)?,
        )
      };
      assigned_x += reserve_x;
      assigned_y += reserve_y;
      new_ranges.push(LiquidityRange {
        range_id: next_id,
        price_lower: spec.price_lower,
        price_upper: spec.price_upper,
        liquidity: spec.liquidity,
        reserve_x,
        reserve_y,
        lp_issued: 0,
        fee_growth_x: 0,
        fee_growth_y: 0,
        fees_accrued_x: 0,
        fees_accrued_y: 0,
        active: true,
      });
      next_id += 1;
    }
    // fee counter continuity rides on the range closest to the price
    if let Some(closest) = new_ranges
      .iter_mut()
      .min_by_key(|r| r.center().abs_diff(self.current_price))
    {
      closest.fees_accrued_x = carried_fees_x;
      closest.fees_accrued_y = carried_fees_y;
    }

    // re-attribute positions to the price-closest new range, in
    // liquidity units so stakes stay comparable across the swap
    let mut new_positions: BTreeMap<(String, u64), LpPosition> = BTreeMap::new();
    for (key, pos) in settled {
      let old_idx = self.range_index(key.1)?;
      let old_range = &self.ranges[old_idx];
      let stake = if old_range.lp_issued > 0 {
        mul_div(pos.lp_tokens, old_range.liquidity, old_range.lp_issued)?
      } else {
        0
      };
      if stake == 0 && pos.owed_x == 0 && pos.owed_y == 0 {
        continue;
      }
      let target = new_ranges
        .iter()
        .min_by_key(|r| r.center().abs_diff(old_range.center()))
        .map(|r| r.range_id)
        .ok_or(EngineError::InvalidProposal("empty range set".to_string()))?;
      let entry = new_positions.entry((key.0, target)).or_default();
      entry.lp_tokens += stake;
      entry.owed_x += pos.owed_x;
      entry.owed_y += pos.owed_y;
    }
    for range in &mut new_ranges {
      range.lp_issued = new_positions
        .iter()
        .filter(|((_, rid), _)| *rid == range.range_id)
        .map(|(_, p)| p.lp_tokens)
        .sum();
    }

    let tolerance = mul_div(old_total, CONSERVATION_TOLERANCE_BPS as u128, BPS_SCALE as u128)?;
    if new_total.abs_diff(old_total) > tolerance {
      return Err(EngineError::Internal(format!(
        "liquidity conservation violated by rebalance: {} -> {}",
        old_total, new_total
      )));
    }

    // commit
    self.ranges = new_ranges;
    self.positions = new_positions;
    self.next_range_id = next_id;
    self.last_rebalance_time = now;
    info!(
      "rebalance applied: proposal {} with {} ranges, total liquidity {}",
      proposal.proposal_id,
      self.ranges.len(),
      self.total_liquidity()
    );
    Ok(())
  }

  /// The pool re-checks the layout rules itself; proposals may arrive
  /// from any producer, not only RebalancingEngine::validate.
  fn validate_proposal(&self, proposal: &RebalanceProposal) -> EngineResult<()> {
    if proposal.ranges.is_empty() {
      return Err(EngineError::InvalidProposal("empty range set".to_string()));
    }
    validate_geometry(&proposal.ranges, self.cfg.min_range_size_bps)
      .map_err(|e| EngineError::InvalidProposal(e.to_string()))?;
    for pair in proposal.ranges.windows(2) {
      if pair[1].price_lower < pair[0].price_upper {
        return Err(EngineError::InvalidProposal(format!(
          "ranges overlap at {}",
          pair[1].price_lower
        )));
      }
    }
    for r in &proposal.ranges {
      if r.liquidity < self.cfg.min_liquidity {
        return Err(EngineError::InvalidProposal(format!(
          "range liquidity {} below minimum {}",
          r.liquidity, self.cfg.min_liquidity
        )));
      }
    }
    let old_total = self.total_liquidity();
    let new_total: u128 = proposal.ranges.iter().map(|r| r.liquidity).sum();
    let tolerance = mul_div(old_total, CONSERVATION_TOLERANCE_BPS as u128, BPS_SCALE as u128)?;
    if new_total.abs_diff(old_total) > tolerance {
      return Err(EngineError::InvalidProposal(format!(
        "liquidity not conserved: {} -> {}",
        old_total, new_total
      )));
    }
    Ok(())
  }

  pub fn snapshot(&self) -> PoolSnapshot {
    PoolSnapshot {
      asset_x: self.pair.asset_x,
      asset_y: self.pair.asset_y,
      current_price: self.current_price,
      total_liquidity: self.total_liquidity(),
      protocol_fees_x: self.protocol_fees_x,
      protocol_fees_y: self.protocol_fees_y,
      last_rebalance_time: self.last_rebalance_time,
      ranges: self
        .ranges
        .iter()
        .map(|r| RangeSnapshot {
          range_id: r.range_id,
          price_lower: r.price_lower,
          price_upper: r.price_upper,
          liquidity: r.liquidity,
          reserve_x: r.reserve_x,
          reserve_y: r.reserve_y,
          lp_issued: r.lp_issued,
          fees_accrued_x: r.fees_accrued_x,
          fees_accrued_y: r.fees_accrued_y,
          active: r.active,
        })
        .collect(),
    }
  }
}
