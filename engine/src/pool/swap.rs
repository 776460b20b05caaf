use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::fixed_point::{mul_bps, mul_div, BPS_SCALE, PRICE_SCALE};
use crate::pool::range::LiquidityRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
  XtoY,
  YtoX,
}

/// Consumption of one range by one swap, staged before commit.
#[derive(Debug, Clone)]
pub(crate) struct SwapSlice {
  pub range_id: u64,
  pub amount_in: u128,
  pub amount_out: u128,
  pub lp_fee: u128,
}

#[derive(Debug, Clone)]
pub(crate) struct SwapOutcome {
  pub amount_out: u128,
  pub new_price: u128,
  pub fee_total: u128,
  pub protocol_cut: u128,
  pub slices: Vec<SwapSlice>,
}

/// Walk the active ranges in the trade direction, consuming liquidity
/// slice by slice. Pure with respect to pool state; the caller commits
/// the staged slices only after every guard has passed.
///
/// Per slice: out = in * L / (L + in), price moves by in * P / (L * 100).
/// A slice is capped at the input that carries the price to the range
/// boundary, so traversal visits nearest exit boundaries first (for a
/// disjoint layout this is ascending price_lower on x->y and descending
/// on y->x).
pub(crate) fn compute_swap(
  ranges: &[LiquidityRange],
  current_price: u128,
  direction: SwapDirection,
  amount_in: u128,
  fee_bps: u64,
  protocol_share_bps: u64,
) -> EngineResult<SwapOutcome> {
  if amount_in == 0 {
    return Err(EngineError::InvalidParams(
      "amount_in must be positive".to_string(),
    ));
  }
  if fee_bps >= BPS_SCALE || protocol_share_bps > BPS_SCALE {
    return Err(EngineError::InvalidParams(format!(
      "bad fee parameters: fee {} bps, protocol share {} bps",
      fee_bps, protocol_share_bps
    )));
  }

  // fee off the top, before any output math
  let fee_total = mul_bps(amount_in, fee_bps);
  let protocol_cut = mul_bps(fee_total, protocol_share_bps);
  let lp_fee_total = fee_total - protocol_cut;
  let net = amount_in - fee_total;
  if net == 0 {
    return Err(EngineError::InvalidParams("amount_in too small".to_string()));
  }

  let mut remaining = net;
  let mut out_total = 0u128;
  let mut price = current_price;
  let mut slices: Vec<SwapSlice> = Vec::new();
  let mut consumed: HashSet<u64> = HashSet::new();

  while remaining > 0 {
    let range = next_range(ranges, &consumed, price, direction)
      .ok_or(EngineError::InsufficientLiquidity)?;
    consumed.insert(range.range_id);

    // a gap before the range costs no liquidity, the price snaps across
    match direction {
      SwapDirection::XtoY => {
        if price < range.price_lower {
          price = range.price_lower;
        }
      }
      SwapDirection::YtoX => {
        if price > range.price_upper {
          price = range.price_upper;
        }
      }
    }

    let liquidity = range.liquidity;
    let depth = liquidity
      .checked_mul(100)
      .ok_or(EngineError::Internal("liquidity depth overflow".to_string()))?;
    let boundary_gap = match direction {
      SwapDirection::XtoY => range.price_upper - price,
      SwapDirection::YtoX => price - range.price_lower,
    };
    let cap_in = mul_div(boundary_gap, depth, PRICE_SCALE)?;
    if cap_in == 0 {
      // no absorbable input left in this range, cross it
      price = match direction {
        SwapDirection::XtoY => range.price_upper,
        SwapDirection::YtoX => range.price_lower,
      };
      continue;
    }

    let slice_in = remaining.min(cap_in);
    let slice_out = mul_div(
      slice_in,
      liquidity,
      liquidity
        .checked_add(slice_in)
        .ok_or(EngineError::Internal("swap denominator overflow".to_string()))?,
    )?;
    let out_reserve = match direction {
      SwapDirection::XtoY => range.reserve_y,
      SwapDirection::YtoX => range.reserve_x,
    };
    if slice_out > out_reserve {
      return Err(EngineError::InsufficientLiquidity);
    }

    price = if slice_in == cap_in {
      match direction {
        SwapDirection::XtoY => range.price_upper,
        SwapDirection::YtoX => range.price_lower,
      }
    } else {
      let delta = mul_div(slice_in, PRICE_SCALE, depth)?;
      match direction {
        SwapDirection::XtoY => price + delta,
        SwapDirection::YtoX => price.saturating_sub(delta),
      }
    };

    out_total += slice_out;
    remaining -= slice_in;
    slices.push(SwapSlice {
      range_id: range.range_id,
      amount_in: slice_in,
      amount_out: slice_out,
      lp_fee: 0,
    });
  }

  // LP fee attribution proportional to consumed input, remainder to the
  // last slice so the split is exact
  let mut assigned = 0u128;
  let count = slices.len();
  for (i, slice) in slices.iter_mut().enumerate() {
    slice.lp_fee = if i == count - 1 {
      lp_fee_total - assigned
    } else {
      mul_div(lp_fee_total, slice.amount_in, net)?
    };
    assigned += slice.lp_fee;
  }

  Ok(SwapOutcome {
    amount_out: out_total,
    new_price: price,
    fee_total,
    protocol_cut,
    slices,
  })
}

/// Next range in the trade direction: the straddling range with the
/// nearest exit boundary, else the nearest range across the gap.
fn next_range<'a>(
  ranges: &'a [LiquidityRange],
  consumed: &HashSet<u64>,
  price: u128,
  direction: SwapDirection,
) -> Option<&'a LiquidityRange> {
  let live = ranges
    .iter()
    .filter(|r| r.active && r.liquidity > 0 && !consumed.contains(&r.range_id));
  match direction {
    SwapDirection::XtoY => {
      let straddling = live
        .clone()
        .filter(|r| r.price_lower <= price && r.price_upper > price)
        .min_by_key(|r| r.price_upper);
      straddling.or_else(|| {
        live
          .filter(|r| r.price_lower > price)
          .min_by_key(|r| r.price_lower)
      })
    }
    SwapDirection::YtoX => {
      let straddling = live
        .clone()
        .filter(|r| r.price_lower < price && r.price_upper >= price)
        .max_by_key(|r| r.price_lower);
      straddling.or_else(|| {
        live
          .filter(|r| r.price_upper < price)
          .max_by_key(|r| r.price_upper)
      })
    }
  }
}
