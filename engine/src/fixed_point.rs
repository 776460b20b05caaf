use primitive_types::U256;

use crate::error::MathError;

/// Price scale, 1.0 == 10^18.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;
/// Volatility scale, 1% == 10_000.
pub const VOL_SCALE: u128 = 1_000_000;
/// Basis point scale, 100% == 10_000.
pub const BPS_SCALE: u64 = 10_000;

/// Floor of a * b / c with a 256-bit intermediate.
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
  if c == 0 {
    return Err(MathError::DivByZero);
  }
  let q = U256::from(a) * U256::from(b) / U256::from(c);
  if q > U256::from(u128::MAX) {
    return Err(MathError::Overflow);
  }
  Ok(q.as_u128())
}

/// Babylonian floor square root.
pub fn sqrt(n: u128) -> u128 {
  if n == 0 {
    return 0;
  }
  let mut x = n;
  let mut y = (x + n / x) / 2;
  while y < x {
    x = y;
    y = (x + n / x) / 2;
  }
  x
}

/// x * bps / 10_000, saturating on overflow. Fee application clamps
/// rather than aborts; every other caller wants `mul_div`.
pub fn mul_bps(x: u128, bps: u64) -> u128 {
  mul_div(x, bps as u128, BPS_SCALE as u128).unwrap_or(u128::MAX)
}

/// Signed relative change of `new` vs `old` at VOL_SCALE, truncated toward zero.
pub fn pct_change(old: u128, new: u128) -> Result<i128, MathError> {
  if old == 0 {
    return Err(MathError::DivByZero);
  }
  let old_i = i128::try_from(old).map_err(|_| MathError::Overflow)?;
  let new_i = i128::try_from(new).map_err(|_| MathError::Overflow)?;
  let num = (new_i - old_i)
    .checked_mul(VOL_SCALE as i128)
    .ok_or(MathError::Overflow)?;
  Ok(num / old_i)
}
