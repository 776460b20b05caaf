use std::fmt::Display;

use common::RingBuffer;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, RejectReason};
use crate::fixed_point::{mul_div, pct_change, sqrt, BPS_SCALE, VOL_SCALE};

/// One accepted observation of the market feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
  pub price: u128,
  pub volume: u128,
  pub timestamp: u64,
}

/// Volatility tier at VOL_SCALE thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
  UltraLow,
  Low,
  Medium,
  High,
  Extreme,
}

impl Regime {
  pub fn classify(volatility: u128) -> Self {
    match volatility {
      v if v < 15_000 => Regime::UltraLow,
      v if v < 30_000 => Regime::Low,
      v if v < 60_000 => Regime::Medium,
      v if v < 120_000 => Regime::High,
      _ => Regime::Extreme,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Regime::UltraLow => "UltraLow",
      Regime::Low => "Low",
      Regime::Medium => "Medium",
      Regime::High => "High",
      Regime::Extreme => "Extreme",
    }
  }
}

impl Display for Regime {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

pub const MIN_ALPHA: u128 = VOL_SCALE / 20;
pub const MAX_ALPHA: u128 = 7 * VOL_SCALE / 10;
pub const MIN_WINDOW: usize = 5;
pub const MAX_WINDOW: usize = 50;

/// EWMA volatility estimator over a bounded price history.
///
/// Variance is kept at VOL_SCALE, so the reported volatility is
/// sqrt(variance * VOL_SCALE) to stay at the same scale.
#[derive(Debug, Clone)]
pub struct VolatilityOracle {
  alpha: u128,
  min_rebalance_interval: u64,
  max_rebalance_interval: u64,
  rebalance_threshold: u128,
  max_price_jump_bps: u64,
  history: RingBuffer<PricePoint>,
  last_price: u128,
  last_update_time: u64,
  ewma_mean: i128,
  ewma_variance: i128,
  volatility: u128,
  last_rebalance_time: u64,
  last_rebalance_volatility: u128,
  last_rebalance_regime: Regime,
  initialized: bool,
}

impl VolatilityOracle {
  pub fn new(cfg: &EngineConfig) -> Self {
    Self {
      alpha: cfg.alpha_scaled,
      min_rebalance_interval: cfg.min_rebalance_interval,
      max_rebalance_interval: cfg.max_rebalance_interval,
      rebalance_threshold: cfg.rebalance_threshold,
      max_price_jump_bps: cfg.max_price_jump_bps,
      history: RingBuffer::new(cfg.window_size),
      last_price: 0,
      last_update_time: 0,
      ewma_mean: 0,
      ewma_variance: 0,
      volatility: 0,
      last_rebalance_time: 0,
      last_rebalance_volatility: 0,
      last_rebalance_regime: Regime::UltraLow,
      initialized: false,
    }
  }

  pub fn init(
    &mut self,
    initial_price: u128,
    alpha_scaled: u128,
    window_size: usize,
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
    if !(MIN_ALPHA..=MAX_ALPHA).contains(&alpha_scaled) {
      return Err(EngineError::InvalidParams(format!(
        "alpha {} outside [{}, {}]",
        alpha_scaled, MIN_ALPHA, MAX_ALPHA
      )));
    }
    if !(MIN_WINDOW..=MAX_WINDOW).contains(&window_size) {
      return Err(EngineError::InvalidParams(format!(
        "window {} outside [{}, {}]",
        window_size, MIN_WINDOW, MAX_WINDOW
      )));
    }
    self.alpha = alpha_scaled;
    self.history = RingBuffer::new(window_size);
    self.last_price = initial_price;
    self.last_update_time = now;
    self.last_rebalance_time = now;
    self.initialized = true;
    Ok(())
  }

  /// Feed one observation. Rejected updates mutate nothing.
  pub fn update_price(&mut self, price: u128, volume: u128, timestamp: u64) -> EngineResult<()> {
    if !self.initialized {
      return Err(EngineError::Rejected(RejectReason::NotInitialized));
    }
    if price == 0 {
      return Err(EngineError::Rejected(RejectReason::ZeroPrice));
    }
    if timestamp <= self.last_update_time {
      return Err(EngineError::Rejected(RejectReason::StaleTimestamp {
        ts: timestamp,
        last: self.last_update_time,
      }));
    }
    let jump_bps = mul_div(
      self.last_price.abs_diff(price),
      BPS_SCALE as u128,
      self.last_price,
    )?;
    if jump_bps > self.max_price_jump_bps as u128 {
      return Err(EngineError::Rejected(RejectReason::JumpTooLarge {
        jump_bps: jump_bps as u64,
        limit_bps: self.max_price_jump_bps,
      }));
    }

    let r = pct_change(self.last_price, price)?;
    let alpha = self.alpha as i128;
    let scale = VOL_SCALE as i128;
    let overflow = || EngineError::Internal("ewma overflow".to_string());
    let mean = alpha
      .checked_mul(r)
      .and_then(|a| (scale - alpha).checked_mul(self.ewma_mean).map(|b| (a, b)))
      .and_then(|(a, b)| a.checked_add(b))
      .ok_or_else(overflow)?
      / scale;
    let dev = r - mean;
    let dev_sq = dev.checked_mul(dev).ok_or_else(overflow)? / scale;
    let variance = alpha
      .checked_mul(dev_sq)
      .and_then(|a| {
        (scale - alpha)
          .checked_mul(self.ewma_variance)
          .map(|b| (a, b))
      })
      .and_then(|(a, b)| a.checked_add(b))
      .ok_or_else(overflow)?
      / scale;
    let volatility = sqrt(
      (variance as u128)
        .checked_mul(VOL_SCALE)
        .ok_or_else(overflow)?,
    );

    // all arithmetic succeeded, commit
    self.ewma_mean = mean;
    self.ewma_variance = variance;
    self.volatility = volatility;
    self.history.push(PricePoint {
      price,
      volume,
      timestamp,
    });
    self.last_price = price;
    self.last_update_time = timestamp;
    debug!(
      "oracle update: price={} r={} vol={} regime={}",
      price,
      r,
      volatility,
      self.current_regime()
    );
    Ok(())
  }

  pub fn current_volatility(&self) -> u128 {
    self.volatility
  }

  pub fn current_regime(&self) -> Regime {
    Regime::classify(self.volatility)
  }

  pub fn last_price(&self) -> u128 {
    self.last_price
  }

  pub fn last_update_time(&self) -> u64 {
    self.last_update_time
  }

  pub fn last_rebalance_time(&self) -> u64 {
    self.last_rebalance_time
  }

  pub fn last_rebalance_volatility(&self) -> u128 {
    self.last_rebalance_volatility
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  pub fn history(&self) -> Vec<PricePoint> {
    self.history.chronological()
  }

  pub fn should_rebalance(&self, now: u64) -> bool {
    self.check_rebalance(now).is_ok()
  }

  /// RebalanceTooSoon until one of the trigger rules arms:
  /// volatility drift past the threshold after the lockout, a regime
  /// tier change, or the forced-refresh interval.
  pub fn check_rebalance(&self, now: u64) -> EngineResult<()> {
    if !self.initialized {
      return Err(EngineError::NotInitialized);
    }
    let elapsed = now.saturating_sub(self.last_rebalance_time);
    if elapsed >= self.max_rebalance_interval {
      return Ok(());
    }
    if Regime::classify(self.volatility) != self.last_rebalance_regime {
      return Ok(());
    }
    let delta = self.volatility.abs_diff(self.last_rebalance_volatility);
    if elapsed >= self.min_rebalance_interval && delta >= self.rebalance_threshold {
      return Ok(());
    }
    Err(EngineError::RebalanceTooSoon)
  }

  /// Snapshot the rebalance baseline. Naturally idempotent within a tick.
  pub fn mark_rebalance_completed(&mut self, now: u64) {
    self.last_rebalance_time = now;
    self.last_rebalance_volatility = self.volatility;
    self.last_rebalance_regime = Regime::classify(self.volatility);
  }

  pub fn snapshot(&self) -> crate::snapshot::OracleSnapshot {
    crate::snapshot::OracleSnapshot {
      volatility: self.volatility,
      regime: self.current_regime(),
      last_price: self.last_price,
      last_update_time: self.last_update_time,
      window_len: self.history.len(),
      ewma_mean: self.ewma_mean,
      ewma_variance: self.ewma_variance,
      last_rebalance_time: self.last_rebalance_time,
      last_rebalance_volatility: self.last_rebalance_volatility,
    }
  }
}
