use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use engine::VOL_SCALE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
  Retail,
  Whale,
  Bot,
}

impl WalletKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      WalletKind::Retail => "retail",
      WalletKind::Whale => "whale",
      WalletKind::Bot => "bot",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
  Swap,
  AddLiquidity,
  RemoveLiquidity,
}

/// A trade waiting for simulated inclusion.
#[derive(Debug, Clone)]
pub struct ScheduledTrade {
  pub wallet: String,
  pub kind: TradeKind,
  pub asset_in: u32,
  pub size: u128,
  pub planned_time: u64,
  pub submitted_at: u64,
}

/// Maximum simulated inclusion latency, seconds.
const MAX_INCLUSION_DELAY: u64 = 30;

#[derive(Debug, Clone)]
pub struct Wallet {
  pub address: String,
  pub kind: WalletKind,
  pub balance_x: u128,
  pub balance_y: u128,
  /// transactions per minute at baseline volatility
  pub base_frequency: f64,
  pub size_mean: f64,
  pub size_std: f64,
  pub volatility_sensitivity: f64,
}

impl Wallet {
  pub fn profile(kind: WalletKind, index: usize) -> Self {
    let address = format!("{}-{}", kind.as_str(), index);
    match kind {
      WalletKind::Retail => Self {
        address,
        kind,
        balance_x: 1_000_000_000,
        balance_y: 1_000_000_000,
        base_frequency: 0.5,
        size_mean: 50_000.0,
        size_std: 15_000.0,
        volatility_sensitivity: 1.0,
      },
      WalletKind::Whale => Self {
        address,
        kind,
        balance_x: 100_000_000_000,
        balance_y: 100_000_000_000,
        base_frequency: 0.2,
        size_mean: 5_000_000.0,
        size_std: 2_500_000.0,
        volatility_sensitivity: 0.3,
      },
      WalletKind::Bot => Self {
        address,
        kind,
        balance_x: 10_000_000_000,
        balance_y: 10_000_000_000,
        base_frequency: 1.5,
        size_mean: 200_000.0,
        size_std: 30_000.0,
        volatility_sensitivity: 2.0,
      },
    }
  }

  /// Roll this tick's submission. Trading frequency couples to how far
  /// volatility sits above the baseline.
  pub fn maybe_trade(
    &self,
    now: u64,
    tick_seconds: u64,
    volatility: u128,
    baseline: u128,
    down_bias: f64,
    pair: (u32, u32),
    rng: &mut StdRng,
  ) -> Option<ScheduledTrade> {
    let vol_excess = (volatility as f64 - baseline as f64) / VOL_SCALE as f64;
    let probability = (self.base_frequency / 60.0
      * tick_seconds as f64
      * (1.0 + self.volatility_sensitivity * vol_excess))
      .clamp(0.0, 1.0);
    if rng.gen::<f64>() >= probability {
      return None;
    }

    let size = Normal::new(self.size_mean, self.size_std)
      .expect("wallet size distribution is well formed")
      .sample(rng)
      .max(self.size_mean * 0.1) as u128;

    let kind = match rng.gen_range(0..10) {
      0 => TradeKind::AddLiquidity,
      1 => TradeKind::RemoveLiquidity,
      _ => TradeKind::Swap,
    };
    // the price-depressing direction sells y into the pool; bots stay
    // market-neutral and ignore the scenario bias
    let bias = match self.kind {
      WalletKind::Bot => 0.5,
      _ => down_bias,
    };
    let asset_in = if rng.gen::<f64>() < bias { pair.1 } else { pair.0 };
    // never stake more than a sliver of the balance on one trade
    let balance = if asset_in == pair.1 {
      self.balance_y
    } else {
      self.balance_x
    };
    let size = size.min(balance / 100).max(1);
    let delay = rng.gen_range(0..=MAX_INCLUSION_DELAY);
    Some(ScheduledTrade {
      wallet: self.address.clone(),
      kind,
      asset_in,
      size,
      planned_time: now + delay,
      submitted_at: now,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;

  #[test]
  fn profiles_match_the_population_table() {
    let retail = Wallet::profile(WalletKind::Retail, 0);
    let whale = Wallet::profile(WalletKind::Whale, 0);
    let bot = Wallet::profile(WalletKind::Bot, 0);
    assert!(whale.size_mean > bot.size_mean && bot.size_mean > retail.size_mean);
    assert!(bot.base_frequency >= 1.0);
    assert!(bot.volatility_sensitivity > retail.volatility_sensitivity);
    assert!(whale.volatility_sensitivity < retail.volatility_sensitivity);
    assert_eq!(retail.address, "retail-0");
  }

  #[test]
  fn volatility_raises_submission_rate() {
    let bot = Wallet::profile(WalletKind::Bot, 0);
    let mut rng = StdRng::seed_from_u64(11);
    let mut calm = 0;
    let mut wild = 0;
    for t in 0..4_000u64 {
      if bot
        .maybe_trade(t, 1, 20_000, 20_000, 0.5, (0, 1), &mut rng)
        .is_some()
      {
        calm += 1;
      }
      if bot
        .maybe_trade(t, 1, 520_000, 20_000, 0.5, (0, 1), &mut rng)
        .is_some()
      {
        wild += 1;
      }
    }
    assert!(wild > calm, "hot markets must trade more: {} vs {}", wild, calm);
  }

  #[test]
  fn scheduled_trades_respect_inclusion_latency() {
    let retail = Wallet::profile(WalletKind::Retail, 3);
    let mut rng = StdRng::seed_from_u64(2);
    for t in 0..2_000u64 {
      if let Some(trade) = retail.maybe_trade(t, 60, 40_000, 20_000, 0.5, (0, 1), &mut rng) {
        assert!(trade.planned_time >= t);
        assert!(trade.planned_time <= t + MAX_INCLUSION_DELAY);
        assert!(trade.size > 0);
      }
    }
  }
}
