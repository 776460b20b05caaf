use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::SimConfig;
use crate::scenario::{PriceModel, Scenario};
use crate::wallet::{ScheduledTrade, Wallet, WalletKind};

/// One tick of the simulated market feed.
#[derive(Debug, Clone, Copy)]
pub struct MarketTick {
  pub price: u128,
  pub volume: u128,
}

/// Wallet population mixes for the trading-pattern control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingPattern {
  Balanced,
  RetailHeavy,
  WhaleHeavy,
  BotHeavy,
}

impl TradingPattern {
  pub const ALL: [TradingPattern; 4] = [
    TradingPattern::Balanced,
    TradingPattern::RetailHeavy,
    TradingPattern::WhaleHeavy,
    TradingPattern::BotHeavy,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TradingPattern::Balanced => "balanced",
      TradingPattern::RetailHeavy => "retail_heavy",
      TradingPattern::WhaleHeavy => "whale_heavy",
      TradingPattern::BotHeavy => "bot_heavy",
    }
  }

  pub fn parse(s: &str) -> anyhow::Result<Self> {
    Self::ALL
      .iter()
      .copied()
      .find(|p| p.as_str() == s)
      .ok_or_else(|| anyhow::anyhow!("unknown trading pattern: {}", s))
  }

  fn counts(&self, cfg: &SimConfig) -> (usize, usize, usize) {
    match self {
      TradingPattern::Balanced => (cfg.retail_wallets, cfg.whale_wallets, cfg.bot_wallets),
      TradingPattern::RetailHeavy => (cfg.retail_wallets * 3, cfg.whale_wallets, cfg.bot_wallets),
      TradingPattern::WhaleHeavy => (cfg.retail_wallets, cfg.whale_wallets * 3, cfg.bot_wallets),
      TradingPattern::BotHeavy => (cfg.retail_wallets, cfg.whale_wallets, cfg.bot_wallets * 3),
    }
  }
}

/// Generates the price/volume stream and the flow of wallet trades that
/// drive the pool.
#[derive(Debug)]
pub struct MarketSimulator {
  cfg: SimConfig,
  model: PriceModel,
  pattern: TradingPattern,
  wallets: Vec<Wallet>,
  pending: Vec<ScheduledTrade>,
  rng: StdRng,
  pair: (u32, u32),
}

impl MarketSimulator {
  pub fn new(cfg: SimConfig, scenario: Scenario, pair: (u32, u32)) -> Self {
    let pattern = TradingPattern::Balanced;
    let mut sim = Self {
      model: PriceModel::new(scenario, cfg.initial_price),
      pattern,
      wallets: Vec::new(),
      pending: Vec::new(),
      rng: StdRng::seed_from_u64(cfg.seed),
      pair,
      cfg,
    };
    sim.rebuild_wallets();
    sim
  }

  fn rebuild_wallets(&mut self) {
    let (retail, whale, bot) = self.pattern.counts(&self.cfg);
    let mut wallets = Vec::with_capacity(retail + whale + bot);
    for i in 0..retail {
      wallets.push(Wallet::profile(WalletKind::Retail, i));
    }
    for i in 0..whale {
      wallets.push(Wallet::profile(WalletKind::Whale, i));
    }
    for i in 0..bot {
      wallets.push(Wallet::profile(WalletKind::Bot, i));
    }
    self.wallets = wallets;
  }

  pub fn scenario(&self) -> Scenario {
    self.model.scenario()
  }

  pub fn pattern(&self) -> TradingPattern {
    self.pattern
  }

  pub fn set_scenario(&mut self, scenario: Scenario) {
    self.model.set_scenario(scenario);
  }

  pub fn set_trading_pattern(&mut self, pattern: TradingPattern) {
    self.pattern = pattern;
    self.rebuild_wallets();
  }

  pub fn inject_shock(&mut self, magnitude_bps: i64, duration_s: u64) {
    let ticks = duration_s / self.cfg.tick_seconds.max(1);
    self.model.inject_shock(magnitude_bps, ticks.max(1));
  }

  /// Drop scheduled trades and reseed the price process. Pool balances
  /// are never touched from here.
  pub fn reset(&mut self) {
    self.model.reset();
    self.pending.clear();
    self.rng = StdRng::seed_from_u64(self.cfg.seed);
  }

  /// Advance the feed one tick and let every wallet roll for a trade.
  pub fn step(&mut self, now: u64, oracle_volatility: u128) -> MarketTick {
    let (price, volume) = self.model.step(&mut self.rng);
    let down_bias = self.model.params().down_bias;
    for wallet in &self.wallets {
      if let Some(trade) = wallet.maybe_trade(
        now,
        self.cfg.tick_seconds,
        oracle_volatility,
        self.cfg.baseline_volatility,
        down_bias,
        self.pair,
        &mut self.rng,
      ) {
        self.pending.push(trade);
      }
    }
    MarketTick { price, volume }
  }

  /// Trades due for delivery, ascending planned_time with submission
  /// order breaking ties, plus the count discarded past the TTL.
  pub fn due_trades(&mut self, now: u64, ttl: u64) -> (Vec<ScheduledTrade>, usize) {
    let mut due = Vec::new();
    let mut keep = Vec::new();
    let mut expired = 0usize;
    for trade in self.pending.drain(..) {
      if trade.planned_time + ttl < now {
        expired += 1;
      } else if trade.planned_time <= now {
        due.push(trade);
      } else {
        keep.push(trade);
      }
    }
    self.pending = keep;
    due.sort_by_key(|t| (t.planned_time, t.submitted_at));
    (due, expired)
  }

  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }
}
