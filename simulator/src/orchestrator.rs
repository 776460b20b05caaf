use std::collections::VecDeque;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::Serialize;

use engine::{
  AssetPair, EngineError, FeeManager, OracleSnapshot, PoolEngine, PoolSnapshot, RangeSpec,
  RebalanceProposal, RebalancingEngine, VolatilityOracle,
};

use crate::config::SimConfig;
use crate::market::{MarketSimulator, MarketTick, TradingPattern};
use crate::scenario::Scenario;
use crate::wallet::{ScheduledTrade, TradeKind};

/// Rolling aggregate-volume horizon for the fee discount, seconds.
const VOLUME_WINDOW_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Counters {
  pub ticks: u64,
  pub price_updates: u64,
  pub price_rejects: u64,
  pub trades_executed: u64,
  pub trades_failed: u64,
  pub trades_expired: u64,
  pub rebalances: u64,
  pub rebalances_rejected: u64,
  pub max_volatility: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimStatus {
  pub now: u64,
  pub running: bool,
  pub scenario: Scenario,
  pub trading_pattern: String,
  pub pool: PoolSnapshot,
  pub oracle: OracleSnapshot,
  pub last_proposal: Option<RebalanceProposal>,
  pub counters: Counters,
}

/// Single-threaded cooperative loop with a fixed tick. Owns every core
/// component and threads values between them; within a tick the order is
/// feed, oracle, scheduled trades, then rebalance.
pub struct SimulationOrchestrator {
  cfg: SimConfig,
  pool: PoolEngine,
  oracle: VolatilityOracle,
  rebalancer: RebalancingEngine,
  fees: FeeManager,
  market: MarketSimulator,
  now: u64,
  running: bool,
  counters: Counters,
  last_proposal: Option<RebalanceProposal>,
  volume_window: VecDeque<(u64, u128)>,
}

impl SimulationOrchestrator {
  pub fn new(cfg: SimConfig) -> anyhow::Result<Self> {
    cfg.validate()?;
    let pair = AssetPair::new(0, 1)?;
    let mut pool = PoolEngine::new(cfg.engine.clone());
    pool.init_pool(pair, cfg.initial_price, &seed_layout(&cfg), 0)?;
    let mut oracle = VolatilityOracle::new(&cfg.engine);
    oracle.init(
      cfg.initial_price,
      cfg.engine.alpha_scaled,
      cfg.engine.window_size,
      0,
    )?;
    let rebalancer = RebalancingEngine::new(&cfg.engine);
    let fees = FeeManager::new(&cfg.engine);
    let market = MarketSimulator::new(cfg.clone(), cfg.scenario(), (0, 1));
    Ok(Self {
      cfg,
      pool,
      oracle,
      rebalancer,
      fees,
      market,
      now: 0,
      running: false,
      counters: Counters::default(),
      last_proposal: None,
      volume_window: VecDeque::new(),
    })
  }

  pub fn start(&mut self) {
    self.running = true;
  }

  pub fn stop(&mut self) {
    self.running = false;
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  pub fn now(&self) -> u64 {
    self.now
  }

  /// One discrete step. Recoverable errors are logged and counted;
  /// only internal invariant violations propagate.
  pub fn tick(&mut self) -> anyhow::Result<()> {
    self.now += self.cfg.tick_seconds;
    let now = self.now;

    let MarketTick { price, volume } = self.market.step(now, self.oracle.current_volatility());
    match self.oracle.update_price(price, volume, now) {
      Ok(()) => {
        self.counters.price_updates += 1;
        self.volume_window.push_back((now, volume));
        while let Some((ts, _)) = self.volume_window.front() {
          if ts + VOLUME_WINDOW_SECS < now {
            self.volume_window.pop_front();
          } else {
            break;
          }
        }
      }
      Err(EngineError::Rejected(reason)) => {
        warn!("price update rejected: {}", reason);
        self.counters.price_rejects += 1;
      }
      Err(e) => return Err(e.into()),
    }
    self.counters.max_volatility = self.counters.max_volatility.max(self.oracle.current_volatility());

    let ttl = 5 * self.cfg.tick_seconds;
    let (due, expired) = self.market.due_trades(now, ttl);
    if expired > 0 {
      debug!("{} scheduled trades expired past the ttl", expired);
      self.counters.trades_expired += expired as u64;
    }
    for trade in due {
      self.execute_trade(trade, now)?;
    }

    if self.oracle.should_rebalance(now) {
      self.try_rebalance(now)?;
    }

    self.counters.ticks += 1;
    Ok(())
  }

  fn execute_trade(&mut self, trade: ScheduledTrade, now: u64) -> anyhow::Result<()> {
    let deadline = now + 30;
    let result = match trade.kind {
      TradeKind::Swap => {
        let depth = self.pool.liquidity_at_price().max(1);
        let quote = self.fees.compute_fee(
          self.oracle.current_volatility(),
          self.volume_24h(),
          depth,
          trade.size,
          None,
        );
        match quote {
          Ok(quote) => self
            .pool
            .swap(
              trade.asset_in,
              trade.size,
              0,
              deadline,
              now,
              quote.total_bps,
              self.cfg.engine.protocol_share_bps,
            )
            .map(|_| ()),
          Err(e) => Err(e),
        }
      }
      TradeKind::AddLiquidity => {
        let target = self
          .pool
          .ranges()
          .iter()
          .filter(|r| r.active)
          .min_by_key(|r| r.center().abs_diff(self.pool.current_price()))
          .map(|r| r.range_id);
        match target {
          Some(range_id) => self
            .pool
            .add_liquidity(
              &trade.wallet,
              range_id,
              trade.size,
              trade.size,
              0,
              0,
              deadline,
              now,
            )
            .map(|_| ()),
          None => Err(EngineError::InsufficientLiquidity),
        }
      }
      TradeKind::RemoveLiquidity => {
        let position = self
          .pool
          .list_positions(&trade.wallet)
          .into_iter()
          .find(|p| p.lp_tokens > 1);
        match position {
          Some(p) => self
            .pool
            .remove_liquidity(&trade.wallet, p.range_id, p.lp_tokens / 2, 0, 0, deadline, now)
            .map(|_| ()),
          None => Err(EngineError::InvalidParams("nothing to remove".to_string())),
        }
      }
    };
    match result {
      Ok(()) => self.counters.trades_executed += 1,
      Err(EngineError::Internal(e)) => {
        anyhow::bail!("fatal internal error while executing a trade: {}", e);
      }
      Err(e) => {
        debug!("trade by {} failed: {}", trade.wallet, e);
        self.counters.trades_failed += 1;
      }
    }
    Ok(())
  }

  fn try_rebalance(&mut self, now: u64) -> anyhow::Result<()> {
    let volatility = self.oracle.current_volatility();
    let price = self.pool.current_price();
    let total = self.pool.total_liquidity();
    if total == 0 {
      return Ok(());
    }
    let proposal = match self.rebalancer.propose(price, volatility, total, now) {
      Ok(p) => p,
      Err(e) => {
        warn!("rebalance proposal failed: {}", e);
        self.counters.rebalances_rejected += 1;
        return Ok(());
      }
    };
    if let Err(e) = self.rebalancer.validate(
      &self.pool.active_range_specs(),
      &proposal.ranges,
      price,
      volatility,
    ) {
      warn!("rebalance proposal invalid: {}", e);
      self.counters.rebalances_rejected += 1;
      return Ok(());
    }
    match self.pool.apply_rebalance(&proposal, now) {
      Ok(()) => {
        self.oracle.mark_rebalance_completed(now);
        let after = self.pool.total_liquidity();
        if after.abs_diff(total) > total / 1_000 {
          anyhow::bail!(
            "liquidity conservation violated by rebalance: {} -> {}",
            total,
            after
          );
        }
        info!(
          "rebalance {}: {} ranges at volatility {}, efficiency {}",
          proposal.proposal_id,
          proposal.ranges.len(),
          common::bps_pct!(volatility / 100),
          common::bps_pct!(proposal.efficiency_score)
        );
        self.counters.rebalances += 1;
        self.last_proposal = Some(proposal);
      }
      Err(EngineError::Internal(e)) => {
        anyhow::bail!("fatal internal error applying rebalance: {}", e);
      }
      Err(e) => {
        warn!("rebalance rejected by pool: {}", e);
        self.counters.rebalances_rejected += 1;
      }
    }
    Ok(())
  }

  fn volume_24h(&self) -> u128 {
    self.volume_window.iter().map(|(_, v)| v).sum()
  }

  pub fn set_scenario(&mut self, name: &str) -> anyhow::Result<()> {
    let scenario = Scenario::from_str(name)?;
    self.market.set_scenario(scenario);
    info!("scenario set to {}", scenario);
    Ok(())
  }

  pub fn set_trading_pattern(&mut self, name: &str) -> anyhow::Result<()> {
    let pattern = TradingPattern::parse(name)?;
    self.market.set_trading_pattern(pattern);
    info!("trading pattern set to {}", pattern.as_str());
    Ok(())
  }

  pub fn inject_price_shock(&mut self, magnitude_bps: i64, duration_s: u64) {
    info!("injecting {} bps shock over {} s", magnitude_bps, duration_s);
    self.market.inject_shock(magnitude_bps, duration_s);
  }

  /// Reseed the simulator and the oracle baseline. Pool balances are
  /// deliberately untouched.
  pub fn reset(&mut self) -> anyhow::Result<()> {
    self.market.reset();
    let mut oracle = VolatilityOracle::new(&self.cfg.engine);
    oracle.init(
      self.pool.current_price(),
      self.cfg.engine.alpha_scaled,
      self.cfg.engine.window_size,
      self.now,
    )?;
    self.oracle = oracle;
    self.counters = Counters::default();
    self.last_proposal = None;
    self.volume_window.clear();
    info!("simulator reset at t={}", self.now);
    Ok(())
  }

  pub fn get_status(&self) -> SimStatus {
    SimStatus {
      now: self.now,
      running: self.running,
      scenario: self.market.scenario(),
      trading_pattern: self.market.pattern().as_str().to_string(),
      pool: self.pool.snapshot(),
      oracle: self.oracle.snapshot(),
      last_proposal: self.last_proposal.clone(),
      counters: self.counters,
    }
  }
}

/// Concentric seed bands around the initial price: tight, medium, wide,
/// each holding a third of the configured liquidity.
fn seed_layout(cfg: &SimConfig) -> Vec<RangeSpec> {
  let p = cfg.initial_price;
  let third = cfg.initial_liquidity / 3;
  vec![
    RangeSpec {
      price_lower: p * 95 / 100,
      price_upper: p * 105 / 100,
      liquidity: third,
    },
    RangeSpec {
      price_lower: p * 85 / 100,
      price_upper: p * 115 / 100,
      liquidity: third,
    },
    RangeSpec {
      price_lower: p * 70 / 100,
      price_upper: p * 130 / 100,
      liquidity: cfg.initial_liquidity - 2 * third,
    },
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  fn orchestrator(scenario: &str, seed: u64) -> SimulationOrchestrator {
    let cfg = SimConfig {
      scenario: scenario.to_string(),
      seed,
      ..SimConfig::default()
    };
    SimulationOrchestrator::new(cfg).unwrap()
  }

  #[test]
  fn flash_crash_drives_a_high_concentration_rebalance() {
    let mut sim = orchestrator("flash_crash", 7);
    sim.start();
    for _ in 0..120 {
      sim.tick().expect("no internal errors during the crash run");
      // the range-sum invariant holds at every snapshot
      let snap = sim.get_status().pool;
      let sum: u128 = snap
        .ranges
        .iter()
        .filter(|r| r.active)
        .map(|r| r.liquidity)
        .sum();
      assert_eq!(sum, snap.total_liquidity);
    }
    let status = sim.get_status();
    assert!(status.counters.rebalances >= 1, "crash must trigger a rebalance");
    assert!(
      status.counters.max_volatility >= 60_000,
      "crash must escalate measured volatility, got {}",
      status.counters.max_volatility
    );
    let (concentration, _) =
      RebalancingEngine::concentration_for(status.counters.max_volatility);
    assert!(concentration >= 18_000);
  }

  #[test]
  fn runs_are_deterministic_per_seed() {
    let mut a = orchestrator("volatile", 21);
    let mut b = orchestrator("volatile", 21);
    for _ in 0..60 {
      a.tick().unwrap();
      b.tick().unwrap();
    }
    let sa = serde_json::to_string(&a.get_status()).unwrap();
    let sb = serde_json::to_string(&b.get_status()).unwrap();
    assert_eq!(sa, sb);
  }

  #[test]
  fn controls_mutate_only_simulator_and_oracle() {
    let mut sim = orchestrator("normal", 3);
    sim.start();
    for _ in 0..30 {
      sim.tick().unwrap();
    }
    let pool_before = serde_json::to_string(&sim.get_status().pool).unwrap();

    sim.set_scenario("whale_activity").unwrap();
    sim.set_trading_pattern("bot_heavy").unwrap();
    sim.inject_price_shock(-1_000, 10);
    sim.reset().unwrap();

    let pool_after = serde_json::to_string(&sim.get_status().pool).unwrap();
    assert_eq!(pool_before, pool_after, "controls must not touch pool state");
    assert!(sim.set_scenario("sideways").is_err());
    assert!(sim.set_trading_pattern("nobody").is_err());
  }

  #[test]
  fn shock_shows_up_in_the_oracle_feed() {
    let mut sim = orchestrator("calm", 13);
    sim.start();
    for _ in 0..10 {
      sim.tick().unwrap();
    }
    let price_before = sim.get_status().oracle.last_price;
    sim.inject_price_shock(-2_000, 5);
    for _ in 0..5 {
      sim.tick().unwrap();
    }
    let price_after = sim.get_status().oracle.last_price;
    assert!(price_after < price_before, "a negative shock must move the feed down");
  }

  #[test]
  fn long_runs_keep_the_loop_healthy() {
    let mut sim = orchestrator("volatile", 99);
    sim.start();
    for _ in 0..600 {
      sim.tick().unwrap();
    }
    let status = sim.get_status();
    assert_eq!(status.counters.ticks, 600);
    assert!(status.counters.trades_executed > 0, "wallets must reach the pool");
    assert!(status.counters.price_updates > 0);
    // the volatile market should have forced at least one relayout
    assert!(status.counters.rebalances >= 1);
  }
}
