use std::fmt::Display;
use std::str::FromStr;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use engine::{mul_bps, PRICE_SCALE};

/// Closed scenario set. Unknown names are a hard error at the control
/// surface, not a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
  Normal,
  Volatile,
  Calm,
  Trending,
  FlashCrash,
  WhaleActivity,
}

impl Scenario {
  pub const ALL: [Scenario; 6] = [
    Scenario::Normal,
    Scenario::Volatile,
    Scenario::Calm,
    Scenario::Trending,
    Scenario::FlashCrash,
    Scenario::WhaleActivity,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Scenario::Normal => "normal",
      Scenario::Volatile => "volatile",
      Scenario::Calm => "calm",
      Scenario::Trending => "trending",
      Scenario::FlashCrash => "flash_crash",
      Scenario::WhaleActivity => "whale_activity",
    }
  }

  pub fn params(&self) -> ScenarioParams {
    match self {
      Scenario::Normal => ScenarioParams {
        base_vol: 0.02,
        drift: 0.0001,
        jump_intensity: 0.0,
        jump_mean: 0.0,
        mean_reversion: 0.0,
        garch: false,
        volume_spike_mult: 1.0,
        down_bias: 0.5,
      },
      Scenario::Volatile => ScenarioParams {
        base_vol: 0.05,
        drift: 0.0,
        jump_intensity: 0.1,
        jump_mean: 0.0,
        mean_reversion: 0.0,
        garch: true,
        volume_spike_mult: 1.0,
        down_bias: 0.5,
      },
      Scenario::Calm => ScenarioParams {
        base_vol: 0.005,
        drift: 0.0,
        jump_intensity: 0.0,
        jump_mean: 0.0,
        mean_reversion: 0.1,
        garch: false,
        volume_spike_mult: 1.0,
        down_bias: 0.5,
      },
      Scenario::Trending => ScenarioParams {
        base_vol: 0.015,
        drift: 0.001,
        jump_intensity: 0.0,
        jump_mean: 0.0,
        mean_reversion: 0.0,
        garch: false,
        volume_spike_mult: 1.0,
        down_bias: 0.4,
      },
      Scenario::FlashCrash => ScenarioParams {
        base_vol: 0.02,
        drift: 0.0,
        jump_intensity: 0.1,
        jump_mean: -0.10,
        mean_reversion: 0.0,
        garch: false,
        volume_spike_mult: 1.0,
        down_bias: 0.8,
      },
      Scenario::WhaleActivity => ScenarioParams {
        base_vol: 0.03,
        drift: 0.0,
        jump_intensity: 0.0,
        jump_mean: 0.0,
        mean_reversion: 0.0,
        garch: false,
        volume_spike_mult: 10.0,
        down_bias: 0.5,
      },
    }
  }
}

impl FromStr for Scenario {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Scenario::ALL
      .iter()
      .copied()
      .find(|sc| sc.as_str() == s)
      .ok_or_else(|| anyhow::anyhow!("unknown scenario: {}", s))
  }
}

impl Display for Scenario {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Per-scenario model parameters. Volatilities and drifts are per-tick
/// fractions; `down_bias` is the probability a simulated trade pushes the
/// price down.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioParams {
  pub base_vol: f64,
  pub drift: f64,
  pub jump_intensity: f64,
  pub jump_mean: f64,
  pub mean_reversion: f64,
  pub garch: bool,
  pub volume_spike_mult: f64,
  pub down_bias: f64,
}

/// GARCH(1,1) weights for scenarios with clustering volatility.
const GARCH_ALPHA: f64 = 0.1;
const GARCH_BETA: f64 = 0.85;

/// Largest per-tick move the feed will emit, comfortably inside the
/// oracle's 30% jump gate.
const MAX_TICK_MOVE_BPS: i64 = 2_500;

const BASE_VOLUME: u128 = 50_000;

/// Latent price process. The stochastic draw happens in f64; the drawn
/// increment is applied to the scaled-integer price in basis points so
/// downstream consumers never see floats.
#[derive(Debug, Clone)]
pub struct PriceModel {
  scenario: Scenario,
  params: ScenarioParams,
  price: u128,
  initial_price: u128,
  /// anchor for mean-reverting scenarios
  anchor: u128,
  /// latent per-tick sigma, fraction
  vol: f64,
  last_eps: f64,
  shock_bps_per_tick: i64,
  shock_ticks_left: u64,
}

impl PriceModel {
  pub fn new(scenario: Scenario, initial_price: u128) -> Self {
    let params = scenario.params();
    Self {
      scenario,
      params,
      price: initial_price,
      initial_price,
      anchor: initial_price,
      vol: params.base_vol,
      last_eps: 0.0,
      shock_bps_per_tick: 0,
      shock_ticks_left: 0,
    }
  }

  pub fn scenario(&self) -> Scenario {
    self.scenario
  }

  pub fn params(&self) -> ScenarioParams {
    self.params
  }

  pub fn price(&self) -> u128 {
    self.price
  }

  pub fn latent_volatility(&self) -> f64 {
    self.vol
  }

  pub fn set_scenario(&mut self, scenario: Scenario) {
    self.scenario = scenario;
    self.params = scenario.params();
    self.vol = self.params.base_vol;
    self.last_eps = 0.0;
    self.anchor = self.price;
  }

  pub fn reset(&mut self) {
    let scenario = self.scenario;
    *self = PriceModel::new(scenario, self.initial_price);
  }

  /// Spread a shock over the coming ticks as extra drift.
  pub fn inject_shock(&mut self, magnitude_bps: i64, duration_ticks: u64) {
    let ticks = duration_ticks.max(1);
    self.shock_bps_per_tick = magnitude_bps / ticks as i64;
    self.shock_ticks_left = ticks;
  }

  /// Advance one tick, producing the next (price, volume) observation.
  pub fn step(&mut self, rng: &mut StdRng) -> (u128, u128) {
    let z = Normal::new(0.0, 1.0)
      .expect("unit normal is well formed")
      .sample(rng);

    if self.params.garch {
      let long_run = self.params.base_vol * self.params.base_vol;
      let omega = long_run * (1.0 - GARCH_ALPHA - GARCH_BETA);
      let var =
        omega + GARCH_ALPHA * self.last_eps * self.last_eps + GARCH_BETA * self.vol * self.vol;
      self.vol = var.sqrt();
    } else {
      // decay any panic spike back toward the scenario baseline
      self.vol = self.params.base_vol + (self.vol - self.params.base_vol) * 0.9;
    }

    let mut ret = self.params.drift + self.vol * z;
    if self.params.mean_reversion > 0.0 {
      let gap = self.anchor as f64 / self.price.max(1) as f64 - 1.0;
      ret += self.params.mean_reversion * gap;
    }
    if self.params.jump_intensity > 0.0 && rng.gen::<f64>() < self.params.jump_intensity {
      let jump = Normal::new(self.params.jump_mean, self.vol.max(0.01))
        .expect("jump distribution is well formed")
        .sample(rng);
      ret += jump;
      // a jump leaves panic volatility behind
      self.vol = (self.vol * 5.0).min(0.15);
    }
    if self.shock_ticks_left > 0 {
      ret += self.shock_bps_per_tick as f64 / 10_000.0;
      self.shock_ticks_left -= 1;
    }
    self.last_eps = ret - self.params.drift;

    let ret_bps = ((ret * 10_000.0) as i64).clamp(-MAX_TICK_MOVE_BPS, MAX_TICK_MOVE_BPS);
    let delta = mul_bps(self.price, ret_bps.unsigned_abs() as u64);
    self.price = if ret_bps >= 0 {
      self.price.saturating_add(delta)
    } else {
      self.price.saturating_sub(delta).max(PRICE_SCALE / 1_000)
    };

    let mut volume = BASE_VOLUME + ret_bps.unsigned_abs() as u128 * 1_000;
    if self.params.volume_spike_mult > 1.0 && rng.gen::<f64>() < 0.1 {
      volume = (volume as f64 * self.params.volume_spike_mult) as u128;
    }
    (self.price, volume)
  }
}
