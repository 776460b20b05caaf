use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;
use engine::{EngineConfig, PRICE_SCALE};

/// Run configuration: a yaml file next to the manifest for the stable
/// knobs, environment variables for the ones that change per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
  pub scenario: String,
  pub seed: u64,
  pub tick_seconds: u64,
  pub duration_ticks: u64,
  /// pace ticks against the wall clock instead of free-running
  pub realtime: bool,
  pub initial_price: u128,
  pub initial_liquidity: u128,
  pub retail_wallets: usize,
  pub whale_wallets: usize,
  pub bot_wallets: usize,
  /// volatility (VOL_SCALE) wallets consider normal
  pub baseline_volatility: u128,
  pub engine: EngineConfig,
}

impl Default for SimConfig {
  fn default() -> Self {
    Self {
      scenario: "normal".to_string(),
      seed: 42,
      tick_seconds: 1,
      duration_ticks: 600,
      realtime: false,
      initial_price: PRICE_SCALE,
      initial_liquidity: 30_000_000,
      retail_wallets: 6,
      whale_wallets: 2,
      bot_wallets: 2,
      baseline_volatility: 20_000,
      engine: EngineConfig::default(),
    }
  }
}

impl SimConfig {
  pub fn read() -> anyhow::Result<Self> {
    let path = PathBuf::from(format!("{}/config.yaml", env!("CARGO_MANIFEST_DIR")));
    let mut cfg: SimConfig = if path.exists() {
      let contents = String::from_utf8(std::fs::read(&path)?)?;
      serde_yaml::from_str(&contents)?
    } else {
      SimConfig::default()
    };
    if let Ok(s) = std::env::var("SELTRA_SCENARIO") {
      cfg.scenario = s;
    }
    if let Ok(s) = std::env::var("SELTRA_SEED") {
      cfg.seed = s.parse()?;
    }
    if let Ok(s) = std::env::var("SELTRA_TICKS") {
      cfg.duration_ticks = s.parse()?;
    }
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> anyhow::Result<()> {
    Scenario::from_str(&self.scenario)?;
    if self.tick_seconds == 0 {
      anyhow::bail!("tick_seconds must be positive");
    }
    if self.initial_price == 0 {
      anyhow::bail!("initial_price must be positive");
    }
    if self.initial_liquidity < 3 * self.engine.min_liquidity {
      anyhow::bail!(
        "initial_liquidity {} cannot seed three ranges above the floor",
        self.initial_liquidity
      );
    }
    Ok(())
  }

  pub fn scenario(&self) -> Scenario {
    // validated at load time
    Scenario::from_str(&self.scenario).unwrap_or(Scenario::Normal)
  }
}
