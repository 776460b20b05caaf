#![allow(dead_code)]

use std::time::Duration;

use log::info;

use common::init_logger;
use config::SimConfig;
use orchestrator::SimulationOrchestrator;

mod config;
mod market;
mod orchestrator;
mod scenario;
mod wallet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenv::dotenv().ok();
  init_logger();

  let cfg = SimConfig::read()?;
  info!(
    "starting {} run: {} ticks of {}s, seed {}",
    cfg.scenario, cfg.duration_ticks, cfg.tick_seconds, cfg.seed
  );

  let mut sim = SimulationOrchestrator::new(cfg.clone())?;
  sim.start();
  for _ in 0..cfg.duration_ticks {
    if !sim.is_running() {
      break;
    }
    sim.tick()?;
    if cfg.realtime {
      tokio::time::sleep(Duration::from_secs(cfg.tick_seconds)).await;
    }
  }
  sim.stop();

  let status = sim.get_status();
  info!(
    "run complete: {} ticks, {} trades executed, {} rebalances, {} rejects",
    status.counters.ticks,
    status.counters.trades_executed,
    status.counters.rebalances,
    status.counters.price_rejects
  );
  println!("{}", serde_json::to_string_pretty(&status)?);
  Ok(())
}
