use engine::*;

const P: u128 = PRICE_SCALE;

/// The three concentric seed bands: tight, medium, wide.
fn seed_ranges() -> Vec<RangeSpec> {
  vec![
    RangeSpec {
      price_lower: P * 95 / 100,
      price_upper: P * 105 / 100,
      liquidity: 10_000_000,
    },
    RangeSpec {
      price_lower: P * 85 / 100,
      price_upper: P * 115 / 100,
      liquidity: 10_000_000,
    },
    RangeSpec {
      price_lower: P * 70 / 100,
      price_upper: P * 130 / 100,
      liquidity: 10_000_000,
    },
  ]
}

fn seed_pool() -> PoolEngine {
  let mut pool = PoolEngine::new(EngineConfig::default());
  pool
    .init_pool(AssetPair::new(0, 1).unwrap(), P, &seed_ranges(), 0)
    .unwrap();
  pool
}

fn assert_position_supply(pool: &PoolEngine, owners: &[&str]) {
  let snap = pool.snapshot();
  for range in &snap.ranges {
    let total: u128 = owners
      .iter()
      .flat_map(|o| pool.list_positions(o))
      .filter(|p| p.range_id == range.range_id)
      .map(|p| p.lp_tokens)
      .sum();
    assert_eq!(
      total, range.lp_issued,
      "position supply mismatch in range {}",
      range.range_id
    );
  }
}

#[test]
fn init_and_quote() -> anyhow::Result<()> {
  let pool = seed_pool();
  assert_eq!(pool.total_liquidity(), 30_000_000);

  let (amount_out, impact_bps, fee_bps) = pool.quote_swap(0, 100_000)?;
  assert_eq!(amount_out, 98_715);
  assert!(amount_out > 0);
  assert!(impact_bps <= 50);
  assert_eq!(fee_bps, 30);
  Ok(())
}

#[test]
fn init_rejects_reuse_and_bad_ranges() {
  let mut pool = seed_pool();
  assert_eq!(
    pool.init_pool(AssetPair::new(0, 1).unwrap(), P, &seed_ranges(), 0),
    Err(EngineError::AlreadyInitialized)
  );

  let mut fresh = PoolEngine::new(EngineConfig::default());
  let degenerate = vec![RangeSpec {
    price_lower: P,
    price_upper: P,
    liquidity: 10_000_000,
  }];
  assert!(matches!(
    fresh.init_pool(AssetPair::new(0, 1).unwrap(), P, &degenerate, 0),
    Err(EngineError::InvalidRange(_))
  ));
  assert!(AssetPair::new(3, 3).is_err());
  assert!(AssetPair::new(4, 2).is_err());

  // keep the seeded pool usable
  assert!(pool.quote_swap(0, 1_000).is_ok());
}

#[test]
fn volatility_escalation_triggers_rebalance() {
  let mut pool = seed_pool();
  let cfg = EngineConfig::default();
  let mut oracle = VolatilityOracle::new(&cfg);
  oracle.init(P, 3 * VOL_SCALE / 10, 10, 0).unwrap();

  let prices = [100u128, 100, 101, 99, 105, 95, 108, 92, 110, 90];
  for (i, p) in prices.iter().enumerate() {
    oracle
      .update_price(p * P / 100, 1_000, i as u64 + 1)
      .unwrap();
  }
  let vol = oracle.current_volatility();
  assert!(vol >= 60_000);
  assert!(oracle.should_rebalance(10));

  let (concentration, num_ranges) = RebalancingEngine::concentration_for(vol);
  assert!(concentration >= 18_000);

  let mut engine = RebalancingEngine::new(&cfg);
  let proposal = engine
    .propose(pool.current_price(), vol, pool.total_liquidity(), 10)
    .unwrap();
  assert_eq!(proposal.ranges.len(), num_ranges);

  let gain = engine
    .validate(
      &pool.active_range_specs(),
      &proposal.ranges,
      pool.current_price(),
      vol,
    )
    .unwrap();
  assert!(gain >= 0);

  pool.apply_rebalance(&proposal, 10).unwrap();
  oracle.mark_rebalance_completed(10);

  let snap = pool.snapshot();
  assert_eq!(snap.ranges.len(), num_ranges);
  assert_eq!(snap.total_liquidity, 30_000_000);
  // rebalanced layouts are flat partitions
  for pair in snap.ranges.windows(2) {
    assert!(pair[0].price_upper <= pair[1].price_lower);
  }
  assert_position_supply(&pool, &["genesis"]);
}

#[test]
fn slippage_guard_leaves_state_untouched() {
  let mut pool = seed_pool();
  let before = serde_json::to_string(&pool.snapshot()).unwrap();
  let result = pool.swap(0, 5_000_000, u128::MAX / 2, 60, 0, 30, 1_000);
  assert!(matches!(result, Err(EngineError::SlippageExceeded { .. })));
  let after = serde_json::to_string(&pool.snapshot()).unwrap();
  assert_eq!(before, after);
}

#[test]
fn lp_round_trip_within_one_unit() {
  let mut pool = seed_pool();
  let owner = "wallet-7";
  let (x, y, lp) = pool
    .add_liquidity(owner, 2, 1_000_000, 1_000_000, 990_000, 990_000, 60, 0)
    .unwrap();
  assert!(lp > 0);
  assert_eq!((x, y), (1_000_000, 1_000_000));
  assert_position_supply(&pool, &["genesis", owner]);

  let (x_back, y_back) = pool
    .remove_liquidity(owner, 2, lp, 990_000, 990_000, 60, 0)
    .unwrap();
  assert!(x.abs_diff(x_back) <= 1);
  assert!(y.abs_diff(y_back) <= 1);
  assert!(pool.list_positions(owner).is_empty());
}

#[test]
fn swap_moves_price_and_reserves_consistently() {
  let mut pool = seed_pool();
  let before = pool.snapshot();
  let out = pool.swap(0, 1_000_000, 0, 60, 0, 30, 1_000).unwrap();
  assert!(out > 0);
  let after = pool.snapshot();

  assert!(after.current_price > before.current_price);
  let rx_before: u128 = before.ranges.iter().map(|r| r.reserve_x).sum();
  let rx_after: u128 = after.ranges.iter().map(|r| r.reserve_x).sum();
  let ry_before: u128 = before.ranges.iter().map(|r| r.reserve_y).sum();
  let ry_after: u128 = after.ranges.iter().map(|r| r.reserve_y).sum();
  assert!(rx_after > rx_before, "input reserve must grow");
  assert!(ry_after < ry_before, "output reserve must shrink");
  assert_eq!(ry_before - ry_after, out);
  // liquidity is untouched by swaps
  assert_eq!(after.total_liquidity, before.total_liquidity);

  // the reverse direction moves the price back down
  let price_mid = pool.current_price();
  pool.swap(1, 1_000_000, 0, 60, 1, 30, 1_000).unwrap();
  assert!(pool.current_price() < price_mid);
}

#[test]
fn bigger_swaps_pay_more_and_move_more() {
  let pool = seed_pool();
  let (out_small, impact_small, _) = pool.quote_swap(0, 100_000).unwrap();
  let (out_big, impact_big, _) = pool.quote_swap(0, 10_000_000).unwrap();
  assert!(out_big > out_small);
  assert!(impact_big >= impact_small);
}

#[test]
fn swap_guards() {
  let mut pool = seed_pool();
  assert!(matches!(
    pool.swap(0, 0, 0, 60, 0, 30, 1_000),
    Err(EngineError::InvalidParams(_))
  ));
  assert_eq!(
    pool.swap(0, 1_000, 0, 10, 20, 30, 1_000),
    Err(EngineError::DeadlineExpired)
  );
  assert_eq!(
    pool.swap(9, 1_000, 0, 60, 0, 30, 1_000),
    Err(EngineError::InvalidAsset(9))
  );
  // beyond the capacity of every range in the trade direction
  assert_eq!(
    pool.swap(0, 400_000_000, 0, 60, 0, 30, 1_000),
    Err(EngineError::InsufficientLiquidity)
  );
}

#[test]
fn fees_accrue_to_lps_and_protocol() {
  let mut pool = seed_pool();
  pool.swap(0, 100_000, 0, 60, 0, 30, 1_000).unwrap();

  let snap = pool.snapshot();
  // 30 bps of 100_000 is 300; 10% of that to the protocol
  assert_eq!(snap.protocol_fees_x, 30);
  let accrued: u128 = snap.ranges.iter().map(|r| r.fees_accrued_x).sum();
  assert_eq!(accrued, 270);

  // the genesis LP of the consumed range can claim its share
  let positions = pool.list_positions("genesis");
  let earning = positions.iter().find(|p| p.unclaimed_x > 0).unwrap();
  let (fees_x, fees_y) = pool.claim_fees("genesis", earning.range_id).unwrap();
  assert_eq!(fees_x, earning.unclaimed_x);
  assert_eq!(fees_y, 0);
  // second claim pays nothing
  let (again, _) = pool.claim_fees("genesis", earning.range_id).unwrap();
  assert_eq!(again, 0);
}

#[test]
fn rebalance_is_atomic_on_invalid_proposals() {
  let mut pool = seed_pool();
  let before = serde_json::to_string(&pool.snapshot()).unwrap();

  let mut bad = RebalanceProposal {
    proposal_id: 99,
    ranges: vec![
      RangeSpec {
        price_lower: P * 9 / 10,
        price_upper: P,
        liquidity: 20_000_000,
      },
      RangeSpec {
        price_lower: P,
        price_upper: P * 11 / 10,
        liquidity: 5_000_000,
      },
    ],
    trigger_volatility: 50_000,
    efficiency_score: 0,
    created_at: 5,
  };
  // 25M vs 30M breaks conservation
  assert!(matches!(
    pool.apply_rebalance(&bad, 5),
    Err(EngineError::InvalidProposal(_))
  ));

  // overlapping layout is rejected even when conserving
  bad.ranges[0].liquidity = 20_000_000;
  bad.ranges[1].liquidity = 10_000_000;
  bad.ranges[1].price_lower = P * 95 / 100;
  assert!(matches!(
    pool.apply_rebalance(&bad, 5),
    Err(EngineError::InvalidProposal(_))
  ));

  let after = serde_json::to_string(&pool.snapshot()).unwrap();
  assert_eq!(before, after);
}

#[test]
fn genesis_deposit_after_rebalance_locks_floor() {
  let mut pool = seed_pool();
  let cfg = EngineConfig::default();
  let mut engine = RebalancingEngine::new(&cfg);
  let proposal = engine
    .propose(pool.current_price(), 130_000, pool.total_liquidity(), 10)
    .unwrap();
  pool.apply_rebalance(&proposal, 10).unwrap();

  // concentric seed positions collapse onto the price-closest range,
  // leaving the outer ranges with no lp issued
  let snap = pool.snapshot();
  let empty = snap
    .ranges
    .iter()
    .find(|r| r.lp_issued == 0)
    .expect("some rebalanced range has no positions");

  let owner = "wallet-1";
  let (_, _, lp) = pool
    .add_liquidity(owner, empty.range_id, 4_000_000, 1_000_000, 0, 0, 60, 11)
    .unwrap();
  // sqrt(4e6 * 1e6) = 2e6, minus the locked floor
  assert_eq!(lp, 2_000_000 - 1_000);
  assert_position_supply(&pool, &["genesis", owner]);
}

#[test]
fn remove_below_floor_deactivates_range() {
  let mut pool = PoolEngine::new(EngineConfig::default());
  pool
    .init_pool(
      AssetPair::new(0, 1).unwrap(),
      P,
      &[RangeSpec {
        price_lower: P * 9 / 10,
        price_upper: P * 11 / 10,
        liquidity: 2_000,
      }],
      0,
    )
    .unwrap();
  pool
    .remove_liquidity("genesis", 1, 1_500, 0, 0, 60, 0)
    .unwrap();
  let snap = pool.snapshot();
  assert!(!snap.ranges[0].active);
  assert_eq!(pool.total_liquidity(), 0);
}
