//! Read-only views for observers. Scaled integers serialize as decimal
//! strings so JSON consumers never round through floats.

use serde::{Deserialize, Serialize};

use crate::oracle::Regime;

pub mod u128_string {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&v.to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

pub mod i128_string {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(v: &i128, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&v.to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i128, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSnapshot {
  pub range_id: u64,
  #[serde(with = "u128_string")]
  pub price_lower: u128,
  #[serde(with = "u128_string")]
  pub price_upper: u128,
  #[serde(with = "u128_string")]
  pub liquidity: u128,
  #[serde(with = "u128_string")]
  pub reserve_x: u128,
  #[serde(with = "u128_string")]
  pub reserve_y: u128,
  #[serde(with = "u128_string")]
  pub lp_issued: u128,
  #[serde(with = "u128_string")]
  pub fees_accrued_x: u128,
  #[serde(with = "u128_string")]
  pub fees_accrued_y: u128,
  pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
  pub asset_x: u32,
  pub asset_y: u32,
  #[serde(with = "u128_string")]
  pub current_price: u128,
  #[serde(with = "u128_string")]
  pub total_liquidity: u128,
  #[serde(with = "u128_string")]
  pub protocol_fees_x: u128,
  #[serde(with = "u128_string")]
  pub protocol_fees_y: u128,
  pub last_rebalance_time: u64,
  pub ranges: Vec<RangeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSnapshot {
  #[serde(with = "u128_string")]
  pub volatility: u128,
  pub regime: Regime,
  #[serde(with = "u128_string")]
  pub last_price: u128,
  pub last_update_time: u64,
  pub window_len: usize,
  #[serde(with = "i128_string")]
  pub ewma_mean: i128,
  #[serde(with = "i128_string")]
  pub ewma_variance: i128,
  pub last_rebalance_time: u64,
  #[serde(with = "u128_string")]
  pub last_rebalance_volatility: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
  pub range_id: u64,
  #[serde(with = "u128_string")]
  pub lp_tokens: u128,
  #[serde(with = "u128_string")]
  pub unclaimed_x: u128,
  #[serde(with = "u128_string")]
  pub unclaimed_y: u128,
}
