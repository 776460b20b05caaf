use thiserror::Error;

/// Failures of the scaled-integer primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
  #[error("arithmetic overflow")]
  Overflow,
  #[error("division by zero")]
  DivByZero,
}

/// Why the oracle refused a price update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
  #[error("oracle not initialized")]
  NotInitialized,
  #[error("price is zero")]
  ZeroPrice,
  #[error("timestamp {ts} not after last update {last}")]
  StaleTimestamp { ts: u64, last: u64 },
  #[error("price jump {jump_bps} bps exceeds limit {limit_bps} bps")]
  JumpTooLarge { jump_bps: u64, limit_bps: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
  #[error("invalid params: {0}")]
  InvalidParams(String),
  #[error("already initialized")]
  AlreadyInitialized,
  #[error("not initialized")]
  NotInitialized,
  #[error("deadline expired")]
  DeadlineExpired,
  #[error("slippage exceeded: {out} below minimum {min_out}")]
  SlippageExceeded { out: u128, min_out: u128 },
  #[error("insufficient liquidity")]
  InsufficientLiquidity,
  #[error("invalid asset {0}")]
  InvalidAsset(u32),
  #[error("invalid range: {0}")]
  InvalidRange(String),
  #[error("invalid proposal: {0}")]
  InvalidProposal(String),
  #[error("rebalance too soon")]
  RebalanceTooSoon,
  #[error("price update rejected: {0}")]
  Rejected(RejectReason),
  #[error("internal error: {0}")]
  Internal(String),
}

impl From<MathError> for EngineError {
  fn from(e: MathError) -> Self {
    EngineError::Internal(e.to_string())
  }
}

pub type EngineResult<T> = Result<T, EngineError>;
