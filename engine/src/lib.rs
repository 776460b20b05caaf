pub use config::*;
pub use error::*;
pub use fees::*;
pub use fixed_point::*;
pub use oracle::*;
pub use pool::*;
pub use rebalance::*;
pub use snapshot::*;

pub mod config;
pub mod error;
pub mod fees;
pub mod fixed_point;
pub mod oracle;
pub mod pool;
pub mod rebalance;
pub mod snapshot;
