//! # tenor-ledger — Day-bucketed yield accrual with lazy maturity catch-up.
//!
//! All arithmetic is integer-only for determinism.
//!
//! Positions lock principal in a (asset, duration) tier. Rewards deposited to
//! a tier are spread over its active liquidity through a Q128.128
//! accumulator, so accrual costs O(1) per deposit however many positions
//! exist. Positions maturing on the same day share a bucket; when the bucket
//! matures its principal stops counting as active and its positions stop
//! accruing, again in O(1) per bucket.
//!
//! - [`tier`]: registry entries, flags and per-tier totals.
//! - [`accumulator`]: the monotone reward-per-unit accumulator.
//! - [`bucket`]: per-day maturity buckets and the freeze on maturation.
//! - [`position`]: position records and settlement.
//! - [`maturation`]: bucket maturation and the bounded catch-up walk.
//! - [`ledger`]: the atomic, serialized operations tying it together.

pub mod accumulator;
pub mod bucket;
pub mod config;
mod journal;
pub mod ledger;
pub mod maturation;
pub mod position;
pub mod snapshot;
pub mod tier;

pub use bucket::Bucket;
pub use config::LedgerConfig;
pub use ledger::{CloseReceipt, Collaborators, Ledger, RewardReceipt};
pub use maturation::CatchUpReport;
pub use position::Position;
pub use snapshot::LedgerSnapshot;
pub use tier::{RetogglePolicy, Tier, TierTotals};
