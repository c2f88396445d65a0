//! Error types for the Tenor ledger.
use thiserror::Error;

use crate::types::{AccountId, AssetId, PositionId, TierKey};

/// Failures reported by a custody collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("vault underfunded for {asset}: have {have}, need {need}")] VaultUnderfunded { asset: AssetId, have: u128, need: u128 },
    #[error("transfer rejected: {0}")] Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config source: {0}")] Source(String),
}

/// Every way a ledger operation can fail. Each kind is distinct so callers
/// can report a precise reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid asset: {0}")] InvalidAsset(AssetId),
    #[error("invalid amount: {0}")] InvalidAmount(String),
    #[error("invalid duration {duration}s for asset {asset}")] InvalidDuration { asset: AssetId, duration: u64 },
    #[error("position {id} immature: matures at {maturity}, now {now}")] Immature { id: PositionId, maturity: u64, now: u64 },
    #[error("no active liquidity in tier {0}")] NoActiveLiquidity(TierKey),
    #[error("maturity timestamp overflow: {0}")] MaturityOverflow(u128),
    #[error("bucket day {day} is in the future (today {today})")] FutureBucket { day: u64, today: u64 },
    #[error("operation disabled: {0}")] OperationDisabled(&'static str),
    #[error("unauthorized: {account} may not {action}")] Unauthorized { account: AccountId, action: &'static str },
    #[error("tier not found: {0}")] TierNotFound(TierKey),
    #[error("position not found: {0}")] PositionNotFound(PositionId),
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("catch-up incomplete for tier {tier}: {remaining_days} days remaining")] CatchUpIncomplete { tier: TierKey, remaining_days: u64 },
    #[error("re-entrant call during an external collaborator call")] Reentrancy,
    #[error("snapshot: {0}")] Snapshot(String),
    #[error(transparent)] Custody(#[from] CustodyError),
}

impl LedgerError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAsset(_) => "InvalidAsset",
            Self::InvalidAmount(_) => "InvalidAmount",
            Self::InvalidDuration { .. } => "InvalidDuration",
            Self::Immature { .. } => "Immature",
            Self::NoActiveLiquidity(_) => "NoActiveLiquidity",
            Self::MaturityOverflow(_) => "MaturityOverflow",
            Self::FutureBucket { .. } => "FutureBucket",
            Self::OperationDisabled(_) => "OperationDisabled",
            Self::Unauthorized { .. } => "Unauthorized",
            Self::TierNotFound(_) => "TierNotFound",
            Self::PositionNotFound(_) => "PositionNotFound",
            Self::ArithmeticOverflow => "ArithmeticOverflow",
            Self::CatchUpIncomplete { .. } => "CatchUpIncomplete",
            Self::Reentrancy => "Reentrancy",
            Self::Snapshot(_) => "Snapshot",
            Self::Custody(_) => "Custody",
        }
    }
}
