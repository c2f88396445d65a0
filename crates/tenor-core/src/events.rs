//! Observable ledger events.
//!
//! Events exist for external indexing only; no engine decision depends on
//! them. They are delivered to the [`EventSink`](crate::traits::EventSink)
//! after the producing operation commits, in production order.

use serde::{Deserialize, Serialize};

use crate::fixed::Q128;
use crate::types::{AccountId, Amount, AssetId, PositionId, TierKey, Timestamp};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    AssetRegistered {
        asset: AssetId,
    },
    TierUpdated {
        tier: TierKey,
        supported: bool,
        mint_enabled: bool,
        created: bool,
    },
    PositionOpened {
        id: PositionId,
        owner: AccountId,
        tier: TierKey,
        principal: Amount,
        maturity: Timestamp,
        accumulator_snapshot: Q128,
    },
    RewardsDeposited {
        tier: TierKey,
        rewarder: AccountId,
        amount: Amount,
        active_liquidity: Amount,
        accumulator: Q128,
    },
    BucketMatured {
        tier: TierKey,
        day: Timestamp,
        liquidity: Amount,
        frozen_accumulator: Q128,
    },
    FeesCollected {
        id: PositionId,
        recipient: AccountId,
        amount: Amount,
    },
    PositionClosed {
        id: PositionId,
        recipient: AccountId,
        principal: Amount,
        rewards: Amount,
    },
    YieldCollectionToggled {
        enabled: bool,
    },
}

impl LedgerEvent {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssetRegistered { .. } => "asset_registered",
            Self::TierUpdated { .. } => "tier_updated",
            Self::PositionOpened { .. } => "position_opened",
            Self::RewardsDeposited { .. } => "rewards_deposited",
            Self::BucketMatured { .. } => "bucket_matured",
            Self::FeesCollected { .. } => "fees_collected",
            Self::PositionClosed { .. } => "position_closed",
            Self::YieldCollectionToggled { .. } => "yield_collection_toggled",
        }
    }

    /// JSON encoding for indexers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
