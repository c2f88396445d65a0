//! Position records and settlement.

use serde::{Deserialize, Serialize};
use tenor_core::error::LedgerError;
use tenor_core::fixed::Q128;
use tenor_core::types::{AccountId, Amount, PositionId, TierKey, Timestamp};

use crate::accumulator::owed_growth;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Position {
    pub(crate) id: PositionId,
    /// Depositor at open. Current ownership is the identity layer's answer.
    pub(crate) depositor: AccountId,
    pub(crate) tier: TierKey,
    pub(crate) principal: Amount,
    pub(crate) deposit_time: Timestamp,
    /// Day-aligned; also the key of the position's bucket.
    pub(crate) maturity: Timestamp,
    pub(crate) accumulator_snapshot: Q128,
    pub(crate) owed: Amount,
}

impl Position {
    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn depositor(&self) -> AccountId {
        self.depositor
    }

    pub fn tier(&self) -> TierKey {
        self.tier
    }

    pub fn principal(&self) -> Amount {
        self.principal
    }

    pub fn deposit_time(&self) -> Timestamp {
        self.deposit_time
    }

    pub fn duration(&self) -> u64 {
        self.tier.duration
    }

    pub fn maturity(&self) -> Timestamp {
        self.maturity
    }

    pub fn accumulator_snapshot(&self) -> Q128 {
        self.accumulator_snapshot
    }

    /// Settled but unclaimed rewards.
    pub fn owed(&self) -> Amount {
        self.owed
    }

    pub fn is_mature(&self, now: Timestamp) -> bool {
        now >= self.maturity
    }

    /// Rewards `settle` would add against `reference`, without changing anything.
    pub fn pending_growth(&self, reference: Q128) -> Result<Amount, LedgerError> {
        owed_growth(self.principal, self.accumulator_snapshot, reference)
    }

    /// Move accrual up to `reference` into `owed`.
    ///
    /// Returns the amount added. When nothing accrues the snapshot is left
    /// alone, so sub-unit growth keeps building toward the next whole unit.
    pub(crate) fn settle(&mut self, reference: Q128) -> Result<Amount, LedgerError> {
        let delta = self.pending_growth(reference)?;
        if delta == 0 {
            return Ok(0);
        }
        self.owed = self.owed.checked_add(delta).ok_or(LedgerError::ArithmeticOverflow)?;
        self.accumulator_snapshot = reference;
        Ok(delta)
    }

    /// Zero `owed` and return what it held.
    pub(crate) fn take_owed(&mut self) -> Amount {
        std::mem::take(&mut self.owed)
    }
}
