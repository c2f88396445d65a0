//! Tier registry entries.
//!
//! A [`Tier`] is the single owner of everything the engine tracks per
//! (asset, duration): the two registry flags, the active liquidity total,
//! the reward accumulator, the catch-up cursor and lifetime totals.
//! Maturity buckets live beside it in the ledger state, keyed by the same
//! [`TierKey`].

use serde::{Deserialize, Serialize};
use tenor_core::constants::floor_day;
use tenor_core::error::LedgerError;
use tenor_core::fixed::Q128;
use tenor_core::types::{Amount, TierKey, Timestamp};

use crate::accumulator::Accumulator;

/// How `mint_enabled` behaves when a tier becomes supported again.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetogglePolicy {
    /// A tier moving from unsupported to supported always starts with
    /// minting disabled; a second call enables it.
    #[default]
    Strict,
    /// Flags are applied exactly as given.
    Permissive,
}

/// Lifetime flows through a tier.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TierTotals {
    /// Principal ever deposited.
    pub deposited: Amount,
    /// Principal returned by closed positions.
    pub withdrawn: Amount,
    /// Rewards distributed through the accumulator.
    pub rewards_deposited: Amount,
    /// Rewards paid out by claims and closes.
    pub rewards_paid: Amount,
}

impl TierTotals {
    /// Principal still held by open positions.
    pub fn principal_outstanding(&self) -> Amount {
        self.deposited.saturating_sub(self.withdrawn)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    key: TierKey,
    supported: bool,
    mint_enabled: bool,
    active_liquidity: Amount,
    accumulator: Accumulator,
    /// Last day whose buckets have been processed. `None` until the first catch-up
    /// for tiers restored without a cursor.
    last_matured_day: Option<Timestamp>,
    created_at: Timestamp,
    totals: TierTotals,
}

impl Tier {
    /// A fresh, unsupported tier. The catch-up cursor starts at the creation day:
    /// no position can mature before it.
    pub(crate) fn new(key: TierKey, now: Timestamp) -> Self {
        Self {
            key,
            supported: false,
            mint_enabled: false,
            active_liquidity: 0,
            accumulator: Accumulator::default(),
            last_matured_day: Some(floor_day(now)),
            created_at: now,
            totals: TierTotals::default(),
        }
    }

    pub fn key(&self) -> TierKey {
        self.key
    }

    pub fn duration(&self) -> u64 {
        self.key.duration
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn mint_enabled(&self) -> bool {
        self.mint_enabled
    }

    /// Whether new deposits are accepted.
    pub fn accepts_deposits(&self) -> bool {
        self.supported && self.mint_enabled
    }

    pub fn active_liquidity(&self) -> Amount {
        self.active_liquidity
    }

    pub fn accumulator(&self) -> Q128 {
        self.accumulator.value()
    }

    pub fn last_matured_day(&self) -> Option<Timestamp> {
        self.last_matured_day
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn totals(&self) -> TierTotals {
        self.totals
    }

    /// Apply registry flags. Liquidity, accumulator, cursor and totals are never touched.
    pub(crate) fn apply_flags(&mut self, supported: bool, mint_enabled: bool, policy: RetogglePolicy) {
        let becoming_supported = supported && !self.supported;
        self.supported = supported;
        self.mint_enabled = match (supported, policy) {
            (false, _) => false,
            (true, RetogglePolicy::Strict) if becoming_supported => false,
            (true, _) => mint_enabled,
        };
    }

    pub(crate) fn set_last_matured_day(&mut self, day: Timestamp) {
        self.last_matured_day = Some(day);
    }

    pub(crate) fn add_principal(&mut self, principal: Amount) -> Result<(), LedgerError> {
        self.active_liquidity = self
            .active_liquidity
            .checked_add(principal)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.totals.deposited = self
            .totals
            .deposited
            .checked_add(principal)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Remove a matured bucket's liquidity from the active total.
    pub(crate) fn retire_liquidity(&mut self, liquidity: Amount) -> Result<(), LedgerError> {
        self.active_liquidity = self
            .active_liquidity
            .checked_sub(liquidity)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Spread a reward over the active liquidity. Returns the accumulator delta.
    pub(crate) fn distribute(&mut self, amount: Amount) -> Result<Q128, LedgerError> {
        if self.active_liquidity == 0 {
            return Err(LedgerError::NoActiveLiquidity(self.key));
        }
        let delta = self.accumulator.accrue(amount, self.active_liquidity)?;
        self.totals.rewards_deposited = self
            .totals
            .rewards_deposited
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(delta)
    }

    pub(crate) fn record_withdrawal(&mut self, principal: Amount, rewards: Amount) -> Result<(), LedgerError> {
        self.totals.withdrawn = self
            .totals
            .withdrawn
            .checked_add(principal)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.record_reward_payout(rewards)
    }

    pub(crate) fn record_reward_payout(&mut self, rewards: Amount) -> Result<(), LedgerError> {
        self.totals.rewards_paid = self
            .totals
            .rewards_paid
            .checked_add(rewards)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Forget the catch-up cursor. Only used to exercise the first-run rule.
    #[cfg(test)]
    pub(crate) fn clear_cursor(&mut self) {
        self.last_matured_day = None;
    }
}
