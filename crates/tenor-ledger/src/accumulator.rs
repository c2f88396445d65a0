//! Per-tier reward accumulator.
//!
//! The accumulator holds lifetime rewards per unit of active liquidity as a
//! Q128.128 value. Its only mutator adds a non-negative delta, so it can never
//! decrease. Accrual for a position is the principal times the growth between
//! two accumulator readings, floored.

use serde::{Deserialize, Serialize};
use tenor_core::error::LedgerError;
use tenor_core::fixed::Q128;
use tenor_core::types::Amount;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Accumulator(Q128);

impl Accumulator {
    pub fn value(&self) -> Q128 {
        self.0
    }

    /// Spread `amount` over `active_liquidity` and add the per-unit delta.
    ///
    /// Returns the delta. Callers must reject zero liquidity before calling;
    /// a zero divisor here is reported as an arithmetic error.
    pub(crate) fn accrue(&mut self, amount: Amount, active_liquidity: Amount) -> Result<Q128, LedgerError> {
        let delta = Q128::from_ratio(amount, active_liquidity).ok_or(LedgerError::ArithmeticOverflow)?;
        self.0 = self.0.checked_add(delta).ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(delta)
    }
}

/// Rewards earned by `principal` while the accumulator moved from `snapshot` to `reference`.
///
/// `floor(principal * (reference - snapshot))`. A reference below the snapshot
/// would mean the accumulator went backwards and is reported as an error.
pub fn owed_growth(principal: Amount, snapshot: Q128, reference: Q128) -> Result<Amount, LedgerError> {
    let growth = reference.checked_sub(snapshot).ok_or(LedgerError::ArithmeticOverflow)?;
    growth.mul_floor(principal).ok_or(LedgerError::ArithmeticOverflow)
}
