//! Maturation engine: bucket maturation and the lazy catch-up walk.
//!
//! Nothing matures on a timer. Operations that need a consistent active
//! liquidity figure call [`catch_up`] first, which walks the calendar days
//! between the tier's cursor and today and matures every funded bucket it
//! passes. The cost is proportional to the days elapsed since the last walk,
//! never to the number of positions, and it is paid by whichever caller
//! arrives first. `max_days` bounds that cost: a capped walk commits its
//! progress and the next call resumes from the cursor.

use serde::{Deserialize, Serialize};
use tenor_core::constants::{days_between, floor_day, SECONDS_PER_DAY};
use tenor_core::error::LedgerError;
use tenor_core::events::LedgerEvent;
use tenor_core::types::{Amount, TierKey, Timestamp};
use tracing::{debug, warn};

use crate::journal::Txn;

/// Outcome of one catch-up call.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatchUpReport {
    pub tier: TierKey,
    /// Calendar days covered by this call, including unfunded ones.
    pub days_walked: u64,
    pub buckets_matured: u64,
    pub liquidity_matured: Amount,
    /// The tier's cursor after the walk.
    pub last_matured_day: Timestamp,
    /// Days still to walk before the tier is current.
    pub remaining_days: u64,
}

impl CatchUpReport {
    fn idle(tier: TierKey, last_matured_day: Timestamp) -> Self {
        Self {
            tier,
            days_walked: 0,
            buckets_matured: 0,
            liquidity_matured: 0,
            last_matured_day,
            remaining_days: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_days == 0
    }
}

/// Mature the bucket of `key` on `day`, if it still holds liquidity.
///
/// Returns the liquidity retired, `None` for an empty or already matured
/// bucket. Fails with `FutureBucket` when `day` is after `now`.
pub(crate) fn mature_bucket(
    txn: &mut Txn<'_>,
    key: &TierKey,
    day: Timestamp,
    now: Timestamp,
) -> Result<Option<Amount>, LedgerError> {
    let mut tier = txn.tier(key)?.clone();
    if day > now {
        return Err(LedgerError::FutureBucket { day, today: floor_day(now) });
    }
    let Some(mut bucket) = txn.bucket(key, day).copied() else {
        return Ok(None);
    };

    let retired = bucket.mature(&mut tier, now)?;
    if let Some(liquidity) = retired {
        debug!(tier = %key, day, liquidity, remaining_active = tier.active_liquidity(), "bucket matured");
        txn.emit(LedgerEvent::BucketMatured {
            tier: *key,
            day,
            liquidity,
            frozen_accumulator: tier.accumulator(),
        });
        txn.put_tier(tier);
        txn.put_bucket(*key, day, bucket);
    }
    Ok(retired)
}

/// Bring the tier's maturation state up to today, walking at most `max_days`
/// calendar days (`None` or `Some(0)` = no limit).
pub(crate) fn catch_up(
    txn: &mut Txn<'_>,
    key: &TierKey,
    now: Timestamp,
    max_days: Option<u32>,
) -> Result<CatchUpReport, LedgerError> {
    let today = floor_day(now);
    let (cursor, duration) = {
        let tier = txn.tier(key)?;
        (tier.last_matured_day(), tier.duration())
    };

    let start = match cursor {
        Some(last) if last >= today => return Ok(CatchUpReport::idle(*key, last)),
        Some(last) => last + SECONDS_PER_DAY,
        None if now < duration => {
            // Nothing deposited since the epoch can have matured yet.
            let mut tier = txn.tier(key)?.clone();
            tier.set_last_matured_day(today);
            txn.put_tier(tier);
            return Ok(CatchUpReport::idle(*key, today));
        }
        None => floor_day(now - duration),
    };

    let through = match max_days.filter(|cap| *cap > 0) {
        Some(cap) => {
            let span = u64::from(cap - 1).saturating_mul(SECONDS_PER_DAY);
            today.min(start.saturating_add(span))
        }
        None => today,
    };

    let mut buckets_matured = 0u64;
    let mut liquidity_matured: Amount = 0;
    for day in txn.funded_days(key, start, through) {
        if let Some(liquidity) = mature_bucket(txn, key, day, now)? {
            buckets_matured += 1;
            liquidity_matured = liquidity_matured
                .checked_add(liquidity)
                .ok_or(LedgerError::ArithmeticOverflow)?;
        }
    }

    let mut tier = txn.tier(key)?.clone();
    tier.set_last_matured_day(through);
    txn.put_tier(tier);

    let report = CatchUpReport {
        tier: *key,
        days_walked: days_between(start, through) + 1,
        buckets_matured,
        liquidity_matured,
        last_matured_day: through,
        remaining_days: days_between(through, today),
    };
    if report.is_complete() {
        debug!(tier = %key, days = report.days_walked, buckets = buckets_matured, "catch-up complete");
    } else {
        warn!(
            tier = %key,
            days = report.days_walked,
            remaining = report.remaining_days,
            "catch-up capped; backlog remains"
        );
    }
    Ok(report)
}
