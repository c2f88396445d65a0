//! Maturity buckets.
//!
//! All positions in a tier that mature on the same day share one bucket.
//! Maturing a bucket freezes the tier accumulator for those positions and
//! retires their principal from the tier's active liquidity in one step,
//! however many positions the bucket holds.

use serde::{Deserialize, Serialize};
use tenor_core::error::LedgerError;
use tenor_core::fixed::Q128;
use tenor_core::types::{Amount, Timestamp};

use crate::tier::Tier;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Bucket {
    /// Principal maturing this day that is still counted as active.
    /// Zeroed when the bucket matures.
    liquidity: Amount,
    /// Tier accumulator at maturation. Meaningless until `matured_at` is set.
    frozen_accumulator: Q128,
    matured_at: Option<Timestamp>,
    /// Positions ever recorded here.
    position_count: u64,
}

impl Bucket {
    pub fn liquidity(&self) -> Amount {
        self.liquidity
    }

    pub fn frozen_accumulator(&self) -> Option<Q128> {
        self.matured_at.map(|_| self.frozen_accumulator)
    }

    pub fn is_matured(&self) -> bool {
        self.matured_at.is_some()
    }

    pub fn matured_at(&self) -> Option<Timestamp> {
        self.matured_at
    }

    pub fn position_count(&self) -> u64 {
        self.position_count
    }

    pub(crate) fn record(&mut self, principal: Amount) -> Result<(), LedgerError> {
        self.liquidity = self.liquidity.checked_add(principal).ok_or(LedgerError::ArithmeticOverflow)?;
        self.position_count += 1;
        Ok(())
    }

    /// Freeze the bucket against `tier` and retire its liquidity.
    ///
    /// Returns the liquidity retired, or `None` when there was nothing to
    /// retire (never funded, or already matured). Calling this twice never
    /// subtracts twice.
    pub(crate) fn mature(&mut self, tier: &mut Tier, now: Timestamp) -> Result<Option<Amount>, LedgerError> {
        if self.liquidity == 0 {
            return Ok(None);
        }
        tier.retire_liquidity(self.liquidity)?;
        let retired = self.liquidity;
        self.frozen_accumulator = tier.accumulator();
        self.matured_at = Some(now);
        self.liquidity = 0;
        Ok(Some(retired))
    }

    /// Accumulator that positions in this bucket accrue against: the frozen
    /// value once matured, the tier's live value before.
    pub fn reference_accumulator(&self, tier: &Tier) -> Q128 {
        self.frozen_accumulator().unwrap_or_else(|| tier.accumulator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::RetogglePolicy;
    use tenor_core::constants::SECONDS_PER_DAY;
    use tenor_core::types::{AssetId, TierKey};

    fn funded_tier(principal: Amount) -> (Tier, Bucket) {
        let mut tier = Tier::new(TierKey::new(AssetId([1; 20]), SECONDS_PER_DAY), 0);
        tier.apply_flags(true, true, RetogglePolicy::Permissive);
        tier.add_principal(principal).unwrap();
        let mut bucket = Bucket::default();
        bucket.record(principal).unwrap();
        (tier, bucket)
    }

    #[test]
    fn mature_freezes_and_retires() {
        let (mut tier, mut bucket) = funded_tier(1_000);
        tier.distribute(100).unwrap();

        assert_eq!(bucket.mature(&mut tier, 50).unwrap(), Some(1_000));
        assert_eq!(tier.active_liquidity(), 0);
        assert_eq!(bucket.liquidity(), 0);
        assert_eq!(bucket.frozen_accumulator(), Some(tier.accumulator()));
        assert_eq!(bucket.matured_at(), Some(50));
    }

    #[test]
    fn mature_twice_is_noop() {
        let (mut tier, mut bucket) = funded_tier(1_000);
        tier.add_principal(500).unwrap();
        bucket.mature(&mut tier, 1).unwrap();
        let after_first = (tier.clone(), bucket);

        assert_eq!(bucket.mature(&mut tier, 2).unwrap(), None);
        assert_eq!((tier, bucket), after_first);
    }

    #[test]
    fn empty_bucket_is_noop() {
        let (mut tier, _) = funded_tier(10);
        let mut empty = Bucket::default();
        assert_eq!(empty.mature(&mut tier, 1).unwrap(), None);
        assert!(!empty.is_matured());
        assert_eq!(tier.active_liquidity(), 10);
    }

    #[test]
    fn reference_follows_tier_until_matured() {
        let (mut tier, mut bucket) = funded_tier(100);
        tier.add_principal(100).unwrap();
        tier.distribute(50).unwrap();
        assert_eq!(bucket.reference_accumulator(&tier), tier.accumulator());

        bucket.mature(&mut tier, 1).unwrap();
        let frozen = tier.accumulator();
        tier.distribute(50).unwrap();
        assert_eq!(bucket.reference_accumulator(&tier), frozen);
        assert!(tier.accumulator() > frozen);
    }

    #[test]
    fn frozen_zero_accumulator_still_counts_as_matured() {
        let (mut tier, mut bucket) = funded_tier(100);
        bucket.mature(&mut tier, 1).unwrap();
        assert_eq!(bucket.frozen_accumulator(), Some(Q128::ZERO));
        assert!(bucket.is_matured());
    }
}
