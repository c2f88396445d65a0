//! Unsigned Q128.128 fixed-point values.
//!
//! The tier accumulator stores rewards-per-unit-of-liquidity with 128
//! fractional bits in a 256-bit integer. All rounding is floor, which keeps
//! results deterministic and bit-identical across implementations.

use std::fmt;

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};

use crate::constants::ACCUMULATOR_FRACTIONAL_BITS;

/// Unsigned fixed-point number with 128 integer and 128 fractional bits.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct Q128(U256);

impl Q128 {
    pub const ZERO: Self = Self(U256([0; 4]));

    /// Exactly 1.0.
    pub const ONE: Self = Self(U256([0, 0, 1, 0]));

    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `floor(numerator * 2^128 / denominator)`. `None` when `denominator` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenor_core::fixed::Q128;
    /// let quarter = Q128::from_ratio(500, 2000).unwrap();
    /// assert_eq!(quarter.mul_floor(1000), Some(250));
    /// assert!(Q128::from_ratio(1, 0).is_none());
    /// ```
    pub fn from_ratio(numerator: u128, denominator: u128) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let scaled = U256::from(numerator) << ACCUMULATOR_FRACTIONAL_BITS;
        Some(Self(scaled / U256::from(denominator)))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// `floor(amount * self)`, or `None` if the result does not fit in `u128`.
    ///
    /// The product goes through a 512-bit intermediate, so only the final
    /// narrowing can fail.
    pub fn mul_floor(self, amount: u128) -> Option<u128> {
        let product: U512 = self.0.full_mul(U256::from(amount));
        let shifted = product >> ACCUMULATOR_FRACTIONAL_BITS;
        if shifted.bits() > 128 {
            return None;
        }
        Some(shifted.low_u128())
    }

    /// Integer part, saturating at `u128::MAX`.
    pub fn integer_part(&self) -> u128 {
        let int = self.0 >> ACCUMULATOR_FRACTIONAL_BITS;
        if int.bits() > 128 { u128::MAX } else { int.low_u128() }
    }
}

impl fmt::Display for Q128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_is_two_pow_128() {
        assert_eq!(Q128::ONE.raw(), U256::one() << 128);
        assert_eq!(Q128::ONE.integer_part(), 1);
        assert_eq!(Q128::ZERO.integer_part(), 0);
    }

    #[test]
    fn ratio_of_equal_values_is_one() {
        assert_eq!(Q128::from_ratio(777, 777), Some(Q128::ONE));
    }

    #[test]
    fn ratio_floors() {
        // 1/3 cannot be represented exactly; three thirds fall one ulp short.
        let third = Q128::from_ratio(1, 3).unwrap();
        let sum = third.checked_add(third).unwrap().checked_add(third).unwrap();
        assert!(sum < Q128::ONE);
        assert_eq!(sum.mul_floor(1), Some(0));
        assert_eq!(third.mul_floor(3), Some(0));
        assert_eq!(third.mul_floor(300), Some(99));
    }

    #[test]
    fn mul_floor_large_principal() {
        let two = Q128::from_ratio(2, 1).unwrap();
        assert_eq!(two.mul_floor(u128::MAX / 2), Some(u128::MAX - 1));
        assert_eq!(two.mul_floor(u128::MAX), None);
    }

    #[test]
    fn sub_underflow_is_none() {
        assert!(Q128::ZERO.checked_sub(Q128::ONE).is_none());
        assert_eq!(Q128::ONE.checked_sub(Q128::ONE), Some(Q128::ZERO));
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&Q128::ONE).unwrap();
        let back: Q128 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Q128::ONE);
    }

    proptest! {
        #[test]
        fn ratio_times_denominator_never_exceeds_numerator(
            numerator in 0u128..=u64::MAX as u128,
            denominator in 1u128..=u64::MAX as u128,
        ) {
            let q = Q128::from_ratio(numerator, denominator).unwrap();
            let back = q.mul_floor(denominator).unwrap();
            prop_assert!(back <= numerator);
            prop_assert!(numerator - back <= 1);
        }

        #[test]
        fn mul_floor_is_monotonic_in_amount(
            numerator in 0u128..=u64::MAX as u128,
            denominator in 1u128..=u64::MAX as u128,
            a in 0u128..=u64::MAX as u128,
            b in 0u128..=u64::MAX as u128,
        ) {
            let q = Q128::from_ratio(numerator, denominator).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(q.mul_floor(lo).unwrap() <= q.mul_floor(hi).unwrap());
        }
    }
}
