//! Protocol constants. All timestamps are Unix seconds, all amounts are base units.

/// Length of one maturity bucket.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Shortest duration a tier may be configured with.
///
/// A duration of at least one day guarantees that a fresh deposit always
/// matures on a day strictly after the current one, so it never lands in a
/// bucket the catch-up walk has already processed.
///
/// # Examples
///
/// ```
/// use tenor_core::constants::{MIN_DURATION_SECS, SECONDS_PER_DAY};
/// assert_eq!(MIN_DURATION_SECS, SECONDS_PER_DAY);
/// ```
pub const MIN_DURATION_SECS: u64 = SECONDS_PER_DAY;

/// Number of fractional bits in the tier accumulator.
pub const ACCUMULATOR_FRACTIONAL_BITS: usize = 128;

/// Width budget for maturity timestamps, in bits.
pub const TIMESTAMP_BITS: u32 = 40;

/// Largest maturity timestamp the engine accepts (`2^40 - 1`, about year 36812).
pub const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Default cap on calendar days walked by one catch-up call.
pub const DEFAULT_MAX_CATCH_UP_DAYS: u32 = 1_000;

/// Environment prefix for configuration overrides (`TENOR_MAX_CATCH_UP_DAYS`, ...).
pub const CONFIG_ENV_PREFIX: &str = "TENOR";

/// Round a timestamp down to the start of its day.
///
/// # Examples
///
/// ```
/// use tenor_core::constants::{floor_day, SECONDS_PER_DAY};
/// assert_eq!(floor_day(SECONDS_PER_DAY * 3 + 5), SECONDS_PER_DAY * 3);
/// assert_eq!(floor_day(0), 0);
/// ```
pub const fn floor_day(timestamp: u64) -> u64 {
    timestamp - timestamp % SECONDS_PER_DAY
}

/// Number of whole days from `from` to `to`, both day-aligned. Zero if `to < from`.
pub const fn days_between(from: u64, to: u64) -> u64 {
    if to <= from {
        0
    } else {
        (to - from) / SECONDS_PER_DAY
    }
}
