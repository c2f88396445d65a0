//! Core ledger identifiers.
//!
//! All amounts are `u128` base units and all timestamps are `u64` Unix seconds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Principal, reward and payout amounts in base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// A 20-byte account identifier (depositor, rewarder, admin).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// The zero account. Never a valid depositor.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for AccountId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// A 20-byte asset identifier (the token a tier accepts and pays out).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetId(pub [u8; 20]);

impl AssetId {
    /// The zero asset. Rejected by the registry.
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for AssetId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// A tier is keyed by asset and lock duration (seconds).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TierKey {
    pub asset: AssetId,
    pub duration: u64,
}

impl TierKey {
    pub fn new(asset: AssetId, duration: u64) -> Self {
        Self { asset, duration }
    }
}

impl fmt::Display for TierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.asset, self.duration)
    }
}

/// Identifier of an open position. Assigned sequentially starting at 1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
