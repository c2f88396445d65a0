//! Whole-ledger snapshots.
//!
//! A snapshot is a flat, ordered copy of the ledger state. Its bincode
//! encoding is deterministic, so the BLAKE3 digest of the encoding works as a
//! state fingerprint: two ledgers that processed the same operations agree
//! on it.

use serde::{Deserialize, Serialize};
use tenor_core::error::LedgerError;
use tenor_core::types::{AssetId, TierKey, Timestamp};

use crate::bucket::Bucket;
use crate::journal::LedgerState;
use crate::position::Position;
use crate::tier::Tier;

/// Current snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub assets: Vec<AssetId>,
    pub tiers: Vec<Tier>,
    pub buckets: Vec<(TierKey, Timestamp, Bucket)>,
    pub positions: Vec<Position>,
    pub next_position_id: u64,
    pub yield_collection_enabled: bool,
}

impl LedgerSnapshot {
    pub(crate) fn capture(state: &LedgerState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            assets: state.assets.iter().copied().collect(),
            tiers: state.tiers.values().cloned().collect(),
            buckets: state
                .buckets
                .iter()
                .flat_map(|(key, days)| days.iter().map(move |(day, bucket)| (*key, *day, *bucket)))
                .collect(),
            positions: state.positions.values().cloned().collect(),
            next_position_id: state.next_position_id,
            yield_collection_enabled: state.yield_collection_enabled,
        }
    }

    /// Rebuild ledger state, checking the pieces reference each other and
    /// that every tier's active liquidity is exactly what its unmatured
    /// buckets hold.
    pub(crate) fn into_state(self) -> Result<LedgerState, LedgerError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(LedgerError::Snapshot(format!("unsupported version {}", self.version)));
        }
        let mut state = LedgerState {
            next_position_id: self.next_position_id,
            yield_collection_enabled: self.yield_collection_enabled,
            ..LedgerState::default()
        };
        state.assets.extend(self.assets);

        for tier in self.tiers {
            let key = tier.key();
            if !state.assets.contains(&key.asset) {
                return Err(LedgerError::Snapshot(format!("tier {key} has unregistered asset")));
            }
            if state.tiers.insert(key, tier).is_some() {
                return Err(LedgerError::Snapshot(format!("duplicate tier {key}")));
            }
        }
        for (key, day, bucket) in self.buckets {
            if !state.tiers.contains_key(&key) {
                return Err(LedgerError::Snapshot(format!("bucket for unknown tier {key}")));
            }
            if state.buckets.entry(key).or_default().insert(day, bucket).is_some() {
                return Err(LedgerError::Snapshot(format!("duplicate bucket {key} day {day}")));
            }
        }
        for (key, tier) in &state.tiers {
            let bucketed = state
                .buckets
                .get(key)
                .into_iter()
                .flat_map(|days| days.values())
                .try_fold(0u128, |sum, bucket| sum.checked_add(bucket.liquidity()))
                .ok_or_else(|| LedgerError::Snapshot(format!("bucket liquidity overflow in tier {key}")))?;
            if bucketed != tier.active_liquidity() {
                return Err(LedgerError::Snapshot(format!(
                    "tier {key} active liquidity {} but buckets hold {bucketed}",
                    tier.active_liquidity()
                )));
            }
        }
        for position in self.positions {
            let id = position.id();
            if !state.tiers.contains_key(&position.tier()) {
                return Err(LedgerError::Snapshot(format!("position {id} has unknown tier")));
            }
            let has_bucket = state
                .buckets
                .get(&position.tier())
                .is_some_and(|days| days.contains_key(&position.maturity()));
            if !has_bucket {
                return Err(LedgerError::Snapshot(format!("position {id} has no maturity bucket")));
            }
            if id.0 >= state.next_position_id {
                return Err(LedgerError::Snapshot(format!("position {id} beyond id counter")));
            }
            state.positions.insert(id, position);
        }
        Ok(state)
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| LedgerError::Snapshot(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        let (snapshot, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| LedgerError::Snapshot(e.to_string()))?;
        if read != bytes.len() {
            return Err(LedgerError::Snapshot(format!("{} trailing bytes", bytes.len() - read)));
        }
        Ok(snapshot)
    }

    /// BLAKE3 hash of the encoding.
    pub fn digest(&self) -> Result<[u8; 32], LedgerError> {
        Ok(*blake3::hash(&self.encode()?).as_bytes())
    }
}
