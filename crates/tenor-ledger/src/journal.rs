//! Ledger state and the undo journal that makes operations atomic.
//!
//! Every write goes through a [`Txn`], which records the prior value of the
//! entity it replaces. [`Txn::commit`] keeps the writes and hands back the
//! buffered events; dropping an uncommitted `Txn` replays the undo records in
//! reverse, restoring the state exactly as it was when the transaction began.

use std::collections::{BTreeMap, BTreeSet};

use tenor_core::error::LedgerError;
use tenor_core::events::LedgerEvent;
use tenor_core::types::{AssetId, PositionId, TierKey, Timestamp};
use tracing::debug;

use crate::bucket::Bucket;
use crate::position::Position;
use crate::tier::Tier;

/// Everything the ledger owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LedgerState {
    pub(crate) assets: BTreeSet<AssetId>,
    pub(crate) tiers: BTreeMap<TierKey, Tier>,
    pub(crate) buckets: BTreeMap<TierKey, BTreeMap<Timestamp, Bucket>>,
    pub(crate) positions: BTreeMap<PositionId, Position>,
    pub(crate) next_position_id: u64,
    pub(crate) yield_collection_enabled: bool,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            assets: BTreeSet::new(),
            tiers: BTreeMap::new(),
            buckets: BTreeMap::new(),
            positions: BTreeMap::new(),
            next_position_id: 1,
            yield_collection_enabled: true,
        }
    }
}

/// Prior value of one entity, recorded before it was overwritten.
#[derive(Debug)]
enum Undo {
    /// The asset was newly inserted.
    Asset(AssetId),
    Tier(TierKey, Option<Tier>),
    Bucket(TierKey, Timestamp, Option<Bucket>),
    Position(PositionId, Option<Position>),
    NextPositionId(u64),
    YieldCollection(bool),
}

/// A journaled view over [`LedgerState`] for the duration of one operation.
pub(crate) struct Txn<'a> {
    state: &'a mut LedgerState,
    undo: Vec<Undo>,
    events: Vec<LedgerEvent>,
    committed: bool,
}

impl<'a> Txn<'a> {
    pub(crate) fn begin(state: &'a mut LedgerState) -> Self {
        Self {
            state,
            undo: Vec::new(),
            events: Vec::new(),
            committed: false,
        }
    }

    pub(crate) fn state(&self) -> &LedgerState {
        &*self.state
    }

    pub(crate) fn has_asset(&self, asset: &AssetId) -> bool {
        self.state.assets.contains(asset)
    }

    /// Returns `true` if the asset was not registered before.
    pub(crate) fn insert_asset(&mut self, asset: AssetId) -> bool {
        let inserted = self.state.assets.insert(asset);
        if inserted {
            self.undo.push(Undo::Asset(asset));
        }
        inserted
    }

    pub(crate) fn find_tier(&self, key: &TierKey) -> Option<&Tier> {
        self.state.tiers.get(key)
    }

    pub(crate) fn tier(&self, key: &TierKey) -> Result<&Tier, LedgerError> {
        self.find_tier(key).ok_or(LedgerError::TierNotFound(*key))
    }

    pub(crate) fn put_tier(&mut self, tier: Tier) {
        let key = tier.key();
        let prior = self.state.tiers.insert(key, tier);
        self.undo.push(Undo::Tier(key, prior));
    }

    pub(crate) fn bucket(&self, key: &TierKey, day: Timestamp) -> Option<&Bucket> {
        self.state.buckets.get(key).and_then(|days| days.get(&day))
    }

    pub(crate) fn put_bucket(&mut self, key: TierKey, day: Timestamp, bucket: Bucket) {
        let prior = self.state.buckets.entry(key).or_default().insert(day, bucket);
        self.undo.push(Undo::Bucket(key, day, prior));
    }

    /// Days in `[from, through]` whose bucket still holds active liquidity, ascending.
    pub(crate) fn funded_days(&self, key: &TierKey, from: Timestamp, through: Timestamp) -> Vec<Timestamp> {
        if from > through {
            return Vec::new();
        }
        self.state
            .buckets
            .get(key)
            .map(|days| {
                days.range(from..=through)
                    .filter(|(_, b)| b.liquidity() > 0)
                    .map(|(day, _)| *day)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn position(&self, id: &PositionId) -> Result<&Position, LedgerError> {
        self.state.positions.get(id).ok_or(LedgerError::PositionNotFound(*id))
    }

    pub(crate) fn put_position(&mut self, position: Position) {
        let id = position.id();
        let prior = self.state.positions.insert(id, position);
        self.undo.push(Undo::Position(id, prior));
    }

    pub(crate) fn remove_position(&mut self, id: &PositionId) -> Result<Position, LedgerError> {
        let removed = self
            .state
            .positions
            .remove(id)
            .ok_or(LedgerError::PositionNotFound(*id))?;
        self.undo.push(Undo::Position(*id, Some(removed.clone())));
        Ok(removed)
    }

    pub(crate) fn allocate_position_id(&mut self) -> Result<PositionId, LedgerError> {
        let id = self.state.next_position_id;
        self.state.next_position_id = id.checked_add(1).ok_or(LedgerError::ArithmeticOverflow)?;
        self.undo.push(Undo::NextPositionId(id));
        Ok(PositionId(id))
    }

    pub(crate) fn set_yield_collection(&mut self, enabled: bool) {
        let prior = std::mem::replace(&mut self.state.yield_collection_enabled, enabled);
        self.undo.push(Undo::YieldCollection(prior));
    }

    /// Buffer an event for delivery after commit.
    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Keep every write and return the buffered events in emission order.
    pub(crate) fn commit(mut self) -> Vec<LedgerEvent> {
        self.committed = true;
        self.undo.clear();
        std::mem::take(&mut self.events)
    }

    fn rollback(&mut self) {
        let entries = self.undo.len();
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Asset(asset) => {
                    self.state.assets.remove(&asset);
                }
                Undo::Tier(key, prior) => match prior {
                    Some(tier) => {
                        self.state.tiers.insert(key, tier);
                    }
                    None => {
                        self.state.tiers.remove(&key);
                    }
                },
                Undo::Bucket(key, day, prior) => {
                    let days = self.state.buckets.entry(key).or_default();
                    match prior {
                        Some(bucket) => {
                            days.insert(day, bucket);
                        }
                        None => {
                            days.remove(&day);
                        }
                    }
                    if days.is_empty() {
                        self.state.buckets.remove(&key);
                    }
                }
                Undo::Position(id, prior) => match prior {
                    Some(position) => {
                        self.state.positions.insert(id, position);
                    }
                    None => {
                        self.state.positions.remove(&id);
                    }
                },
                Undo::NextPositionId(id) => self.state.next_position_id = id,
                Undo::YieldCollection(enabled) => self.state.yield_collection_enabled = enabled,
            }
        }
        self.events.clear();
        if entries > 0 {
            debug!(entries, "rolled back uncommitted ledger transaction");
        }
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::RetogglePolicy;
    use tenor_core::constants::SECONDS_PER_DAY;

    fn key() -> TierKey {
        TierKey::new(AssetId([4; 20]), SECONDS_PER_DAY)
    }

    fn populated() -> LedgerState {
        let mut state = LedgerState::default();
        let mut txn = Txn::begin(&mut state);
        txn.insert_asset(key().asset);
        let mut tier = Tier::new(key(), 0);
        tier.apply_flags(true, true, RetogglePolicy::Permissive);
        tier.add_principal(10).unwrap();
        txn.put_tier(tier);
        let mut bucket = Bucket::default();
        bucket.record(10).unwrap();
        txn.put_bucket(key(), SECONDS_PER_DAY, bucket);
        txn.commit();
        state
    }

    #[test]
    fn commit_keeps_writes_and_returns_events() {
        let mut state = LedgerState::default();
        let mut txn = Txn::begin(&mut state);
        txn.insert_asset(AssetId([1; 20]));
        txn.emit(LedgerEvent::AssetRegistered { asset: AssetId([1; 20]) });
        let events = txn.commit();
        assert_eq!(events.len(), 1);
        assert!(state.assets.contains(&AssetId([1; 20])));
    }

    #[test]
    fn drop_restores_everything() {
        let mut state = populated();
        let before = state.clone();
        {
            let mut txn = Txn::begin(&mut state);
            txn.insert_asset(AssetId([8; 20]));
            let mut tier = txn.tier(&key()).unwrap().clone();
            tier.add_principal(5).unwrap();
            txn.put_tier(tier.clone());
            tier.add_principal(5).unwrap();
            txn.put_tier(tier);
            txn.put_bucket(key(), 2 * SECONDS_PER_DAY, Bucket::default());
            let id = txn.allocate_position_id().unwrap();
            assert_eq!(id, PositionId(1));
            txn.set_yield_collection(false);
            txn.emit(LedgerEvent::YieldCollectionToggled { enabled: false });
        }
        assert_eq!(state, before);
    }

    #[test]
    fn removed_position_comes_back_on_rollback() {
        let mut state = populated();
        let position = Position {
            id: PositionId(7),
            depositor: Default::default(),
            tier: key(),
            principal: 10,
            deposit_time: 0,
            maturity: SECONDS_PER_DAY,
            accumulator_snapshot: Default::default(),
            owed: 3,
        };
        state.positions.insert(PositionId(7), position.clone());
        {
            let mut txn = Txn::begin(&mut state);
            assert_eq!(txn.remove_position(&PositionId(7)).unwrap(), position);
            assert!(txn.position(&PositionId(7)).is_err());
        }
        assert_eq!(state.positions.get(&PositionId(7)), Some(&position));
    }

    #[test]
    fn funded_days_skips_empty_and_out_of_range() {
        let mut state = populated();
        let mut txn = Txn::begin(&mut state);
        txn.put_bucket(key(), 3 * SECONDS_PER_DAY, Bucket::default());
        let mut later = Bucket::default();
        later.record(1).unwrap();
        txn.put_bucket(key(), 5 * SECONDS_PER_DAY, later);

        assert_eq!(txn.funded_days(&key(), 0, 10 * SECONDS_PER_DAY), vec![SECONDS_PER_DAY, 5 * SECONDS_PER_DAY]);
        assert_eq!(txn.funded_days(&key(), 2 * SECONDS_PER_DAY, 4 * SECONDS_PER_DAY), Vec::<Timestamp>::new());
        assert!(txn.funded_days(&key(), 9, 1).is_empty());
    }
}
