//! The [`Ledger`]: every externally invoked operation.
//!
//! Each operation runs to completion as one atomic transaction against the
//! shared state. The state lock is held for the whole operation, including
//! the custody and identity calls it makes, so operations are totally
//! ordered. A collaborator that calls back into the ledger while one of
//! those calls is in flight gets [`LedgerError::Reentrancy`].

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tenor_core::constants::{MAX_TIMESTAMP, MIN_DURATION_SECS, SECONDS_PER_DAY};
use tenor_core::error::{CustodyError, LedgerError};
use tenor_core::events::LedgerEvent;
use tenor_core::fixed::Q128;
use tenor_core::traits::{AccessControl, Clock, Custody, EventSink, Identity};
use tenor_core::types::{AccountId, Amount, AssetId, PositionId, TierKey, Timestamp};
use tracing::{debug, info, warn};

use crate::bucket::Bucket;
use crate::config::LedgerConfig;
use crate::journal::{LedgerState, Txn};
use crate::maturation::{self, CatchUpReport};
use crate::position::Position;
use crate::snapshot::LedgerSnapshot;
use crate::tier::{Tier, TierTotals};

/// External systems the ledger talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub custody: Arc<dyn Custody>,
    pub identity: Arc<dyn Identity>,
    pub access: Arc<dyn AccessControl>,
    pub events: Arc<dyn EventSink>,
}

/// Result of a successful reward deposit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardReceipt {
    pub tier: TierKey,
    pub amount: Amount,
    /// Liquidity the reward was spread over.
    pub active_liquidity: Amount,
    pub accumulator_delta: Q128,
    /// Tier accumulator after the deposit.
    pub accumulator: Q128,
    pub catch_up: CatchUpReport,
}

/// Result of closing a position.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CloseReceipt {
    pub id: PositionId,
    pub recipient: AccountId,
    pub principal: Amount,
    pub rewards: Amount,
}

pub struct Ledger {
    config: LedgerConfig,
    state: Mutex<LedgerState>,
    /// Thread currently inside a collaborator call, if any.
    external_caller: Mutex<Option<ThreadId>>,
    clock: Arc<dyn Clock>,
    custody: Arc<dyn Custody>,
    identity: Arc<dyn Identity>,
    access: Arc<dyn AccessControl>,
    events: Arc<dyn EventSink>,
}

/// Marks the current thread as inside a collaborator call until dropped.
struct ExternalCall<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> ExternalCall<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock() = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for ExternalCall<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

impl Ledger {
    pub fn new(config: LedgerConfig, collaborators: Collaborators) -> Self {
        let Collaborators { clock, custody, identity, access, events } = collaborators;
        Self {
            config,
            state: Mutex::new(LedgerState::default()),
            external_caller: Mutex::new(None),
            clock,
            custody,
            identity,
            access,
            events,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // --- plumbing -------------------------------------------------------

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        if *self.external_caller.lock() == Some(thread::current().id()) {
            warn!("re-entrant ledger call rejected");
            return Err(LedgerError::Reentrancy);
        }
        Ok(self.state.lock())
    }

    fn external<T>(&self, call: impl FnOnce() -> T) -> T {
        let _scope = ExternalCall::enter(&self.external_caller);
        call()
    }

    fn transfer_in(&self, asset: &AssetId, from: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.external(|| self.custody.transfer_in(asset, from, amount))
            .map_err(|e| self.custody_failed("transfer_in", e))
    }

    fn transfer_out(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.external(|| self.custody.transfer_out(asset, to, amount))
            .map_err(|e| self.custody_failed("transfer_out", e))
    }

    fn custody_failed(&self, direction: &'static str, err: CustodyError) -> LedgerError {
        warn!(direction, error = %err, "custody transfer failed; rolling back");
        err.into()
    }

    /// Where payouts for `id` go: the current owner, or `caller` when the
    /// identity layer no longer knows the position.
    fn payout_recipient(&self, id: &PositionId, caller: &AccountId) -> AccountId {
        self.external(|| self.identity.owner_of(id)).unwrap_or(*caller)
    }

    fn require_authorized(&self, caller: &AccountId, id: &PositionId, action: &'static str) -> Result<(), LedgerError> {
        if self.external(|| self.identity.is_authorized(caller, id)) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { account: *caller, action })
        }
    }

    fn require_admin(&self, caller: &AccountId, action: &'static str) -> Result<(), LedgerError> {
        if self.access.is_admin(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { account: *caller, action })
        }
    }

    /// Run `op` as one transaction. Committed only if `op` succeeds.
    fn transact<T>(&self, op: impl FnOnce(&mut Txn<'_>) -> Result<T, LedgerError>) -> Result<T, LedgerError> {
        self.transact_split(|txn| op(txn).map(Ok))
    }

    /// Like [`transact`](Self::transact), but an inner `Err` still commits:
    /// the side effects up to that point are kept and the error is returned.
    fn transact_split<T>(
        &self,
        op: impl FnOnce(&mut Txn<'_>) -> Result<Result<T, LedgerError>, LedgerError>,
    ) -> Result<T, LedgerError> {
        let (outcome, events) = {
            let mut state = self.lock()?;
            let mut txn = Txn::begin(&mut state);
            let outcome = op(&mut txn)?;
            (outcome, txn.commit())
        };
        for event in &events {
            self.events.emit(event);
        }
        outcome
    }

    fn registered_tier(txn: &Txn<'_>, asset: AssetId, duration: u64) -> Result<TierKey, LedgerError> {
        if asset.is_zero() || !txn.has_asset(&asset) {
            return Err(LedgerError::InvalidAsset(asset));
        }
        let key = TierKey::new(asset, duration);
        txn.tier(&key)?;
        Ok(key)
    }

    // --- registry -------------------------------------------------------

    /// Register `asset`. Returns `false` if it was already registered.
    pub fn register_asset(&self, caller: &AccountId, asset: AssetId) -> Result<bool, LedgerError> {
        self.require_admin(caller, "register_asset")?;
        if asset.is_zero() {
            return Err(LedgerError::InvalidAsset(asset));
        }
        self.transact(|txn| {
            let inserted = txn.insert_asset(asset);
            if inserted {
                info!(%asset, "asset registered");
                txn.emit(LedgerEvent::AssetRegistered { asset });
            }
            Ok(inserted)
        })
    }

    /// Create or re-flag the tier for (`asset`, `duration`).
    ///
    /// A tier is created on its first supported transition. Later calls only
    /// change the two flags, subject to the configured retoggle policy.
    pub fn set_duration_tier(
        &self,
        caller: &AccountId,
        asset: AssetId,
        duration: u64,
        supported: bool,
        mint_enabled: bool,
    ) -> Result<Tier, LedgerError> {
        self.require_admin(caller, "set_duration_tier")?;
        let now = self.clock.now();
        let policy = self.config.retoggle_policy;
        self.transact(|txn| {
            if asset.is_zero() || !txn.has_asset(&asset) {
                return Err(LedgerError::InvalidAsset(asset));
            }
            if duration < MIN_DURATION_SECS {
                return Err(LedgerError::InvalidDuration { asset, duration });
            }
            let key = TierKey::new(asset, duration);
            let (mut tier, created) = match txn.find_tier(&key) {
                Some(tier) => (tier.clone(), false),
                None if supported => (Tier::new(key, now), true),
                None => return Err(LedgerError::TierNotFound(key)),
            };
            tier.apply_flags(supported, mint_enabled, policy);
            info!(
                tier = %key,
                created,
                supported = tier.is_supported(),
                mint_enabled = tier.mint_enabled(),
                "tier updated"
            );
            txn.emit(LedgerEvent::TierUpdated {
                tier: key,
                supported: tier.is_supported(),
                mint_enabled: tier.mint_enabled(),
                created,
            });
            txn.put_tier(tier.clone());
            Ok(tier)
        })
    }

    /// Flip the global switch gating [`claim`](Self::claim).
    pub fn set_yield_collection(&self, caller: &AccountId, enabled: bool) -> Result<(), LedgerError> {
        self.require_admin(caller, "set_yield_collection")?;
        self.transact(|txn| {
            if txn.state().yield_collection_enabled != enabled {
                txn.set_yield_collection(enabled);
                info!(enabled, "yield collection toggled");
                txn.emit(LedgerEvent::YieldCollectionToggled { enabled });
            }
            Ok(())
        })
    }

    // --- positions ------------------------------------------------------

    /// Open a position of `principal` in the tier (`asset`, `duration`).
    pub fn open(
        &self,
        depositor: &AccountId,
        asset: AssetId,
        duration: u64,
        principal: Amount,
    ) -> Result<PositionId, LedgerError> {
        let now = self.clock.now();
        self.transact(|txn| {
            if asset.is_zero() || !txn.has_asset(&asset) {
                return Err(LedgerError::InvalidAsset(asset));
            }
            let key = TierKey::new(asset, duration);
            let mut tier = match txn.find_tier(&key) {
                Some(tier) if tier.accepts_deposits() => tier.clone(),
                _ => return Err(LedgerError::InvalidDuration { asset, duration }),
            };
            if principal == 0 {
                return Err(LedgerError::InvalidAmount("zero principal".into()));
            }

            let unfloored = u128::from(now) + u128::from(duration);
            let maturity = unfloored - unfloored % u128::from(SECONDS_PER_DAY);
            if maturity > u128::from(MAX_TIMESTAMP) {
                return Err(LedgerError::MaturityOverflow(maturity));
            }
            let maturity = maturity as Timestamp;

            tier.add_principal(principal)?;
            let mut bucket = txn.bucket(&key, maturity).copied().unwrap_or_default();
            bucket.record(principal)?;
            let id = txn.allocate_position_id()?;
            let position = Position {
                id,
                depositor: *depositor,
                tier: key,
                principal,
                deposit_time: now,
                maturity,
                accumulator_snapshot: tier.accumulator(),
                owed: 0,
            };
            txn.emit(LedgerEvent::PositionOpened {
                id,
                owner: *depositor,
                tier: key,
                principal,
                maturity,
                accumulator_snapshot: position.accumulator_snapshot,
            });
            txn.put_tier(tier);
            txn.put_bucket(key, maturity, bucket);
            txn.put_position(position);

            self.transfer_in(&asset, depositor, principal)?;
            self.external(|| self.identity.mint(&id, depositor));
            info!(%id, depositor = %depositor, tier = %key, principal, maturity, "position opened");
            Ok(id)
        })
    }

    /// Move accrued rewards into the position's `owed`. Anyone may call this.
    pub fn settle(&self, id: PositionId) -> Result<Amount, LedgerError> {
        self.transact(|txn| {
            let mut position = txn.position(&id)?.clone();
            let reference = reference_accumulator(txn.state(), &position)?;
            let added = position.settle(reference)?;
            if added > 0 {
                debug!(%id, added, owed = position.owed(), "position settled");
                txn.put_position(position);
            }
            Ok(added)
        })
    }

    /// Settle and pay out everything the position is owed. Allowed before
    /// maturity. Returns the amount paid.
    pub fn claim(&self, caller: &AccountId, id: PositionId) -> Result<Amount, LedgerError> {
        self.transact(|txn| {
            if !txn.state().yield_collection_enabled {
                return Err(LedgerError::OperationDisabled("claim"));
            }
            let mut position = txn.position(&id)?.clone();
            self.require_authorized(caller, &id, "claim")?;

            let reference = reference_accumulator(txn.state(), &position)?;
            position.settle(reference)?;
            let amount = position.take_owed();
            let key = position.tier();
            txn.put_position(position);
            if amount == 0 {
                return Ok(0);
            }

            let mut tier = txn.tier(&key)?.clone();
            tier.record_reward_payout(amount)?;
            txn.put_tier(tier);
            let recipient = self.payout_recipient(&id, caller);
            txn.emit(LedgerEvent::FeesCollected { id, recipient, amount });
            self.transfer_out(&key.asset, &recipient, amount)?;
            info!(%id, recipient = %recipient, amount, "rewards claimed");
            Ok(amount)
        })
    }

    /// Withdraw a matured position: principal plus everything owed.
    pub fn close(&self, caller: &AccountId, id: PositionId) -> Result<CloseReceipt, LedgerError> {
        let now = self.clock.now();
        self.transact(|txn| {
            let mut position = txn.position(&id)?.clone();
            self.require_authorized(caller, &id, "close")?;
            if !position.is_mature(now) {
                return Err(LedgerError::Immature { id, maturity: position.maturity(), now });
            }

            let key = position.tier();
            maturation::mature_bucket(txn, &key, position.maturity(), now)?;
            let reference = reference_accumulator(txn.state(), &position)?;
            position.settle(reference)?;
            let rewards = position.take_owed();
            let principal = position.principal();
            txn.remove_position(&id)?;

            let mut tier = txn.tier(&key)?.clone();
            tier.record_withdrawal(principal, rewards)?;
            txn.put_tier(tier);

            let recipient = self.payout_recipient(&id, caller);
            let payout = principal.checked_add(rewards).ok_or(LedgerError::ArithmeticOverflow)?;
            txn.emit(LedgerEvent::PositionClosed { id, recipient, principal, rewards });
            self.transfer_out(&key.asset, &recipient, payout)?;
            self.external(|| self.identity.burn(&id));
            info!(%id, recipient = %recipient, principal, rewards, "position closed");
            Ok(CloseReceipt { id, recipient, principal, rewards })
        })
    }

    // --- rewards and maturation -----------------------------------------

    /// Spread `amount` over the tier's active liquidity.
    ///
    /// Catch-up runs first. Its progress is committed even when the deposit
    /// itself is refused: with `NoActiveLiquidity` when nothing is left to
    /// distribute against, and with `CatchUpIncomplete` when the walk hit
    /// its cap. No funds move in either case.
    pub fn deposit_reward(
        &self,
        rewarder: &AccountId,
        asset: AssetId,
        duration: u64,
        amount: Amount,
    ) -> Result<RewardReceipt, LedgerError> {
        if !self.access.has_rewarder_role(rewarder) {
            return Err(LedgerError::Unauthorized { account: *rewarder, action: "deposit_reward" });
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("zero reward".into()));
        }
        let now = self.clock.now();
        self.transact_split(|txn| {
            let key = Self::registered_tier(txn, asset, duration)?;
            let catch_up = maturation::catch_up(txn, &key, now, self.config.max_catch_up_days)?;
            if !catch_up.is_complete() {
                return Ok(Err(LedgerError::CatchUpIncomplete {
                    tier: key,
                    remaining_days: catch_up.remaining_days,
                }));
            }

            let mut tier = txn.tier(&key)?.clone();
            let active_liquidity = tier.active_liquidity();
            if active_liquidity == 0 {
                info!(tier = %key, amount, "no active liquidity; reward not taken");
                return Ok(Err(LedgerError::NoActiveLiquidity(key)));
            }
            let accumulator_delta = tier.distribute(amount)?;
            let accumulator = tier.accumulator();
            txn.put_tier(tier);
            txn.emit(LedgerEvent::RewardsDeposited {
                tier: key,
                rewarder: *rewarder,
                amount,
                active_liquidity,
                accumulator,
            });

            self.transfer_in(&asset, rewarder, amount)?;
            info!(tier = %key, rewarder = %rewarder, amount, active_liquidity, "rewards deposited");
            Ok(Ok(RewardReceipt {
                tier: key,
                amount,
                active_liquidity,
                accumulator_delta,
                accumulator,
                catch_up,
            }))
        })
    }

    /// Walk the tier's maturity backlog up to the configured cap. Anyone may call this.
    pub fn catch_up(&self, asset: AssetId, duration: u64) -> Result<CatchUpReport, LedgerError> {
        let now = self.clock.now();
        self.transact(|txn| {
            let key = Self::registered_tier(txn, asset, duration)?;
            maturation::catch_up(txn, &key, now, self.config.max_catch_up_days)
        })
    }

    /// Mature one bucket explicitly. Returns the liquidity retired, if any.
    pub fn mature_bucket(&self, asset: AssetId, duration: u64, day: Timestamp) -> Result<Option<Amount>, LedgerError> {
        let now = self.clock.now();
        self.transact(|txn| {
            let key = Self::registered_tier(txn, asset, duration)?;
            maturation::mature_bucket(txn, &key, day, now)
        })
    }

    // --- views ----------------------------------------------------------

    pub fn tier(&self, asset: AssetId, duration: u64) -> Result<Tier, LedgerError> {
        let key = TierKey::new(asset, duration);
        self.lock()?.tiers.get(&key).cloned().ok_or(LedgerError::TierNotFound(key))
    }

    pub fn tier_totals(&self, asset: AssetId, duration: u64) -> Result<TierTotals, LedgerError> {
        Ok(self.tier(asset, duration)?.totals())
    }

    pub fn last_matured_day(&self, asset: AssetId, duration: u64) -> Result<Option<Timestamp>, LedgerError> {
        Ok(self.tier(asset, duration)?.last_matured_day())
    }

    pub fn bucket(&self, asset: AssetId, duration: u64, day: Timestamp) -> Result<Option<Bucket>, LedgerError> {
        let key = TierKey::new(asset, duration);
        let state = self.lock()?;
        if !state.tiers.contains_key(&key) {
            return Err(LedgerError::TierNotFound(key));
        }
        Ok(state.buckets.get(&key).and_then(|days| days.get(&day)).copied())
    }

    pub fn position(&self, id: PositionId) -> Result<Position, LedgerError> {
        self.lock()?.positions.get(&id).cloned().ok_or(LedgerError::PositionNotFound(id))
    }

    /// What a claim would pay right now, without changing anything.
    pub fn pending_rewards(&self, id: PositionId) -> Result<Amount, LedgerError> {
        let state = self.lock()?;
        let position = state.positions.get(&id).ok_or(LedgerError::PositionNotFound(id))?;
        let growth = position.pending_growth(reference_accumulator(&state, position)?)?;
        position.owed().checked_add(growth).ok_or(LedgerError::ArithmeticOverflow)
    }

    pub fn yield_collection_enabled(&self) -> Result<bool, LedgerError> {
        Ok(self.lock()?.yield_collection_enabled)
    }

    pub fn is_registered(&self, asset: &AssetId) -> Result<bool, LedgerError> {
        Ok(self.lock()?.assets.contains(asset))
    }

    // --- snapshots ------------------------------------------------------

    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        Ok(LedgerSnapshot::capture(&*self.lock()?))
    }

    /// Replace the whole state. Events are not replayed.
    ///
    /// Positions the identity layer does not know are minted back to their
    /// depositor, so a snapshot restored on a fresh host stays withdrawable.
    /// Known positions keep their current owner.
    pub fn restore(&self, caller: &AccountId, snapshot: LedgerSnapshot) -> Result<(), LedgerError> {
        self.require_admin(caller, "restore")?;
        let restored = snapshot.into_state()?;
        let mut state = self.lock()?;
        *state = restored;

        let mut reissued = 0usize;
        for position in state.positions.values() {
            let id = position.id();
            if self.external(|| self.identity.owner_of(&id)).is_none() {
                self.external(|| self.identity.mint(&id, &position.depositor()));
                reissued += 1;
            }
        }
        info!(
            tiers = state.tiers.len(),
            positions = state.positions.len(),
            reissued,
            "ledger restored from snapshot"
        );
        Ok(())
    }
}

/// The accumulator a position accrues against: its bucket's frozen value
/// once matured, the tier's live value before.
fn reference_accumulator(state: &LedgerState, position: &Position) -> Result<Q128, LedgerError> {
    let key = position.tier();
    let tier = state.tiers.get(&key).ok_or(LedgerError::TierNotFound(key))?;
    Ok(state
        .buckets
        .get(&key)
        .and_then(|days| days.get(&position.maturity()))
        .map_or_else(|| tier.accumulator(), |bucket| bucket.reference_accumulator(tier)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenor_core::memory::{ManualClock, MemoryAccessControl, MemoryCustody, MemoryEventLog, MemoryIdentity};

    const DAY: u64 = SECONDS_PER_DAY;
    const ADMIN: AccountId = AccountId([0xAD; 20]);
    const ALICE: AccountId = AccountId([0xA1; 20]);
    const BOB: AccountId = AccountId([0xB0; 20]);
    const USDC: AssetId = AssetId([0x05; 20]);

    struct Fixture {
        ledger: Ledger,
        clock: Arc<ManualClock>,
        custody: Arc<MemoryCustody>,
        identity: Arc<MemoryIdentity>,
        log: Arc<MemoryEventLog>,
    }

    fn fixture(config: LedgerConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let custody = Arc::new(MemoryCustody::new());
        let identity = Arc::new(MemoryIdentity::new());
        let log = Arc::new(MemoryEventLog::new());
        let ledger = Ledger::new(
            config,
            Collaborators {
                clock: clock.clone(),
                custody: custody.clone(),
                identity: identity.clone(),
                access: Arc::new(MemoryAccessControl::with_admin(ADMIN)),
                events: log.clone(),
            },
        );
        for account in [ALICE, BOB, ADMIN] {
            custody.mint(&account, &USDC, 1_000_000);
        }
        ledger.register_asset(&ADMIN, USDC).unwrap();
        ledger.set_duration_tier(&ADMIN, USDC, 30 * DAY, true, true).unwrap();
        ledger.set_duration_tier(&ADMIN, USDC, 30 * DAY, true, true).unwrap();
        Fixture { ledger, clock, custody, identity, log }
    }

    #[test]
    fn open_records_position_bucket_and_custody() {
        let f = fixture(LedgerConfig::default());
        f.clock.set(5 * DAY + 100);
        let id = f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();

        let position = f.ledger.position(id).unwrap();
        assert_eq!(position.maturity(), 35 * DAY);
        assert_eq!(position.deposit_time(), 5 * DAY + 100);
        let bucket = f.ledger.bucket(USDC, 30 * DAY, 35 * DAY).unwrap().unwrap();
        assert_eq!(bucket.liquidity(), 1_000);
        assert_eq!(f.ledger.tier(USDC, 30 * DAY).unwrap().active_liquidity(), 1_000);
        assert_eq!(f.custody.vault_balance(&USDC), 1_000);
        assert_eq!(f.identity.owner_of(&id), Some(ALICE));
        assert_eq!(f.log.count("position_opened"), 1);
    }

    #[test]
    fn open_validation_order() {
        let f = fixture(LedgerConfig::default());
        assert_eq!(
            f.ledger.open(&ALICE, AssetId([9; 20]), 30 * DAY, 1).unwrap_err().kind(),
            "InvalidAsset"
        );
        assert_eq!(f.ledger.open(&ALICE, USDC, 7 * DAY, 1).unwrap_err().kind(), "InvalidDuration");
        assert_eq!(f.ledger.open(&ALICE, USDC, 30 * DAY, 0).unwrap_err().kind(), "InvalidAmount");
    }

    #[test]
    fn strict_policy_needs_second_call() {
        let f = fixture(LedgerConfig::default());
        let tier = f.ledger.set_duration_tier(&ADMIN, USDC, 60 * DAY, true, true).unwrap();
        assert!(!tier.accepts_deposits());
        assert_eq!(f.ledger.open(&ALICE, USDC, 60 * DAY, 1).unwrap_err().kind(), "InvalidDuration");
    }

    #[test]
    fn unsupported_first_call_is_not_found() {
        let f = fixture(LedgerConfig::default());
        assert_eq!(
            f.ledger.set_duration_tier(&ADMIN, USDC, 90 * DAY, false, false).unwrap_err(),
            LedgerError::TierNotFound(TierKey::new(USDC, 90 * DAY))
        );
        assert_eq!(
            f.ledger.set_duration_tier(&ADMIN, USDC, 60, true, true).unwrap_err().kind(),
            "InvalidDuration"
        );
    }

    #[test]
    fn claim_pays_owner_and_tracks_totals() {
        let f = fixture(LedgerConfig::default());
        let id = f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        f.ledger.deposit_reward(&ADMIN, USDC, 30 * DAY, 250).unwrap();

        assert_eq!(f.ledger.pending_rewards(id).unwrap(), 250);
        let before = f.custody.balance(&ALICE, &USDC);
        assert_eq!(f.ledger.claim(&ALICE, id).unwrap(), 250);
        assert_eq!(f.custody.balance(&ALICE, &USDC), before + 250);
        assert_eq!(f.ledger.claim(&ALICE, id).unwrap(), 0);
        assert_eq!(f.log.count("fees_collected"), 1);

        let totals = f.ledger.tier_totals(USDC, 30 * DAY).unwrap();
        assert_eq!(totals.rewards_deposited, 250);
        assert_eq!(totals.rewards_paid, 250);
    }

    #[test]
    fn claim_respects_switch_and_ownership() {
        let f = fixture(LedgerConfig::default());
        let id = f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        assert_eq!(f.ledger.claim(&BOB, id).unwrap_err().kind(), "Unauthorized");

        f.ledger.set_yield_collection(&ADMIN, false).unwrap();
        assert_eq!(f.ledger.claim(&ALICE, id).unwrap_err(), LedgerError::OperationDisabled("claim"));
        // The switch does not gate reward deposits or closes.
        f.ledger.deposit_reward(&ADMIN, USDC, 30 * DAY, 125).unwrap();
        f.clock.set(30 * DAY);
        assert_eq!(f.ledger.close(&ALICE, id).unwrap().rewards, 125);
    }

    #[test]
    fn close_pays_current_owner_and_burns() {
        let f = fixture(LedgerConfig::default());
        let id = f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        assert!(f.identity.transfer(&ALICE, &BOB, &id));
        f.clock.set(30 * DAY);

        assert_eq!(f.ledger.close(&ALICE, id).unwrap_err().kind(), "Unauthorized");
        let receipt = f.ledger.close(&BOB, id).unwrap();
        assert_eq!(receipt.recipient, BOB);
        assert_eq!(receipt.principal, 1_000);
        assert_eq!(f.identity.owner_of(&id), None);
        assert_eq!(f.ledger.position(id).unwrap_err(), LedgerError::PositionNotFound(id));
        assert_eq!(f.custody.vault_balance(&USDC), 0);
    }

    #[test]
    fn failed_custody_rolls_back_everything() {
        let f = fixture(LedgerConfig::default());
        let before = f.ledger.snapshot().unwrap();
        f.log.take();
        f.custody.set_frozen(true);

        assert_eq!(f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap_err().kind(), "Custody");
        assert_eq!(f.ledger.snapshot().unwrap(), before);
        assert!(f.log.is_empty());
    }

    #[test]
    fn reward_with_no_liquidity_commits_catch_up_only() {
        let f = fixture(LedgerConfig::default());
        let id = f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        f.clock.set(31 * DAY);

        let err = f.ledger.deposit_reward(&ADMIN, USDC, 30 * DAY, 50).unwrap_err();
        assert_eq!(err, LedgerError::NoActiveLiquidity(TierKey::new(USDC, 30 * DAY)));
        assert!(f.ledger.bucket(USDC, 30 * DAY, 30 * DAY).unwrap().unwrap().is_matured());
        assert_eq!(f.ledger.last_matured_day(USDC, 30 * DAY).unwrap(), Some(31 * DAY));
        assert_eq!(f.custody.balance(&ADMIN, &USDC), 1_000_000);
        assert_eq!(f.ledger.pending_rewards(id).unwrap(), 0);
        assert_eq!(f.log.count("bucket_matured"), 1);
        assert_eq!(f.log.count("rewards_deposited"), 0);
    }

    #[test]
    fn capped_catch_up_refuses_reward_until_paid_down() {
        let config = LedgerConfig { max_catch_up_days: Some(20), ..LedgerConfig::default() };
        let f = fixture(config);
        f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        f.clock.set(45 * DAY);

        let err = f.ledger.deposit_reward(&ADMIN, USDC, 30 * DAY, 50).unwrap_err();
        assert_eq!(err.kind(), "CatchUpIncomplete");
        assert_eq!(f.ledger.last_matured_day(USDC, 30 * DAY).unwrap(), Some(20 * DAY));

        let report = f.ledger.catch_up(USDC, 30 * DAY).unwrap();
        assert_eq!(report.last_matured_day, 40 * DAY);
        assert_eq!(report.buckets_matured, 1);
        let report = f.ledger.catch_up(USDC, 30 * DAY).unwrap();
        assert!(report.is_complete());
    }

    #[test]
    fn explicit_future_maturation_rejected() {
        let f = fixture(LedgerConfig::default());
        f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        assert_eq!(f.ledger.mature_bucket(USDC, 30 * DAY, 30 * DAY).unwrap_err().kind(), "FutureBucket");
        f.clock.set(30 * DAY);
        assert_eq!(f.ledger.mature_bucket(USDC, 30 * DAY, 30 * DAY).unwrap(), Some(1_000));
        assert_eq!(f.ledger.mature_bucket(USDC, 30 * DAY, 30 * DAY).unwrap(), None);
    }

    #[test]
    fn admin_only_operations() {
        let f = fixture(LedgerConfig::default());
        for err in [
            f.ledger.register_asset(&ALICE, AssetId([7; 20])).unwrap_err(),
            f.ledger.set_duration_tier(&ALICE, USDC, 30 * DAY, false, false).unwrap_err(),
            f.ledger.set_yield_collection(&ALICE, false).unwrap_err(),
            f.ledger.deposit_reward(&ALICE, USDC, 30 * DAY, 1).unwrap_err(),
            f.ledger.restore(&ALICE, f.ledger.snapshot().unwrap()).unwrap_err(),
        ] {
            assert_eq!(err.kind(), "Unauthorized");
        }
    }

    #[test]
    fn register_asset_is_idempotent() {
        let f = fixture(LedgerConfig::default());
        assert!(!f.ledger.register_asset(&ADMIN, USDC).unwrap());
        assert_eq!(f.log.count("asset_registered"), 1);
        assert_eq!(f.ledger.register_asset(&ADMIN, AssetId::ZERO).unwrap_err().kind(), "InvalidAsset");
    }

    #[test]
    fn restore_round_trips_through_bytes() {
        let f = fixture(LedgerConfig::default());
        let id = f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        f.ledger.deposit_reward(&ADMIN, USDC, 30 * DAY, 125).unwrap();
        let bytes = f.ledger.snapshot().unwrap().encode().unwrap();

        f.clock.set(30 * DAY);
        f.ledger.close(&ALICE, id).unwrap();
        assert!(f.ledger.position(id).is_err());

        f.ledger.restore(&ADMIN, LedgerSnapshot::decode(&bytes).unwrap()).unwrap();
        assert_eq!(f.ledger.pending_rewards(id).unwrap(), 125);
        assert_eq!(f.identity.owner_of(&id), Some(ALICE));
    }

    #[test]
    fn restore_reissues_only_unknown_positions() {
        let f = fixture(LedgerConfig::default());
        let moved = f.ledger.open(&ALICE, USDC, 30 * DAY, 1_000).unwrap();
        let burned = f.ledger.open(&ALICE, USDC, 30 * DAY, 500).unwrap();
        assert!(f.identity.transfer(&ALICE, &BOB, &moved));
        let snapshot = f.ledger.snapshot().unwrap();

        f.clock.set(30 * DAY);
        f.ledger.close(&ALICE, burned).unwrap();
        assert_eq!(f.identity.owner_of(&burned), None);

        f.ledger.restore(&ADMIN, snapshot).unwrap();
        assert_eq!(f.identity.owner_of(&moved), Some(BOB));
        assert_eq!(f.identity.owner_of(&burned), Some(ALICE));
    }
}
