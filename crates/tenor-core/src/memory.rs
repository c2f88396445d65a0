//! In-memory collaborator implementations.
//!
//! Suitable for tests and for embedding the ledger in a host that keeps
//! balances, ownership and roles elsewhere. Nothing here persists.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::constants::SECONDS_PER_DAY;
use crate::error::CustodyError;
use crate::events::LedgerEvent;
use crate::traits::{AccessControl, Clock, Custody, EventSink, Identity};
use crate::types::{AccountId, Amount, AssetId, PositionId, Timestamp};

/// Wall-clock time from the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: AtomicU64::new(now) }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: u64) {
        self.advance(days * SECONDS_PER_DAY);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Account balances plus one vault balance per asset.
///
/// `transfer_in` debits the account and credits the vault; `transfer_out`
/// does the reverse. Either direction can be forced to fail with
/// [`set_frozen`](Self::set_frozen) for fault-injection tests.
#[derive(Debug, Default)]
pub struct MemoryCustody {
    balances: Mutex<HashMap<(AccountId, AssetId), Amount>>,
    vault: Mutex<HashMap<AssetId, Amount>>,
    frozen: AtomicBool,
}

impl MemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account out of thin air.
    pub fn mint(&self, account: &AccountId, asset: &AssetId, amount: Amount) {
        let mut balances = self.balances.lock();
        let entry = balances.entry((*account, *asset)).or_default();
        *entry = entry.saturating_add(amount);
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> Amount {
        self.balances.lock().get(&(*account, *asset)).copied().unwrap_or(0)
    }

    pub fn vault_balance(&self, asset: &AssetId) -> Amount {
        self.vault.lock().get(asset).copied().unwrap_or(0)
    }

    /// While frozen, every transfer fails with [`CustodyError::Rejected`].
    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::SeqCst);
    }

    fn check_frozen(&self) -> Result<(), CustodyError> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(CustodyError::Rejected("custody frozen".into()));
        }
        Ok(())
    }
}

impl Custody for MemoryCustody {
    fn transfer_in(&self, asset: &AssetId, from: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        self.check_frozen()?;
        let mut balances = self.balances.lock();
        let have = balances.get(&(*from, *asset)).copied().unwrap_or(0);
        if have < amount {
            return Err(CustodyError::InsufficientBalance { have, need: amount });
        }
        let mut vault = self.vault.lock();
        let held = vault.entry(*asset).or_default();
        *held = held
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Rejected("vault balance overflow".into()))?;
        balances.insert((*from, *asset), have - amount);
        Ok(())
    }

    fn transfer_out(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        self.check_frozen()?;
        let mut vault = self.vault.lock();
        let have = vault.get(asset).copied().unwrap_or(0);
        if have < amount {
            return Err(CustodyError::VaultUnderfunded { asset: *asset, have, need: amount });
        }
        vault.insert(*asset, have - amount);
        drop(vault);
        self.mint(to, asset, amount);
        Ok(())
    }
}

/// Position ownership with transfers and operator approvals.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    owners: RwLock<HashMap<PositionId, AccountId>>,
    /// (owner, operator) pairs. An operator may act on all of the owner's positions.
    operators: RwLock<HashSet<(AccountId, AccountId)>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a position to a new owner. Returns `false` if `from` does not own it.
    pub fn transfer(&self, from: &AccountId, to: &AccountId, id: &PositionId) -> bool {
        let mut owners = self.owners.write();
        match owners.get_mut(id) {
            Some(owner) if owner == from => {
                *owner = *to;
                true
            }
            _ => false,
        }
    }

    pub fn set_operator(&self, owner: &AccountId, operator: &AccountId, approved: bool) {
        let mut operators = self.operators.write();
        if approved {
            operators.insert((*owner, *operator));
        } else {
            operators.remove(&(*owner, *operator));
        }
    }

    pub fn position_count(&self) -> usize {
        self.owners.read().len()
    }
}

impl Identity for MemoryIdentity {
    fn owner_of(&self, id: &PositionId) -> Option<AccountId> {
        self.owners.read().get(id).copied()
    }

    fn is_authorized(&self, account: &AccountId, id: &PositionId) -> bool {
        match self.owner_of(id) {
            Some(owner) if owner == *account => true,
            Some(owner) => self.operators.read().contains(&(owner, *account)),
            None => false,
        }
    }

    fn mint(&self, id: &PositionId, owner: &AccountId) {
        self.owners.write().insert(*id, *owner);
    }

    fn burn(&self, id: &PositionId) {
        self.owners.write().remove(id);
    }
}

/// Admin and rewarder role sets.
#[derive(Debug, Default)]
pub struct MemoryAccessControl {
    admins: RwLock<HashSet<AccountId>>,
    rewarders: RwLock<HashSet<AccountId>>,
}

impl MemoryAccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role sets with one admin who is also a rewarder.
    pub fn with_admin(admin: AccountId) -> Self {
        let acl = Self::default();
        acl.grant_admin(admin);
        acl.grant_rewarder(admin);
        acl
    }

    pub fn grant_admin(&self, account: AccountId) {
        self.admins.write().insert(account);
    }

    pub fn revoke_admin(&self, account: &AccountId) {
        self.admins.write().remove(account);
    }

    pub fn grant_rewarder(&self, account: AccountId) {
        self.rewarders.write().insert(account);
    }

    pub fn revoke_rewarder(&self, account: &AccountId) {
        self.rewarders.write().remove(account);
    }
}

impl AccessControl for MemoryAccessControl {
    fn is_admin(&self, account: &AccountId) -> bool {
        self.admins.read().contains(account)
    }

    fn has_rewarder_role(&self, account: &AccountId) -> bool {
        self.rewarders.read().contains(account)
    }
}

/// Collects events in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<LedgerEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().clone()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemoryEventLog {
    fn emit(&self, event: &LedgerEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Writes every event as a structured `info!` line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &LedgerEvent) {
        match event.to_json() {
            Ok(json) => info!(target: "tenor::events", event = event.name(), payload = %json),
            Err(e) => info!(target: "tenor::events", event = event.name(), "unencodable event: {e}"),
        }
    }
}
