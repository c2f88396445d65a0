//! Shared test helpers for scenario and integration tests.

use std::sync::Arc;

use tenor_core::constants::SECONDS_PER_DAY;
use tenor_core::error::LedgerError;
use tenor_core::memory::{ManualClock, MemoryAccessControl, MemoryCustody, MemoryEventLog, MemoryIdentity};
use tenor_core::traits::{Custody, Identity};
use tenor_core::types::{AccountId, Amount, AssetId, PositionId};
use tenor_ledger::{Collaborators, Ledger, LedgerConfig, RewardReceipt};

pub const DAY: u64 = SECONDS_PER_DAY;

/// Starting balance of every account the harness funds.
pub const FUNDING: Amount = 1_000_000_000;

/// Account from a seed byte.
pub fn account(seed: u8) -> AccountId {
    AccountId([seed; 20])
}

/// Asset from a seed byte.
pub fn asset(seed: u8) -> AssetId {
    AssetId([seed; 20])
}

/// Install a test-writer tracing subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A ledger on in-memory collaborators with one registered asset.
///
/// The clock starts at zero. The admin also holds the rewarder role.
pub struct Harness {
    pub ledger: Arc<Ledger>,
    pub clock: Arc<ManualClock>,
    pub custody: Arc<MemoryCustody>,
    pub identity: Arc<MemoryIdentity>,
    pub access: Arc<MemoryAccessControl>,
    pub log: Arc<MemoryEventLog>,
    pub admin: AccountId,
    pub asset: AssetId,
}

impl Harness {
    pub fn new(config: LedgerConfig) -> Self {
        Self::build(
            config,
            |custody| custody as Arc<dyn Custody>,
            |identity| identity as Arc<dyn Identity>,
        )
    }

    /// Like [`new`](Self::new), letting the caller wrap the custody and
    /// identity collaborators the ledger sees.
    pub fn build(
        config: LedgerConfig,
        wrap_custody: impl FnOnce(Arc<MemoryCustody>) -> Arc<dyn Custody>,
        wrap_identity: impl FnOnce(Arc<MemoryIdentity>) -> Arc<dyn Identity>,
    ) -> Self {
        init_tracing();
        let admin = account(0xAD);
        let asset = asset(0x55);
        let clock = Arc::new(ManualClock::new(0));
        let custody = Arc::new(MemoryCustody::new());
        let identity = Arc::new(MemoryIdentity::new());
        let access = Arc::new(MemoryAccessControl::with_admin(admin));
        let log = Arc::new(MemoryEventLog::new());

        let ledger = Arc::new(Ledger::new(
            config,
            Collaborators {
                clock: clock.clone(),
                custody: wrap_custody(custody.clone()),
                identity: wrap_identity(identity.clone()),
                access: access.clone(),
                events: log.clone(),
            },
        ));
        ledger.register_asset(&admin, asset).expect("admin registers asset");
        custody.mint(&admin, &asset, FUNDING);

        Self { ledger, clock, custody, identity, access, log, admin, asset }
    }

    /// Create the tier for `duration` and open it for deposits under any retoggle policy.
    pub fn enable_tier(&self, duration: u64) {
        self.ledger
            .set_duration_tier(&self.admin, self.asset, duration, true, true)
            .expect("create tier");
        self.ledger
            .set_duration_tier(&self.admin, self.asset, duration, true, true)
            .expect("enable minting");
    }

    pub fn fund(&self, who: &AccountId) {
        self.custody.mint(who, &self.asset, FUNDING);
    }

    pub fn balance(&self, who: &AccountId) -> Amount {
        self.custody.balance(who, &self.asset)
    }

    pub fn open(&self, who: &AccountId, duration: u64, principal: Amount) -> PositionId {
        self.ledger.open(who, self.asset, duration, principal).expect("open position")
    }

    pub fn reward(&self, duration: u64, amount: Amount) -> Result<RewardReceipt, LedgerError> {
        self.ledger.deposit_reward(&self.admin, self.asset, duration, amount)
    }

    pub fn at_day(&self, day: u64) {
        self.clock.set(day * DAY);
    }
}
