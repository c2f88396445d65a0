//! Criterion benchmarks for tenor-ledger critical operations.
//!
//! Covers: catch-up over a long backlog of funded days, and a reward deposit
//! on a tier that is already current.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use tenor_core::constants::SECONDS_PER_DAY;
use tenor_core::memory::{ManualClock, MemoryAccessControl, MemoryCustody, MemoryEventLog, MemoryIdentity};
use tenor_core::types::{AccountId, AssetId};
use tenor_ledger::{Collaborators, Ledger, LedgerConfig};

const ADMIN: AccountId = AccountId([0xAD; 20]);
const ASSET: AssetId = AssetId([0x11; 20]);
const DURATION: u64 = 30 * SECONDS_PER_DAY;

/// A ledger with one position opened on each of `days` consecutive days.
fn ledger_with_daily_deposits(days: u64) -> (Ledger, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let custody = Arc::new(MemoryCustody::new());
    custody.mint(&ADMIN, &ASSET, u128::MAX / 2);
    let ledger = Ledger::new(
        LedgerConfig::unbounded(),
        Collaborators {
            clock: clock.clone(),
            custody,
            identity: Arc::new(MemoryIdentity::new()),
            access: Arc::new(MemoryAccessControl::with_admin(ADMIN)),
            events: Arc::new(MemoryEventLog::new()),
        },
    );
    ledger.register_asset(&ADMIN, ASSET).expect("admin registers");
    ledger.set_duration_tier(&ADMIN, ASSET, DURATION, true, true).expect("create tier");
    ledger.set_duration_tier(&ADMIN, ASSET, DURATION, true, true).expect("enable mint");
    for _ in 0..days {
        ledger.open(&ADMIN, ASSET, DURATION, 1_000).expect("open");
        clock.advance_days(1);
    }
    (ledger, clock)
}

fn bench_catch_up_backlog(c: &mut Criterion) {
    c.bench_function("catch_up_365_day_backlog", |b| {
        b.iter_batched(
            || {
                let (ledger, clock) = ledger_with_daily_deposits(365);
                clock.advance_days(400);
                ledger
            },
            |ledger| ledger.catch_up(black_box(ASSET), DURATION),
            BatchSize::LargeInput,
        )
    });
}

fn bench_deposit_reward(c: &mut Criterion) {
    let (ledger, _clock) = ledger_with_daily_deposits(20);

    c.bench_function("deposit_reward_current_tier", |b| {
        b.iter(|| ledger.deposit_reward(&ADMIN, ASSET, DURATION, black_box(1_000)))
    });
}

criterion_group!(benches, bench_catch_up_backlog, bench_deposit_reward);
criterion_main!(benches);
