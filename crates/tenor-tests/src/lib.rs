//! Integration test suite for the Tenor ledger.
//!
//! The tests in `tests/` drive a [`Ledger`](tenor_ledger::Ledger) wired to
//! the in-memory collaborators through [`helpers::Harness`]: the worked
//! scenarios, randomized invariants, and attempts to break atomicity,
//! authorization and reentrancy from a hostile caller's side.

pub mod helpers;
