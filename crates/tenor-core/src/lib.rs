//! # tenor-core
//! Foundation types, fixed-point math and collaborator traits for the Tenor ledger.

pub mod constants;
pub mod error;
pub mod events;
pub mod fixed;
pub mod memory;
pub mod traits;
pub mod types;
