//! Trait interfaces for the ledger's external collaborators.
//!
//! The engine never moves value, decides ownership or grants roles itself.
//! These traits are the seams to the layers that do:
//! - [`Clock`] — the host's notion of "now"
//! - [`Custody`] — moves assets in and out of the ledger vault
//! - [`Identity`] — maps positions to controlling accounts
//! - [`AccessControl`] — administrative and rewarder roles
//! - [`EventSink`] — receives committed events for external indexing

use crate::error::CustodyError;
use crate::events::LedgerEvent;
use crate::types::{AccountId, Amount, AssetId, PositionId, Timestamp};

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Asset movement between accounts and the ledger vault.
///
/// Both directions may fail. A failed transfer must leave balances unchanged;
/// the ledger rolls its own state back when either call returns `Err`.
pub trait Custody: Send + Sync {
    /// Move `amount` of `asset` from `from` into the ledger vault.
    fn transfer_in(&self, asset: &AssetId, from: &AccountId, amount: Amount) -> Result<(), CustodyError>;

    /// Move `amount` of `asset` from the ledger vault to `to`.
    fn transfer_out(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<(), CustodyError>;
}

/// Ownership of positions.
///
/// The ledger calls [`mint`](Identity::mint) when a position opens and
/// [`burn`](Identity::burn) when it closes; transfers and approvals are
/// entirely the identity layer's business.
pub trait Identity: Send + Sync {
    /// Controlling account of a position, or `None` if it does not exist.
    fn owner_of(&self, id: &PositionId) -> Option<AccountId>;

    /// Whether `account` may claim or close the position.
    ///
    /// Default implementation: only the owner is authorized.
    fn is_authorized(&self, account: &AccountId, id: &PositionId) -> bool {
        self.owner_of(id).as_ref() == Some(account)
    }

    fn mint(&self, id: &PositionId, owner: &AccountId);

    fn burn(&self, id: &PositionId);
}

/// Role checks for privileged operations.
pub trait AccessControl: Send + Sync {
    /// May mutate the tier registry, toggle yield collection and restore snapshots.
    fn is_admin(&self, account: &AccountId) -> bool;

    /// May deposit rewards.
    fn has_rewarder_role(&self, account: &AccountId) -> bool;
}

/// Receives events after the operation that produced them has committed.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LedgerEvent);
}
