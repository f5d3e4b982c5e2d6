//! Trade server error types.

use barter_world::{AllocError, ClientId, EntityId};

/// Transport dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("client {0} is not reachable")]
    Unreachable(ClientId),
}

/// Errors surfaced by trade session operations.
///
/// Closing an idle client, unreachable clients and full inventories are not
/// errors; they have fixed fallbacks inside the manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeError {
    #[error("client {0} is not registered for trading")]
    NotRegistered(ClientId),
    #[error("client {0} is not present in the world")]
    UnknownClient(ClientId),
    #[error("trade counterpart entity {0} not found")]
    CounterpartyNotFound(EntityId),
    #[error("runtime id allocation failed: {0}")]
    Allocation(#[from] AllocError),
    #[error("client {0} has no active trade session")]
    NoActiveSession(ClientId),
    #[error("invalid slot {0:?}")]
    InvalidSlot(crate::inventory::SlotRef),
    #[error("not enough items in {0:?}")]
    ItemUnavailable(crate::inventory::SlotRef),
    #[error("slot {0:?} cannot accept the item")]
    SlotOccupied(crate::inventory::SlotRef),
}
