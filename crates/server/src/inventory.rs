//! Per-client trade inventory.
//!
//! Two reserved slots hold whatever the client has put up during an open
//! trade. The inventory outlives individual sessions: it is created when the
//! client becomes trade-capable and is emptied by settlement on every close.

use barter_world::{ClientId, ItemStack};

/// Slot holding the client's offer.
pub const OFFER_SLOT: usize = 0;

/// Slot holding the counter-offer.
pub const COUNTER_OFFER_SLOT: usize = 1;

/// Number of trade slots.
pub const TRADE_SLOT_COUNT: usize = 2;

/// Address of a slot an item can move between during a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRef {
    /// Slot of the client's main inventory.
    Main(usize),
    /// One of the two trade slots.
    Trade(usize),
}

/// Two-slot trade container bound to one client.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeInventory {
    owner: ClientId,
    slots: [Option<ItemStack>; TRADE_SLOT_COUNT],
}

impl TradeInventory {
    pub fn new(owner: ClientId) -> Self {
        Self {
            owner,
            slots: [None, None],
        }
    }

    pub fn owner(&self) -> ClientId {
        self.owner
    }

    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Replace slot contents, returning what was there.
    ///
    /// Out-of-range slots hand the item back untouched.
    pub fn set(&mut self, slot: usize, item: Option<ItemStack>) -> Option<ItemStack> {
        let item = item.filter(|i| !i.is_empty());
        match self.slots.get_mut(slot) {
            Some(current) => std::mem::replace(current, item),
            None => item,
        }
    }

    /// Remove and return the contents of `slot`.
    pub fn take(&mut self, slot: usize) -> Option<ItemStack> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn clear_all(&mut self) {
        self.slots = [None, None];
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Total item count across both slots.
    pub fn item_count(&self) -> u32 {
        self.slots.iter().flatten().map(|s| s.count).sum()
    }
}
