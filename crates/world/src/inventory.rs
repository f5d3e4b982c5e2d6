//! Item stacks and the player's main inventory.
//!
//! The main inventory is a fixed number of slots. Adding an item first tops
//! up existing stacks of the same type, then fills empty slots in order.

/// Item type identifier (engine-assigned).
pub type ItemTypeId = u32;

/// Default maximum stack size for an item type.
pub const DEFAULT_MAX_STACK_SIZE: u32 = 64;

/// Default number of slots in a player's main inventory.
pub const DEFAULT_INVENTORY_SIZE: usize = 36;

/// A stack of identical items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    pub item_type: ItemTypeId,
    pub count: u32,
    pub max_stack_size: u32,
}

impl ItemStack {
    /// Create a stack with the default max stack size.
    pub fn new(item_type: ItemTypeId, count: u32) -> Self {
        Self {
            item_type,
            count,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
        }
    }

    /// Override the max stack size (e.g. tools stack to 1).
    pub fn with_max_stack_size(mut self, max_stack_size: u32) -> Self {
        self.max_stack_size = max_stack_size.max(1);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True if `other` can merge into this stack (ignoring room).
    pub fn can_stack_with(&self, other: &ItemStack) -> bool {
        self.item_type == other.item_type && self.max_stack_size == other.max_stack_size
    }

    /// Remaining room before this stack is full.
    pub fn room(&self) -> u32 {
        self.max_stack_size.saturating_sub(self.count)
    }

    /// Split `count` items off this stack. Returns `None` if not enough items.
    pub fn split(&mut self, count: u32) -> Option<ItemStack> {
        if count == 0 || count > self.count {
            return None;
        }
        self.count -= count;
        Some(ItemStack {
            item_type: self.item_type,
            count,
            max_stack_size: self.max_stack_size,
        })
    }
}

/// A player's main inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInventory {
    slots: Vec<Option<ItemStack>>,
}

impl PlayerInventory {
    /// Create an empty inventory with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Item in `slot`, or `None` if empty or out of range.
    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Replace the contents of `slot`. Returns the previous contents.
    ///
    /// Empty stacks are normalized to `None`. Out-of-range slots are ignored
    /// and hand the item back.
    pub fn set(&mut self, slot: usize, item: Option<ItemStack>) -> Option<ItemStack> {
        let item = item.filter(|i| !i.is_empty());
        match self.slots.get_mut(slot) {
            Some(current) => std::mem::replace(current, item),
            None => item,
        }
    }

    /// True if the whole stack fits.
    pub fn can_add_item(&self, item: &ItemStack) -> bool {
        if item.is_empty() {
            return true;
        }
        let mut remaining = item.count;
        for slot in &self.slots {
            let room = match slot {
                Some(existing) if existing.can_stack_with(item) => existing.room(),
                Some(_) => 0,
                None => item.max_stack_size,
            };
            remaining = remaining.saturating_sub(room);
            if remaining == 0 {
                return true;
            }
        }
        false
    }

    /// Add as much of `item` as fits. Returns the leftover, if any.
    pub fn add_item(&mut self, item: ItemStack) -> Option<ItemStack> {
        let mut remaining = item;

        // Top up existing stacks first
        for existing in self.slots.iter_mut().flatten() {
            if remaining.is_empty() {
                break;
            }
            if existing.can_stack_with(&remaining) {
                let moved = existing.room().min(remaining.count);
                existing.count += moved;
                remaining.count -= moved;
            }
        }

        // Then fill empty slots
        for slot in self.slots.iter_mut().filter(|s| s.is_none()) {
            if remaining.is_empty() {
                break;
            }
            let moved = remaining.max_stack_size.min(remaining.count);
            *slot = Some(ItemStack {
                count: moved,
                ..remaining.clone()
            });
            remaining.count -= moved;
        }

        if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        }
    }

    /// Total number of items of `item_type` across all slots.
    pub fn count_of(&self, item_type: ItemTypeId) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.item_type == item_type)
            .map(|s| s.count)
            .sum()
    }
}

impl Default for PlayerInventory {
    fn default() -> Self {
        Self::new(DEFAULT_INVENTORY_SIZE)
    }
}
