//! Settlement of trade slots when a session ends.
//!
//! Each slot is resolved on its own: back into the main inventory when it
//! fits, otherwise onto the ground at the client's position. Nothing here can
//! fail, and the trade inventory is always empty afterwards.

use barter_world::{ClientId, ItemStack, Position};

use crate::host::TradeWorld;
use crate::inventory::{TRADE_SLOT_COUNT, TradeInventory};

/// Where the contents of the trade slots ended up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    /// Stacks added back to the main inventory.
    pub returned: Vec<ItemStack>,
    /// Stacks dropped into the world.
    pub dropped: Vec<ItemStack>,
}

impl Settlement {
    pub fn returned_count(&self) -> u32 {
        self.returned.iter().map(|s| s.count).sum()
    }

    pub fn dropped_count(&self) -> u32 {
        self.dropped.iter().map(|s| s.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.returned.is_empty() && self.dropped.is_empty()
    }
}

/// Empty `inventory` into the client's main inventory or the world.
///
/// `fallback_position` is used when the client no longer has a position in
/// the world (e.g. already despawned on disconnect).
pub fn settle<W: TradeWorld + ?Sized>(
    world: &mut W,
    client: ClientId,
    inventory: &mut TradeInventory,
    fallback_position: Position,
) -> Settlement {
    let position = world.client_position(client).unwrap_or(fallback_position);
    let mut settlement = Settlement::default();

    for slot in 0..TRADE_SLOT_COUNT {
        if let Some(item) = inventory.take(slot) {
            settle_item(world, client, slot, item, position, &mut settlement);
        }
    }
    inventory.clear_all();

    settlement
}

fn settle_item<W: TradeWorld + ?Sized>(
    world: &mut W,
    client: ClientId,
    slot: usize,
    item: ItemStack,
    position: Position,
    out: &mut Settlement,
) {
    let fits = world
        .inventory(client)
        .is_some_and(|main| main.can_add_item(&item));

    let leftover = match world.inventory_mut(client) {
        Some(main) if fits => {
            let template = item.clone();
            let rest = main.add_item(item);
            let kept = template.count - rest.as_ref().map_or(0, |r| r.count);
            if kept > 0 {
                out.returned.push(ItemStack {
                    count: kept,
                    ..template
                });
            }
            rest
        }
        _ => Some(item),
    };

    if let Some(rest) = leftover {
        tracing::warn!(
            client,
            slot,
            item_type = rest.item_type,
            count = rest.count,
            "main inventory cannot take trade item, dropping into world"
        );
        world.drop_item(rest.clone(), position);
        out.dropped.push(rest);
    }
}
