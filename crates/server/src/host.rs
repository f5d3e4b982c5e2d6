//! Seams between the trade core and its host.
//!
//! `Transport` delivers clientbound packets; `TradeWorld` exposes the small
//! slice of the engine the core needs (client lookup, main inventory, world
//! drops, entity properties, runtime id allocation).

use std::collections::HashSet;

use barter_wire::ClientboundPacket;
use barter_world::{
    AllocError, ClientId, EntityId, ItemStack, NetworkProperty, PlayerInventory, Position, World,
};

use crate::error::DispatchError;

/// Fire-and-forget packet delivery to one client.
pub trait Transport {
    /// Queue `packet` for `client`. Packets to one client are delivered in call order.
    fn send(&mut self, client: ClientId, packet: ClientboundPacket) -> Result<(), DispatchError>;

    /// True while `client` can still receive packets.
    fn is_connected(&self, client: ClientId) -> bool;
}

/// Engine operations used by the trade core.
pub trait TradeWorld {
    /// Runtime id of the client's own entity.
    fn client_runtime_id(&self, client: ClientId) -> Option<EntityId>;

    fn client_position(&self, client: ClientId) -> Option<Position>;

    fn inventory(&self, client: ClientId) -> Option<&PlayerInventory>;

    fn inventory_mut(&mut self, client: ClientId) -> Option<&mut PlayerInventory>;

    fn drop_item(&mut self, item: ItemStack, position: Position);

    fn entity_exists(&self, entity: EntityId) -> bool;

    /// Write a replicated property. Returns false if the entity is gone.
    fn set_network_property(&mut self, entity: EntityId, property: NetworkProperty, value: i64)
    -> bool;

    fn network_property(&self, entity: EntityId, property: NetworkProperty) -> Option<i64>;

    /// Allocate a globally unique runtime id.
    fn next_runtime_id(&self) -> Result<EntityId, AllocError>;
}

impl TradeWorld for World {
    fn client_runtime_id(&self, client: ClientId) -> Option<EntityId> {
        self.player(client).map(|p| p.runtime_id)
    }

    fn client_position(&self, client: ClientId) -> Option<Position> {
        self.player(client).map(|p| p.position)
    }

    fn inventory(&self, client: ClientId) -> Option<&PlayerInventory> {
        self.player(client).map(|p| &p.inventory)
    }

    fn inventory_mut(&mut self, client: ClientId) -> Option<&mut PlayerInventory> {
        self.player_mut(client).map(|p| &mut p.inventory)
    }

    fn drop_item(&mut self, item: ItemStack, position: Position) {
        World::drop_item(self, item, position);
    }

    fn entity_exists(&self, entity: EntityId) -> bool {
        self.entity(entity).is_some()
    }

    fn set_network_property(
        &mut self,
        entity: EntityId,
        property: NetworkProperty,
        value: i64,
    ) -> bool {
        match self.entity_mut(entity) {
            Some(e) => {
                e.set_property(property, value);
                true
            }
            None => false,
        }
    }

    fn network_property(&self, entity: EntityId, property: NetworkProperty) -> Option<i64> {
        self.entity(entity).and_then(|e| e.property(property))
    }

    fn next_runtime_id(&self) -> Result<EntityId, AllocError> {
        World::next_runtime_id(self)
    }
}

/// In-memory transport that records every delivered packet in order.
///
/// Clients marked disconnected reject packets with `DispatchError::Unreachable`.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Vec<(ClientId, ClientboundPacket)>,
    disconnected: HashSet<ClientId>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disconnect(&mut self, client: ClientId) {
        self.disconnected.insert(client);
    }

    pub fn reconnect(&mut self, client: ClientId) {
        self.disconnected.remove(&client);
    }

    /// Every delivered packet, in delivery order.
    pub fn sent(&self) -> &[(ClientId, ClientboundPacket)] {
        &self.sent
    }

    /// Packets delivered to `client`, in delivery order.
    pub fn sent_to(&self, client: ClientId) -> Vec<&ClientboundPacket> {
        self.sent
            .iter()
            .filter(|(c, _)| *c == client)
            .map(|(_, p)| p)
            .collect()
    }

    /// Names of packets delivered to `client`, in delivery order.
    pub fn names_sent_to(&self, client: ClientId) -> Vec<&'static str> {
        self.sent_to(client).into_iter().map(ClientboundPacket::name).collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, client: ClientId, packet: ClientboundPacket) -> Result<(), DispatchError> {
        if self.disconnected.contains(&client) {
            return Err(DispatchError::Unreachable(client));
        }
        self.sent.push((client, packet));
        Ok(())
    }

    fn is_connected(&self, client: ClientId) -> bool {
        !self.disconnected.contains(&client)
    }
}
