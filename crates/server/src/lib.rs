//! Barter Trade Server
//!
//! The trade server tracks, per connected client, at most one open trade with
//! either a live world entity or a synthetic merchant. It owns:
//! - The session registry (trade inventories and active sessions)
//! - Trade UI synchronization (`UpdateTrade`, `AddActor`, `RemoveActor`,
//!   `ContainerClose`)
//! - Settlement of the trade slots when a session ends
//! - Translation of host events into session operations
//!
//! # Lifecycle
//!
//! Per client: `NoSession → Open → NoSession`. Opening always runs the close
//! path first, so there is never a direct `Open → Open` transition.
//!
//! # Ordering
//!
//! For a synthetic trader, `AddActor` is dispatched before `UpdateTrade`;
//! the client cannot attach the trade UI to an actor it has not seen.

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod host;
pub mod inventory;
pub mod properties;
pub mod registry;
pub mod settlement;

use barter_wire::{
    ACTOR_TYPE_NPC, ActorMetadataEntry, AddActor, ClientboundPacket, ContainerClose, RemoveActor,
    UpdateTrade, WINDOW_TYPE_TRADING,
};
use barter_world::{ClientId, EntityId, ItemStack, NetworkProperty, Position, signed_runtime_id};
use prost::Message;

pub use error::{DispatchError, TradeError};
pub use events::TradeEvent;
pub use host::{RecordingTransport, TradeWorld, Transport};
pub use inventory::{COUNTER_OFFER_SLOT, OFFER_SLOT, SlotRef, TradeInventory};
pub use properties::{
    Counterparty, MerchantRecipe, MerchantRecipeList, RecipeCatalog, ResolvedCounterparty,
    TIER_EXP_REQUIREMENTS, TraderProperties,
};
pub use registry::{SessionRegistry, TradeSession};
pub use settlement::Settlement;

use inventory::TRADE_SLOT_COUNT;

// ============================================================================
// Defaults
// ============================================================================

/// Offset from the client's position at which a synthetic trader is spawned.
pub const SYNTHETIC_TRADER_OFFSET: [f64; 3] = [0.0, -2.0, 0.0];

/// `TradingPlayer` value for an entity nobody is trading with.
pub const IDLE_TRADING_PLAYER: i64 = -1;

// ============================================================================
// Configuration
// ============================================================================

/// Trade server configuration.
#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// Window id used for the trade UI and its close packets.
    pub window_id: u32,
    pub synthetic_spawn_offset: [f64; 3],
    pub idle_trading_player: i64,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            window_id: WINDOW_TYPE_TRADING,
            synthetic_spawn_offset: SYNTHETIC_TRADER_OFFSET,
            idle_trading_player: IDLE_TRADING_PLAYER,
        }
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Coordinates trade sessions for all clients.
///
/// Operations on one client are expected to be serialized by the host; the
/// manager itself takes `&mut self` and does no locking.
pub struct TradeSessionManager<T: Transport> {
    config: TradeConfig,
    registry: SessionRegistry,
    transport: T,
}

impl<T: Transport> TradeSessionManager<T> {
    /// Create a manager with an empty registry.
    pub fn new(config: TradeConfig, transport: T) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            transport,
        }
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Make `client` trade-capable with a fresh, empty trade inventory.
    ///
    /// A session still open from an earlier registration is closed and
    /// settled first so its items are not lost with the old inventory.
    pub fn register<W: TradeWorld + ?Sized>(&mut self, world: &mut W, client: ClientId) {
        if self.registry.is_active(client) {
            let send_packet = self.transport.is_connected(client);
            self.close_session(world, client, send_packet);
        }
        self.registry.register(client);
        tracing::debug!(client, "client registered for trading");
    }

    /// Remove `client` from the registry, closing and settling any open
    /// session first. Packets are only sent if the client is still reachable.
    pub fn unregister<W: TradeWorld + ?Sized>(
        &mut self,
        world: &mut W,
        client: ClientId,
    ) -> Option<Settlement> {
        let send_packet = self.transport.is_connected(client);
        let settlement = self.close_session(world, client, send_packet);
        self.registry.remove(client);
        tracing::debug!(client, "client unregistered from trading");
        settlement
    }

    pub fn lookup(&self, client: ClientId) -> Option<&TradeInventory> {
        self.registry.lookup(client)
    }

    pub fn is_active(&self, client: ClientId) -> bool {
        self.registry.is_active(client)
    }

    /// Alias of [`Self::is_active`] for callers asking about the player.
    pub fn is_trading(&self, client: ClientId) -> bool {
        self.is_active(client)
    }

    /// The open session for `client`, if any.
    pub fn session(&self, client: ClientId) -> Option<&TradeSession> {
        self.registry.session(client)
    }

    // ------------------------------------------------------------------------
    // Open
    // ------------------------------------------------------------------------

    /// Open the trade UI for `client`.
    ///
    /// Any session the client already has is closed and settled first.
    /// Returns the runtime id of the trader the UI is attached to.
    pub fn open_session<W: TradeWorld + ?Sized>(
        &mut self,
        world: &mut W,
        client: ClientId,
        catalog: &dyn RecipeCatalog,
        properties: &TraderProperties,
    ) -> Result<EntityId, TradeError> {
        self.close_session(world, client, true);

        if !self.registry.is_registered(client) {
            return Err(TradeError::NotRegistered(client));
        }
        let client_runtime_id = world
            .client_runtime_id(client)
            .ok_or(TradeError::UnknownClient(client))?;
        let position = world
            .client_position(client)
            .ok_or(TradeError::UnknownClient(client))?;

        let offers = properties::offers_payload(catalog, properties).encode_to_vec();
        let trade_properties = properties.network_properties(client_runtime_id);

        let counterparty = match properties.counterparty {
            Counterparty::Live(entity) => {
                if !world.entity_exists(entity) {
                    return Err(TradeError::CounterpartyNotFound(entity));
                }
                for (property, value) in trade_properties {
                    world.set_network_property(entity, property, value);
                }
                ResolvedCounterparty::Live(entity)
            }
            Counterparty::Synthetic => {
                let runtime_id = world.next_runtime_id()?;
                let spawn = AddActor {
                    actor_type: ACTOR_TYPE_NPC,
                    runtime_id,
                    position: offset(position, self.config.synthetic_spawn_offset).to_vec(),
                    metadata: trade_properties
                        .iter()
                        .map(|&(property, value)| ActorMetadataEntry {
                            key: property.key(),
                            value,
                        })
                        .collect(),
                };
                self.dispatch(client, spawn);
                ResolvedCounterparty::Synthetic(runtime_id)
            }
        };

        self.registry.insert_session(
            client,
            TradeSession {
                properties: properties.clone(),
                counterparty,
                client_runtime_id,
                opened_at: position,
            },
        );

        let trader_runtime_id = counterparty.runtime_id();
        self.dispatch(
            client,
            UpdateTrade {
                window_id: self.config.window_id,
                display_name: properties.trader_name.clone(),
                is_v2_trading: true,
                is_willing: true,
                trade_tier: properties.trade_tier,
                player_runtime_id: client_runtime_id,
                trader_runtime_id,
                offers,
            },
        );

        tracing::info!(
            client,
            trader = trader_runtime_id,
            trader_name = %properties.trader_name,
            synthetic = counterparty.is_synthetic(),
            tier = properties.trade_tier,
            "trade session opened"
        );
        Ok(trader_runtime_id)
    }

    // ------------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------------

    /// Close the trade for `client` and settle its trade slots.
    ///
    /// No-op returning `None` when no session is open. `send_packet = false`
    /// suppresses the `ContainerClose` (the client already closed the UI or
    /// is gone); counterpart teardown and settlement always run.
    pub fn close_session<W: TradeWorld + ?Sized>(
        &mut self,
        world: &mut W,
        client: ClientId,
        send_packet: bool,
    ) -> Option<Settlement> {
        let session = self.registry.take_session(client)?;

        if send_packet {
            self.dispatch(
                client,
                ContainerClose {
                    window_id: self.config.window_id,
                    server_initiated: true,
                },
            );
        }

        match session.counterparty {
            ResolvedCounterparty::Live(entity) => {
                let engaged_with = world.network_property(entity, NetworkProperty::TradingPlayer);
                if !world.entity_exists(entity) {
                    tracing::warn!(client, trader = entity, "trade counterpart gone before close");
                } else if engaged_with == Some(signed_runtime_id(session.client_runtime_id)) {
                    world.set_network_property(
                        entity,
                        NetworkProperty::TradingPlayer,
                        self.config.idle_trading_player,
                    );
                } else {
                    // Another client opened a trade with the same entity since
                    tracing::debug!(
                        client,
                        trader = entity,
                        ?engaged_with,
                        "trade counterpart engaged elsewhere, leaving it as is"
                    );
                }
            }
            ResolvedCounterparty::Synthetic(runtime_id) => {
                self.dispatch(
                    client,
                    RemoveActor {
                        entity_unique_id: signed_runtime_id(runtime_id),
                    },
                );
            }
        }

        let settlement = match self.registry.lookup_mut(client) {
            Some(inventory) => settlement::settle(world, client, inventory, session.opened_at),
            None => {
                tracing::warn!(client, "open trade session without a trade inventory");
                Settlement::default()
            }
        };

        tracing::info!(
            client,
            trader = session.counterparty.runtime_id(),
            returned = settlement.returned_count(),
            dropped = settlement.dropped_count(),
            "trade session closed"
        );
        Some(settlement)
    }

    /// Close every open session, e.g. on server stop. Returns how many closed.
    pub fn shutdown<W: TradeWorld + ?Sized>(&mut self, world: &mut W) -> usize {
        let clients = self.registry.active_clients();
        for &client in &clients {
            let send_packet = self.transport.is_connected(client);
            self.close_session(world, client, send_packet);
        }
        tracing::info!(closed = clients.len(), "trade sessions shut down");
        clients.len()
    }

    // ------------------------------------------------------------------------
    // Item transfer
    // ------------------------------------------------------------------------

    /// Move `count` items from `from` to `to` while a trade is open.
    ///
    /// Either the whole move happens or nothing changes.
    pub fn transfer_item<W: TradeWorld + ?Sized>(
        &mut self,
        world: &mut W,
        client: ClientId,
        from: SlotRef,
        to: SlotRef,
        count: u32,
    ) -> Result<(), TradeError> {
        if !self.registry.is_registered(client) {
            return Err(TradeError::NotRegistered(client));
        }
        if !self.registry.is_active(client) {
            return Err(TradeError::NoActiveSession(client));
        }

        let mut remainder = self
            .read_slot(world, client, from)?
            .ok_or(TradeError::ItemUnavailable(from))?;
        let moving = remainder
            .split(count)
            .ok_or(TradeError::ItemUnavailable(from))?;
        let target = self.read_slot(world, client, to)?;
        if from == to {
            return Ok(());
        }

        let merged = match target {
            None => moving,
            Some(existing) if existing.can_stack_with(&moving) && existing.room() >= count => {
                ItemStack {
                    count: existing.count + count,
                    ..existing
                }
            }
            Some(_) => return Err(TradeError::SlotOccupied(to)),
        };

        self.write_slot(world, client, from, Some(remainder));
        self.write_slot(world, client, to, Some(merged));

        tracing::debug!(client, ?from, ?to, count, "trade item moved");
        Ok(())
    }

    fn read_slot<W: TradeWorld + ?Sized>(
        &self,
        world: &W,
        client: ClientId,
        slot: SlotRef,
    ) -> Result<Option<ItemStack>, TradeError> {
        match slot {
            SlotRef::Main(index) => {
                let inventory = world
                    .inventory(client)
                    .ok_or(TradeError::UnknownClient(client))?;
                if index >= inventory.size() {
                    return Err(TradeError::InvalidSlot(slot));
                }
                Ok(inventory.get(index).cloned())
            }
            SlotRef::Trade(index) => {
                if index >= TRADE_SLOT_COUNT {
                    return Err(TradeError::InvalidSlot(slot));
                }
                let inventory = self
                    .registry
                    .lookup(client)
                    .ok_or(TradeError::NotRegistered(client))?;
                Ok(inventory.get(index).cloned())
            }
        }
    }

    /// Write a slot already validated by `read_slot`.
    fn write_slot<W: TradeWorld + ?Sized>(
        &mut self,
        world: &mut W,
        client: ClientId,
        slot: SlotRef,
        item: Option<ItemStack>,
    ) {
        match slot {
            SlotRef::Main(index) => {
                if let Some(inventory) = world.inventory_mut(client) {
                    inventory.set(index, item);
                }
            }
            SlotRef::Trade(index) => {
                if let Some(inventory) = self.registry.lookup_mut(client) {
                    inventory.set(index, item);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Send one packet; unreachable clients are logged and skipped.
    fn dispatch(&mut self, client: ClientId, packet: impl Into<ClientboundPacket>) {
        let packet = packet.into();
        let name = packet.name();
        match self.transport.send(client, packet) {
            Ok(()) => tracing::debug!(client, packet = name, "packet dispatched"),
            Err(e) => tracing::warn!(client, packet = name, error = %e, "packet dispatch skipped"),
        }
    }
}

fn offset(position: Position, by: [f64; 3]) -> Position {
    [position[0] + by[0], position[1] + by[1], position[2] + by[2]]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use barter_world::{EntityKind, MAX_RUNTIME_ID, PlayerInventory, RuntimeIdAllocator, World};

    const CLIENT: ClientId = 1;
    const OTHER: ClientId = 2;
    const POS: Position = [8.0, 70.0, -2.0];
    const EMERALD: u32 = 388;
    const WHEAT: u32 = 296;

    type Manager = TradeSessionManager<RecordingTransport>;

    fn setup() -> (World, Manager) {
        let mut world = World::new();
        world
            .add_player(CLIENT, "alice", POS, PlayerInventory::new(9))
            .unwrap();
        world
            .add_player(OTHER, "bob", [0.0, 64.0, 0.0], PlayerInventory::new(9))
            .unwrap();
        let mut manager = Manager::new(TradeConfig::default(), RecordingTransport::new());
        manager.register(&mut world, CLIENT);
        manager.register(&mut world, OTHER);
        (world, manager)
    }

    fn catalog() -> MerchantRecipeList {
        [MerchantRecipe::new(
            ItemStack::new(WHEAT, 20),
            ItemStack::new(EMERALD, 1),
        )]
        .into_iter()
        .collect()
    }

    fn merchant() -> TraderProperties {
        TraderProperties::synthetic("Merchant").with_tier(2, 65, 4)
    }

    fn client_runtime_id(world: &World, client: ClientId) -> EntityId {
        world.player(client).unwrap().runtime_id
    }

    fn give(world: &mut World, client: ClientId, slot: usize, item: ItemStack) {
        world
            .player_mut(client)
            .unwrap()
            .inventory
            .set(slot, Some(item));
    }

    /// Total of `item_type` across trade slots, main inventory and the ground.
    fn total_items(world: &World, manager: &Manager, client: ClientId, item_type: u32) -> u32 {
        let trade = manager
            .lookup(client)
            .map(|inv| {
                (0..TRADE_SLOT_COUNT)
                    .filter_map(|s| inv.get(s))
                    .filter(|s| s.item_type == item_type)
                    .map(|s| s.count)
                    .sum::<u32>()
            })
            .unwrap_or(0);
        let main = world
            .player(client)
            .map(|p| p.inventory.count_of(item_type))
            .unwrap_or(0);
        trade + main + world.dropped_count_of(item_type)
    }

    /// Synthetic merchant: spawn, offer, trade an item, close.
    #[test]
    fn test_synthetic_merchant_full_lifecycle() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 20));

        let trader = manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();

        let sent = manager.transport().sent_to(CLIENT);
        assert_eq!(sent.len(), 2);
        let ClientboundPacket::AddActor(spawn) = sent[0] else {
            panic!("expected AddActor first, got {}", sent[0].name());
        };
        assert_eq!(spawn.actor_type, ACTOR_TYPE_NPC);
        assert_eq!(spawn.runtime_id, trader);
        assert_eq!(spawn.position, vec![8.0, 68.0, -2.0]);
        assert_eq!(spawn.metadata_value(NetworkProperty::TradeTier.key()), Some(2));
        assert_eq!(spawn.metadata_value(NetworkProperty::TradeXp.key()), Some(65));
        assert_eq!(spawn.metadata_value(NetworkProperty::MaxTradeTier.key()), Some(4));
        assert_eq!(
            spawn.metadata_value(NetworkProperty::TradingPlayer.key()),
            Some(client_runtime_id(&world, CLIENT) as i64)
        );

        let ClientboundPacket::UpdateTrade(offer) = sent[1] else {
            panic!("expected UpdateTrade second, got {}", sent[1].name());
        };
        assert_eq!(offer.window_id, WINDOW_TYPE_TRADING);
        assert_eq!(offer.display_name, "Merchant");
        assert!(offer.is_v2_trading);
        assert!(offer.is_willing);
        assert_eq!(offer.trade_tier, 2);
        assert_eq!(offer.player_runtime_id, client_runtime_id(&world, CLIENT));
        assert_eq!(offer.trader_runtime_id, trader);

        let payload = offer.decode_offers().unwrap();
        assert_eq!(payload.get_list("Recipes").map(|l| l.len()), Some(1));
        let tiers: Vec<_> = payload
            .get_list("TierExpRequirements")
            .unwrap()
            .compounds()
            .enumerate()
            .map(|(i, c)| c.get_int(&i.to_string()).unwrap())
            .collect();
        assert_eq!(tiers, TIER_EXP_REQUIREMENTS.to_vec());

        // Put the wheat up for trade, then close from the server side
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(OFFER_SLOT), 20)
            .unwrap();
        assert_eq!(world.player(CLIENT).unwrap().inventory.count_of(WHEAT), 0);

        manager.transport_mut().clear();
        let settlement = manager.close_session(&mut world, CLIENT, true).unwrap();

        let sent = manager.transport().sent_to(CLIENT);
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            sent[0],
            ClientboundPacket::ContainerClose(c) if c.window_id == WINDOW_TYPE_TRADING
        ));
        assert!(matches!(
            sent[1],
            ClientboundPacket::RemoveActor(r) if r.entity_unique_id == trader as i64
        ));

        assert_eq!(settlement.returned_count(), 20);
        assert_eq!(world.player(CLIENT).unwrap().inventory.count_of(WHEAT), 20);
        assert!(manager.lookup(CLIENT).unwrap().is_empty());
        assert!(!manager.is_active(CLIENT));
    }

    /// Re-opening closes the previous session exactly once.
    #[test]
    fn test_open_over_open_session_closes_once() {
        let (mut world, mut manager) = setup();

        let first = manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        let second = manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(
            manager.transport().names_sent_to(CLIENT),
            vec![
                "AddActor",
                "UpdateTrade",
                "ContainerClose",
                "RemoveActor",
                "AddActor",
                "UpdateTrade",
            ]
        );
        let removed: Vec<_> = manager
            .transport()
            .sent_to(CLIENT)
            .into_iter()
            .filter_map(|p| match p {
                ClientboundPacket::RemoveActor(r) => Some(r.entity_unique_id),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec![first as i64]);
        assert_eq!(manager.registry().active_count(), 1);
        assert_eq!(
            manager.session(CLIENT).map(|s| s.counterparty),
            Some(ResolvedCounterparty::Synthetic(second))
        );
    }

    #[test]
    fn test_live_counterparty_properties_track_session() {
        let (mut world, mut manager) = setup();
        let villager = world
            .spawn_entity(EntityKind::Villager, [3.0, 64.0, 3.0])
            .unwrap();
        let props = TraderProperties::live("Farmer", villager).with_tier(1, 12, 3);

        let trader = manager
            .open_session(&mut world, CLIENT, &catalog(), &props)
            .unwrap();

        assert_eq!(trader, villager);
        assert_eq!(manager.transport().names_sent_to(CLIENT), vec!["UpdateTrade"]);
        let entity = world.entity(villager).unwrap();
        assert_eq!(entity.property(NetworkProperty::TradeTier), Some(1));
        assert_eq!(entity.property(NetworkProperty::TradeXp), Some(12));
        assert_eq!(entity.property(NetworkProperty::MaxTradeTier), Some(3));
        assert_eq!(
            entity.property(NetworkProperty::TradingPlayer),
            Some(client_runtime_id(&world, CLIENT) as i64)
        );

        manager.close_session(&mut world, CLIENT, true);

        assert_eq!(
            world
                .entity(villager)
                .unwrap()
                .property(NetworkProperty::TradingPlayer),
            Some(IDLE_TRADING_PLAYER)
        );
        // Live entities are never spawned or removed by the trade
        assert_eq!(
            manager.transport().names_sent_to(CLIENT),
            vec!["UpdateTrade", "ContainerClose"]
        );
        assert!(world.entity(villager).is_some());
    }

    #[test]
    fn test_live_counterparty_missing_is_error() {
        let (mut world, mut manager) = setup();
        let props = TraderProperties::live("Ghost", 999);

        let result = manager.open_session(&mut world, CLIENT, &catalog(), &props);

        assert_eq!(result, Err(TradeError::CounterpartyNotFound(999)));
        assert!(!manager.is_active(CLIENT));
        assert!(manager.transport().sent().is_empty());
    }

    #[test]
    fn test_live_counterparty_despawned_mid_trade_still_settles() {
        let (mut world, mut manager) = setup();
        let villager = world.spawn_entity(EntityKind::Villager, [0.0; 3]).unwrap();
        manager
            .open_session(
                &mut world,
                CLIENT,
                &catalog(),
                &TraderProperties::live("Farmer", villager),
            )
            .unwrap();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 4));
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(OFFER_SLOT), 4)
            .unwrap();
        world.despawn_entity(villager);

        let settlement = manager.close_session(&mut world, CLIENT, true).unwrap();

        assert_eq!(settlement.returned_count(), 4);
        assert!(!manager.is_active(CLIENT));
    }

    #[test]
    fn test_shared_live_counterparty_stays_engaged_with_latest_client() {
        let (mut world, mut manager) = setup();
        let villager = world.spawn_entity(EntityKind::Villager, [0.0; 3]).unwrap();
        let props = TraderProperties::live("Farmer", villager);

        manager
            .open_session(&mut world, CLIENT, &catalog(), &props)
            .unwrap();
        manager
            .open_session(&mut world, OTHER, &catalog(), &props)
            .unwrap();
        manager.close_session(&mut world, CLIENT, true);

        assert!(manager.is_active(OTHER));
        assert_eq!(
            world
                .entity(villager)
                .unwrap()
                .property(NetworkProperty::TradingPlayer),
            Some(client_runtime_id(&world, OTHER) as i64)
        );

        manager.close_session(&mut world, OTHER, true);
        assert_eq!(
            world
                .entity(villager)
                .unwrap()
                .property(NetworkProperty::TradingPlayer),
            Some(IDLE_TRADING_PLAYER)
        );
    }

    #[test]
    fn test_open_for_unreachable_client_records_session() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 8));
        manager.transport_mut().disconnect(CLIENT);

        let trader = manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();

        assert!(manager.transport().sent().is_empty());
        assert_eq!(
            manager.session(CLIENT).map(|s| s.counterparty),
            Some(ResolvedCounterparty::Synthetic(trader))
        );

        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(OFFER_SLOT), 8)
            .unwrap();
        let settlement = manager.close_session(&mut world, CLIENT, true).unwrap();

        assert!(manager.transport().sent().is_empty());
        assert_eq!(settlement.returned_count(), 8);
        assert_eq!(world.player(CLIENT).unwrap().inventory.count_of(WHEAT), 8);
        assert!(!manager.is_active(CLIENT));
    }

    #[test]
    fn test_close_without_session_is_noop() {
        let (mut world, mut manager) = setup();

        assert!(manager.close_session(&mut world, CLIENT, true).is_none());
        assert!(manager.transport().sent().is_empty());
    }

    #[test]
    fn test_open_requires_registration() {
        let (mut world, mut manager) = setup();
        world
            .add_player(3, "carol", POS, PlayerInventory::new(9))
            .unwrap();

        let result = manager.open_session(&mut world, 3, &catalog(), &merchant());
        assert_eq!(result, Err(TradeError::NotRegistered(3)));
    }

    #[test]
    fn test_open_for_client_missing_from_world() {
        let (mut world, mut manager) = setup();
        manager.register(&mut world, 5);

        let result = manager.open_session(&mut world, 5, &catalog(), &merchant());
        assert_eq!(result, Err(TradeError::UnknownClient(5)));
        assert!(!manager.is_active(5));
    }

    #[test]
    fn test_allocation_failure_aborts_open() {
        let ids = Arc::new(RuntimeIdAllocator::starting_at(MAX_RUNTIME_ID - 1));
        let mut world = World::with_allocator(ids);
        world
            .add_player(CLIENT, "alice", POS, PlayerInventory::new(9))
            .unwrap();
        let mut manager = Manager::new(TradeConfig::default(), RecordingTransport::new());
        manager.register(&mut world, CLIENT);

        let result = manager.open_session(&mut world, CLIENT, &catalog(), &merchant());

        assert!(matches!(result, Err(TradeError::Allocation(_))));
        assert!(!manager.is_active(CLIENT));
        assert!(manager.transport().sent().is_empty());
    }

    #[test]
    fn test_session_holds_snapshot_of_properties() {
        let (mut world, mut manager) = setup();
        let mut props = merchant();
        manager
            .open_session(&mut world, CLIENT, &catalog(), &props)
            .unwrap();

        props.trade_tier = 4;
        props.trader_name = "Renamed".to_string();

        let session = manager.session(CLIENT).unwrap();
        assert_eq!(session.properties.trade_tier, 2);
        assert_eq!(session.properties.trader_name, "Merchant");
    }

    #[test]
    fn test_settlement_conserves_items_when_inventory_full() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 40));
        give(&mut world, CLIENT, 1, ItemStack::new(EMERALD, 10));
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 40)
            .unwrap();
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(1), SlotRef::Trade(1), 10)
            .unwrap();
        // Fill every main slot with something unrelated
        for slot in 0..9 {
            give(&mut world, CLIENT, slot, ItemStack::new(1, 64));
        }
        let wheat_before = total_items(&world, &manager, CLIENT, WHEAT);
        let emerald_before = total_items(&world, &manager, CLIENT, EMERALD);

        let settlement = manager.close_session(&mut world, CLIENT, true).unwrap();

        assert_eq!(total_items(&world, &manager, CLIENT, WHEAT), wheat_before);
        assert_eq!(total_items(&world, &manager, CLIENT, EMERALD), emerald_before);
        assert_eq!(settlement.dropped_count(), 50);
        assert!(world.dropped_items().iter().all(|d| d.position == POS));
        assert!(manager.lookup(CLIENT).unwrap().is_empty());
    }

    #[test]
    fn test_unregister_disconnected_client_settles_silently() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 3));
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(1), 3)
            .unwrap();
        manager.transport_mut().clear();
        manager.transport_mut().disconnect(CLIENT);

        let settlement = manager.unregister(&mut world, CLIENT).unwrap();

        assert!(manager.transport().sent().is_empty());
        assert_eq!(settlement.returned_count(), 3);
        assert_eq!(world.player(CLIENT).unwrap().inventory.count_of(WHEAT), 3);
        assert!(manager.lookup(CLIENT).is_none());
        assert!(!manager.is_active(CLIENT));
    }

    #[test]
    fn test_unregister_connected_client_sends_close() {
        let (mut world, mut manager) = setup();
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager.transport_mut().clear();

        manager.unregister(&mut world, CLIENT);

        assert_eq!(
            manager.transport().names_sent_to(CLIENT),
            vec!["ContainerClose", "RemoveActor"]
        );
        assert!(manager.lookup(CLIENT).is_none());
    }

    #[test]
    fn test_unregister_after_world_despawn_drops_at_open_position() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 2));
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 2)
            .unwrap();
        manager.transport_mut().disconnect(CLIENT);
        world.remove_player(CLIENT);

        let settlement = manager.unregister(&mut world, CLIENT).unwrap();

        assert_eq!(settlement.dropped_count(), 2);
        assert_eq!(world.dropped_items()[0].position, POS);
    }

    #[test]
    fn test_reregister_settles_open_session_first() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 6));
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 6)
            .unwrap();

        manager.register(&mut world, CLIENT);

        assert!(!manager.is_active(CLIENT));
        assert_eq!(world.player(CLIENT).unwrap().inventory.count_of(WHEAT), 6);
    }

    #[test]
    fn test_sessions_are_per_client() {
        let (mut world, mut manager) = setup();
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager
            .open_session(&mut world, OTHER, &catalog(), &merchant())
            .unwrap();
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();

        assert_eq!(manager.registry().active_clients(), vec![CLIENT, OTHER]);
        // Spawns only ever go to the client that opened the trade
        assert_eq!(
            manager.transport().names_sent_to(OTHER),
            vec!["AddActor", "UpdateTrade"]
        );

        manager.close_session(&mut world, OTHER, true);
        assert!(manager.is_active(CLIENT));
        assert!(!manager.is_trading(OTHER));
    }

    #[test]
    fn test_shutdown_closes_every_session() {
        let (mut world, mut manager) = setup();
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager
            .open_session(&mut world, OTHER, &catalog(), &merchant())
            .unwrap();
        manager.transport_mut().clear();
        manager.transport_mut().disconnect(OTHER);

        assert_eq!(manager.shutdown(&mut world), 2);

        assert_eq!(manager.registry().active_count(), 0);
        assert_eq!(
            manager.transport().names_sent_to(CLIENT),
            vec!["ContainerClose", "RemoveActor"]
        );
        assert!(manager.transport().sent_to(OTHER).is_empty());
        // Capability survives shutdown of sessions
        assert!(manager.lookup(CLIENT).is_some());
    }

    #[test]
    fn test_close_without_packet_still_removes_synthetic_trader() {
        let (mut world, mut manager) = setup();
        let trader = manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager.transport_mut().clear();

        manager.close_session(&mut world, CLIENT, false);

        let sent = manager.transport().sent_to(CLIENT);
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            sent[0],
            ClientboundPacket::RemoveActor(r) if r.entity_unique_id == trader as i64
        ));
    }

    #[test]
    fn test_custom_config_window_and_offset() {
        let mut world = World::new();
        world
            .add_player(CLIENT, "alice", POS, PlayerInventory::new(9))
            .unwrap();
        let config = TradeConfig {
            window_id: 99,
            synthetic_spawn_offset: [1.0, 0.0, 0.0],
            ..Default::default()
        };
        let mut manager = Manager::new(config, RecordingTransport::new());
        manager.register(&mut world, CLIENT);

        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();

        let sent = manager.transport().sent_to(CLIENT);
        assert!(matches!(sent[0], ClientboundPacket::AddActor(a) if a.position == vec![9.0, 70.0, -2.0]));
        assert!(matches!(sent[1], ClientboundPacket::UpdateTrade(u) if u.window_id == 99));
    }

    // ========================================================================
    // Item transfer
    // ========================================================================

    #[test]
    fn test_transfer_requires_open_session() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 1));

        let result =
            manager.transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 1);
        assert_eq!(result, Err(TradeError::NoActiveSession(CLIENT)));

        let result = manager.transfer_item(&mut world, 42, SlotRef::Main(0), SlotRef::Trade(0), 1);
        assert_eq!(result, Err(TradeError::NotRegistered(42)));
    }

    #[test]
    fn test_transfer_partial_stack_and_back() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 10));
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();

        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 4)
            .unwrap();
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 2)
            .unwrap();
        assert_eq!(manager.lookup(CLIENT).unwrap().get(0).map(|s| s.count), Some(6));
        assert_eq!(world.player(CLIENT).unwrap().inventory.get(0).map(|s| s.count), Some(4));

        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Trade(0), SlotRef::Main(3), 6)
            .unwrap();
        assert!(manager.lookup(CLIENT).unwrap().is_empty());
        assert_eq!(world.player(CLIENT).unwrap().inventory.count_of(WHEAT), 10);
    }

    #[test]
    fn test_transfer_rejections_leave_state_untouched() {
        let (mut world, mut manager) = setup();
        give(&mut world, CLIENT, 0, ItemStack::new(WHEAT, 5));
        give(&mut world, CLIENT, 1, ItemStack::new(EMERALD, 1));
        manager
            .open_session(&mut world, CLIENT, &catalog(), &merchant())
            .unwrap();
        manager
            .transfer_item(&mut world, CLIENT, SlotRef::Main(1), SlotRef::Trade(1), 1)
            .unwrap();

        assert_eq!(
            manager.transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(2), 1),
            Err(TradeError::InvalidSlot(SlotRef::Trade(2)))
        );
        assert_eq!(
            manager.transfer_item(&mut world, CLIENT, SlotRef::Main(50), SlotRef::Trade(0), 1),
            Err(TradeError::InvalidSlot(SlotRef::Main(50)))
        );
        assert_eq!(
            manager.transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 6),
            Err(TradeError::ItemUnavailable(SlotRef::Main(0)))
        );
        assert_eq!(
            manager.transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(0), 0),
            Err(TradeError::ItemUnavailable(SlotRef::Main(0)))
        );
        assert_eq!(
            manager.transfer_item(&mut world, CLIENT, SlotRef::Main(0), SlotRef::Trade(1), 1),
            Err(TradeError::SlotOccupied(SlotRef::Trade(1)))
        );

        assert_eq!(world.player(CLIENT).unwrap().inventory.count_of(WHEAT), 5);
        assert_eq!(manager.lookup(CLIENT).unwrap().item_count(), 1);
    }
}
