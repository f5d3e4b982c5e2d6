//! Barter World Model
//!
//! This crate is the engine-side state the trade core talks to. It owns:
//! - Connected players (network runtime id, position, main inventory)
//! - Non-player entities and their networked integer properties
//! - Items dropped into the world
//! - The process-wide entity runtime id allocator
//!
//! The trade core never reaches into these types directly beyond what the
//! server crate's `TradeWorld` seam exposes.

#![deny(unsafe_code)]

pub mod inventory;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use inventory::{ItemStack, ItemTypeId, PlayerInventory};

// ============================================================================
// Type Aliases
// ============================================================================

/// Stable per-connection client identifier. Never reused while connected.
pub type ClientId = u64;

/// Network runtime identifier of an entity (players included).
pub type EntityId = u64;

/// World position [x, y, z]; y is up.
pub type Position = [f64; 3];

// ============================================================================
// Runtime Id Allocation
// ============================================================================

/// Errors from the runtime id allocator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("entity runtime id space exhausted")]
    Exhausted,
}

/// Largest runtime id the allocator will hand out.
///
/// Runtime ids travel as signed 64-bit values in actor metadata and remove
/// packets, so the id space stops below `i64::MAX`.
pub const MAX_RUNTIME_ID: EntityId = i64::MAX as EntityId;

/// Signed form of a runtime id as carried on the wire.
///
/// Exact for every id the allocator produces; larger values saturate.
pub fn signed_runtime_id(id: EntityId) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

/// Process-wide monotonic runtime id allocator.
///
/// Safe to share between worlds and threads; every call yields a value no
/// other call has seen. Id 0 is never handed out.
#[derive(Debug)]
pub struct RuntimeIdAllocator {
    next: AtomicU64,
}

impl RuntimeIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first id is `first` (clamped to `1..=MAX_RUNTIME_ID`).
    pub fn starting_at(first: EntityId) -> Self {
        Self {
            next: AtomicU64::new(first.clamp(1, MAX_RUNTIME_ID)),
        }
    }

    /// Allocate a fresh runtime id.
    pub fn next_id(&self) -> Result<EntityId, AllocError> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                (id < MAX_RUNTIME_ID).then_some(id + 1)
            })
            .map_err(|_| AllocError::Exhausted)
    }
}

impl Default for RuntimeIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Networked Properties
// ============================================================================

/// Integer entity properties that are replicated to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetworkProperty {
    TradeTier,
    TradeXp,
    MaxTradeTier,
    /// Runtime id of the player currently trading with this entity, or -1.
    TradingPlayer,
}

impl NetworkProperty {
    /// Protocol metadata key for this property.
    pub fn key(self) -> u32 {
        match self {
            Self::TradingPlayer => 68,
            Self::TradeTier => 102,
            Self::MaxTradeTier => 103,
            Self::TradeXp => 104,
        }
    }
}

/// Kind of a non-player entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Npc,
    Villager,
    Other(u32),
}

/// A non-player entity living in the world.
#[derive(Debug, Clone)]
pub struct Entity {
    pub runtime_id: EntityId,
    pub kind: EntityKind,
    pub position: Position,
    properties: BTreeMap<NetworkProperty, i64>,
}

impl Entity {
    pub fn property(&self, property: NetworkProperty) -> Option<i64> {
        self.properties.get(&property).copied()
    }

    pub fn set_property(&mut self, property: NetworkProperty, value: i64) {
        self.properties.insert(property, value);
    }
}

// ============================================================================
// Players and Drops
// ============================================================================

/// A connected player.
#[derive(Debug, Clone)]
pub struct Player {
    pub client_id: ClientId,
    pub name: String,
    pub runtime_id: EntityId,
    pub position: Position,
    pub inventory: PlayerInventory,
}

/// An item lying in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedItem {
    pub item: ItemStack,
    pub position: Position,
}

// ============================================================================
// World
// ============================================================================

/// In-memory world state container.
#[derive(Debug)]
pub struct World {
    ids: Arc<RuntimeIdAllocator>,
    players: HashMap<ClientId, Player>,
    /// Kept ordered by runtime id for stable iteration
    entities: BTreeMap<EntityId, Entity>,
    dropped_items: Vec<DroppedItem>,
}

impl World {
    /// Create an empty world with its own allocator.
    pub fn new() -> Self {
        Self::with_allocator(Arc::new(RuntimeIdAllocator::new()))
    }

    /// Create an empty world sharing `ids` with other worlds.
    pub fn with_allocator(ids: Arc<RuntimeIdAllocator>) -> Self {
        Self {
            ids,
            players: HashMap::new(),
            entities: BTreeMap::new(),
            dropped_items: Vec::new(),
        }
    }

    /// Allocate a fresh runtime id without spawning anything.
    pub fn next_runtime_id(&self) -> Result<EntityId, AllocError> {
        self.ids.next_id()
    }

    /// Add a connected player and return its runtime id.
    pub fn add_player(
        &mut self,
        client_id: ClientId,
        name: impl Into<String>,
        position: Position,
        inventory: PlayerInventory,
    ) -> Result<EntityId, AllocError> {
        let runtime_id = self.ids.next_id()?;
        let player = Player {
            client_id,
            name: name.into(),
            runtime_id,
            position,
            inventory,
        };
        self.players.insert(client_id, player);
        tracing::debug!(client = client_id, runtime_id, "player added to world");
        Ok(runtime_id)
    }

    /// Remove a player (disconnect). Returns the removed player.
    pub fn remove_player(&mut self, client_id: ClientId) -> Option<Player> {
        self.players.remove(&client_id)
    }

    pub fn player(&self, client_id: ClientId) -> Option<&Player> {
        self.players.get(&client_id)
    }

    pub fn player_mut(&mut self, client_id: ClientId) -> Option<&mut Player> {
        self.players.get_mut(&client_id)
    }

    /// Spawn a non-player entity and return its runtime id.
    pub fn spawn_entity(
        &mut self,
        kind: EntityKind,
        position: Position,
    ) -> Result<EntityId, AllocError> {
        let runtime_id = self.ids.next_id()?;
        self.entities.insert(
            runtime_id,
            Entity {
                runtime_id,
                kind,
                position,
                properties: BTreeMap::new(),
            },
        );
        Ok(runtime_id)
    }

    /// Remove an entity from the world.
    pub fn despawn_entity(&mut self, runtime_id: EntityId) -> Option<Entity> {
        self.entities.remove(&runtime_id)
    }

    pub fn entity(&self, runtime_id: EntityId) -> Option<&Entity> {
        self.entities.get(&runtime_id)
    }

    pub fn entity_mut(&mut self, runtime_id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&runtime_id)
    }

    /// Drop an item into the world at `position`. Empty stacks are discarded.
    pub fn drop_item(&mut self, item: ItemStack, position: Position) {
        if item.is_empty() {
            return;
        }
        self.dropped_items.push(DroppedItem { item, position });
    }

    /// Items currently lying in the world, in drop order.
    pub fn dropped_items(&self) -> &[DroppedItem] {
        &self.dropped_items
    }

    /// Total number of dropped items of `item_type`.
    pub fn dropped_count_of(&self, item_type: ItemTypeId) -> u32 {
        self.dropped_items
            .iter()
            .filter(|d| d.item.item_type == item_type)
            .map(|d| d.item.count)
            .sum()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
