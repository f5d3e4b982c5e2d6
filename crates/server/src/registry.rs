//! Session registry.
//!
//! Two keyed stores, both keyed by `ClientId`:
//! - trade capability: client → `TradeInventory`
//! - active sessions: client → `TradeSession`
//!
//! The registry is a plain store. Lifecycle rules (close before evict,
//! close before open) are enforced by `TradeSessionManager`, which owns it.

use std::collections::HashMap;

use barter_world::{ClientId, EntityId, Position};

use crate::inventory::TradeInventory;
use crate::properties::{ResolvedCounterparty, TraderProperties};

/// State of one open trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSession {
    /// Value copy taken at open; later edits to the caller's copy do not leak in.
    pub properties: TraderProperties,
    pub counterparty: ResolvedCounterparty,
    /// Runtime id of the trading client's own entity.
    pub client_runtime_id: EntityId,
    /// Client position at open. Used for world drops if the client is gone.
    pub opened_at: Position,
}

/// Keyed storage for trade inventories and active sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inventories: HashMap<ClientId, TradeInventory>,
    sessions: HashMap<ClientId, TradeSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh empty trade inventory for `client`, replacing any old one.
    pub fn register(&mut self, client: ClientId) -> Option<TradeInventory> {
        self.inventories.insert(client, TradeInventory::new(client))
    }

    /// Drop both entries for `client` without settling anything.
    pub fn remove(&mut self, client: ClientId) -> (Option<TradeInventory>, Option<TradeSession>) {
        (self.inventories.remove(&client), self.sessions.remove(&client))
    }

    pub fn lookup(&self, client: ClientId) -> Option<&TradeInventory> {
        self.inventories.get(&client)
    }

    pub fn lookup_mut(&mut self, client: ClientId) -> Option<&mut TradeInventory> {
        self.inventories.get_mut(&client)
    }

    pub fn is_registered(&self, client: ClientId) -> bool {
        self.inventories.contains_key(&client)
    }

    pub fn is_active(&self, client: ClientId) -> bool {
        self.sessions.contains_key(&client)
    }

    pub fn session(&self, client: ClientId) -> Option<&TradeSession> {
        self.sessions.get(&client)
    }

    /// Record the active session for `client`, returning any overwritten one.
    pub fn insert_session(&mut self, client: ClientId, session: TradeSession) -> Option<TradeSession> {
        self.sessions.insert(client, session)
    }

    pub fn take_session(&mut self, client: ClientId) -> Option<TradeSession> {
        self.sessions.remove(&client)
    }

    /// Clients with an open session, sorted for deterministic iteration.
    pub fn active_clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<_> = self.sessions.keys().copied().collect();
        clients.sort_unstable();
        clients
    }

    pub fn registered_count(&self) -> usize {
        self.inventories.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
