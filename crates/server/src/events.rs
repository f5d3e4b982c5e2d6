//! Host events that drive trade sessions.
//!
//! The host's event loop translates its own join/quit/close notifications into
//! `TradeEvent` and feeds them to [`TradeSessionManager::handle_event`].

use barter_wire::ContainerClose;
use barter_world::ClientId;

use crate::TradeSessionManager;
use crate::error::TradeError;
use crate::host::{TradeWorld, Transport};
use crate::inventory::SlotRef;

/// Trade-relevant events raised by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeEvent {
    /// Client finished joining; it becomes trade-capable.
    ClientJoined { client: ClientId },
    /// Client is leaving; any open trade is settled and its entries dropped.
    ClientQuit { client: ClientId },
    /// Client closed a container window on its side.
    ContainerCloseRequested { client: ClientId, window_id: u32 },
    /// Client moved items between its main inventory and the trade slots.
    ItemTransfer {
        client: ClientId,
        from: SlotRef,
        to: SlotRef,
        count: u32,
    },
}

impl TradeEvent {
    /// Event for a close request received from `client`.
    pub fn close_requested(client: ClientId, packet: &ContainerClose) -> Self {
        Self::ContainerCloseRequested {
            client,
            window_id: packet.window_id,
        }
    }
}

impl<T: Transport> TradeSessionManager<T> {
    /// Apply one host event.
    ///
    /// Only item transfers can fail; lifecycle events always succeed.
    pub fn handle_event<W: TradeWorld + ?Sized>(
        &mut self,
        world: &mut W,
        event: TradeEvent,
    ) -> Result<(), TradeError> {
        match event {
            TradeEvent::ClientJoined { client } => {
                self.register(world, client);
            }
            TradeEvent::ClientQuit { client } => {
                self.unregister(world, client);
            }
            TradeEvent::ContainerCloseRequested { client, window_id } => {
                if window_id != self.config().window_id {
                    tracing::trace!(client, window_id, "ignoring close of non-trade window");
                    return Ok(());
                }
                // The client already closed the UI
                self.close_session(world, client, false);
            }
            TradeEvent::ItemTransfer {
                client,
                from,
                to,
                count,
            } => {
                self.transfer_item(world, client, from, to, count)?;
            }
        }
        Ok(())
    }
}
