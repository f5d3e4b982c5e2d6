//! Barter Wire Protocol Types
//!
//! This crate defines the Protobuf message types exchanged between the game
//! client and the trade server, plus the tag tree used for opaque structured
//! payloads (merchant offers).
//!
//! # Message Categories
//!
//! - **Clientbound**: `UpdateTrade`, `AddActor`, `RemoveActor`, `ContainerClose`,
//!   framed in a `ClientboundFrame` for the transport
//! - **Serverbound**: `ContainerClose` (client-initiated close request)
//!
//! Delivery is ordered per client. `AddActor` for a trader must reach the
//! client before the `UpdateTrade` that references it.

#![deny(unsafe_code)]

pub mod tag;

use prost::Message;

pub use barter_world::EntityId;
pub use tag::{CompoundTag, ListTag, NamedTag, Tag};

// ============================================================================
// Protocol Constants
// ============================================================================

/// Window type id of the trading UI. Also used as its window id.
pub const WINDOW_TYPE_TRADING: u32 = 15;

/// Legacy actor type id for NPCs.
pub const ACTOR_TYPE_NPC: u32 = 51;

// ============================================================================
// Clientbound Messages
// ============================================================================

/// Opens (or refreshes) the trading UI on the client.
#[derive(Clone, PartialEq, Message)]
pub struct UpdateTrade {
    #[prost(uint32, tag = "1")]
    pub window_id: u32,

    /// Name shown in the trade window header.
    #[prost(string, tag = "2")]
    pub display_name: String,

    /// Selects the v2 (tiered) trading UI.
    #[prost(bool, tag = "3")]
    pub is_v2_trading: bool,

    #[prost(bool, tag = "4")]
    pub is_willing: bool,

    #[prost(int32, tag = "5")]
    pub trade_tier: i32,

    /// Runtime id of the trading player.
    #[prost(uint64, tag = "6")]
    pub player_runtime_id: EntityId,

    /// Runtime id of the counterpart the UI is attached to.
    #[prost(uint64, tag = "7")]
    pub trader_runtime_id: EntityId,

    /// Encoded `CompoundTag` carrying recipes and tier thresholds.
    #[prost(bytes = "vec", tag = "8")]
    pub offers: Vec<u8>,
}

impl UpdateTrade {
    /// Decode the offers payload.
    pub fn decode_offers(&self) -> Result<CompoundTag, prost::DecodeError> {
        CompoundTag::decode(self.offers.as_slice())
    }
}

/// One integer metadata entry on a spawned actor.
#[derive(Clone, PartialEq, Message)]
pub struct ActorMetadataEntry {
    #[prost(uint32, tag = "1")]
    pub key: u32,

    #[prost(int64, tag = "2")]
    pub value: i64,
}

/// Spawns an actor on one client.
#[derive(Clone, PartialEq, Message)]
pub struct AddActor {
    #[prost(uint32, tag = "1")]
    pub actor_type: u32,

    #[prost(uint64, tag = "2")]
    pub runtime_id: EntityId,

    /// Position [x, y, z].
    #[prost(double, repeated, tag = "3")]
    pub position: Vec<f64>,

    #[prost(message, repeated, tag = "4")]
    pub metadata: Vec<ActorMetadataEntry>,
}

impl AddActor {
    /// Value of metadata entry `key`, if present.
    pub fn metadata_value(&self, key: u32) -> Option<i64> {
        self.metadata.iter().find(|m| m.key == key).map(|m| m.value)
    }
}

/// Removes an actor from one client.
#[derive(Clone, PartialEq, Message)]
pub struct RemoveActor {
    #[prost(int64, tag = "1")]
    pub entity_unique_id: i64,
}

/// Closes a container window. Sent by the server, or by the client as a request.
#[derive(Clone, PartialEq, Message)]
pub struct ContainerClose {
    #[prost(uint32, tag = "1")]
    pub window_id: u32,

    #[prost(bool, tag = "2")]
    pub server_initiated: bool,
}

// ============================================================================
// Framing
// ============================================================================

/// Any clientbound packet.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ClientboundPacket {
    #[prost(message, tag = "1")]
    UpdateTrade(UpdateTrade),

    #[prost(message, tag = "2")]
    AddActor(AddActor),

    #[prost(message, tag = "3")]
    RemoveActor(RemoveActor),

    #[prost(message, tag = "4")]
    ContainerClose(ContainerClose),
}

impl ClientboundPacket {
    /// Short packet name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateTrade(_) => "UpdateTrade",
            Self::AddActor(_) => "AddActor",
            Self::RemoveActor(_) => "RemoveActor",
            Self::ContainerClose(_) => "ContainerClose",
        }
    }

    /// Encode wrapped in a `ClientboundFrame`.
    pub fn encode_frame(&self) -> Vec<u8> {
        ClientboundFrame::from(self.clone()).encode_to_vec()
    }
}

/// Envelope carrying exactly one clientbound packet.
#[derive(Clone, PartialEq, Message)]
pub struct ClientboundFrame {
    #[prost(oneof = "ClientboundPacket", tags = "1, 2, 3, 4")]
    pub packet: Option<ClientboundPacket>,
}

impl From<ClientboundPacket> for ClientboundFrame {
    fn from(packet: ClientboundPacket) -> Self {
        Self {
            packet: Some(packet),
        }
    }
}

impl From<UpdateTrade> for ClientboundPacket {
    fn from(pk: UpdateTrade) -> Self {
        Self::UpdateTrade(pk)
    }
}

impl From<AddActor> for ClientboundPacket {
    fn from(pk: AddActor) -> Self {
        Self::AddActor(pk)
    }
}

impl From<RemoveActor> for ClientboundPacket {
    fn from(pk: RemoveActor) -> Self {
        Self::RemoveActor(pk)
    }
}

impl From<ContainerClose> for ClientboundPacket {
    fn from(pk: ContainerClose) -> Self {
        Self::ContainerClose(pk)
    }
}

// ============================================================================
// Tests
// ============================================================================
