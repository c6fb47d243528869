//! Core type definitions for barite.
//!
//! This crate defines the fundamental, store-agnostic types shared by every
//! other crate in the workspace:
//! - Item kinds (the five configurable entity kinds)
//! - Message-class bitmask for channel filtering
//! - Inbound events delivered by the host event bus and outbound send targets
//!
//! Persistence, matching, and lifecycle logic belong to the other crates,
//! not here.

mod event;
mod kinds;
mod message;

pub use event::{EventBody, InboundEvent, SendTarget};
pub use kinds::ItemKind;
pub use message::MessageMask;

/// Identifier for any stored item. All kinds share one allocation sequence,
/// so an ID is globally unique in practice even though each kind has its
/// own keyspace.
pub type ItemId = u64;

/// ID of the root group. The root always exists and is never deleted.
pub const ROOT_GROUP: ItemId = 0;
