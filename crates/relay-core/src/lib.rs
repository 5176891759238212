//! # relay-core
//!
//! Pure value types shared across the relay server:
//!
//! - [`Message`] — one immutable chat event (user or system)
//! - [`ClientId`] — branded identity for a connected client
//! - attachment media-type validation helpers
//!
//! Nothing in this crate does I/O or holds locks.

#![deny(unsafe_code)]

pub mod attachment;
pub mod ids;
pub mod message;

pub use attachment::{image_extension, is_supported_image_type};
pub use ids::ClientId;
pub use message::{Message, MessageKind, SYSTEM_USERNAME};
