//! Shared types, errors, and utilities.

pub mod error;
pub mod messages;
pub mod reconnect;
pub mod resources;
pub mod types;

pub use messages::{BridgeCommand, BridgeEvent, OutgoingChat};
