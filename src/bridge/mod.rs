//! The narrow core/host boundary.

pub mod channels;

pub use channels::{bridge_channels, BridgeHandle, GameChannels};
