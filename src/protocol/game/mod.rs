//! World server leg: connection codec, header ciphers, packets, and
//! session state.

pub mod chat;
pub mod connector;
pub mod guild;
pub mod handler;
pub mod header;
pub mod packets;

pub use connector::{new_game_connection, GameConnection};
pub use handler::WorldHandler;
