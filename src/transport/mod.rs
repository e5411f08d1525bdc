//! The `transport` module handles network communication with clients over
//! WebSockets.
//!
//! It defines the wire envelope, the `Transport` capability trait the broker
//! delivers through, the WebSocket implementation of that trait, and the
//! server loop that authenticates connections and forwards client requests to
//! the broker.

pub mod boundary;
pub mod connections;
pub mod handler;
pub mod message;
pub mod websocket;

pub use boundary::Transport;
pub use connections::{Outbound, WsTransport};
pub use message::{ClientMessage, ServerMessage};
pub use websocket::{Gateway, serve, start_websocket_server};

#[cfg(test)]
mod tests;
