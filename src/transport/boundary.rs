//! The capability surface the broker needs from a network transport.
//!
//! Implementations must not call back into the broker from these methods:
//! the broker may invoke them while it holds a topic's delivery turn.

use crate::broker::message::Delivery;
use crate::utils::error::TransportError;

pub trait Transport: Send + Sync {
    /// Best-effort unicast. An error means this one connection could not be
    /// reached.
    fn send_to_connection(&self, id: &str, delivery: &Delivery) -> Result<(), TransportError>;

    /// Mirrors a topic subscription into the transport's own group table.
    fn join_group(&self, id: &str, topic: &str);

    fn leave_group(&self, id: &str, topic: &str);

    /// Sends to every member of the transport group; returns how many sends
    /// succeeded.
    fn broadcast_to_group(&self, topic: &str, delivery: &Delivery) -> usize;

    /// Forcibly closes a connection.
    fn close_connection(&self, id: &str, reason: &str) -> Result<(), TransportError>;
}
