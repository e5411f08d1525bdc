//! Outbound side of the WebSocket transport.
//!
//! Every accepted socket gets an unbounded channel drained by its writer
//! task. `WsTransport` keeps the sending halves keyed by connection id, plus
//! a group table mirroring topic membership, and implements `Transport` on
//! top of them. Sends never touch the socket directly, so none of these
//! methods block.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::Delivery;
use crate::registry::ConnectionId;
use crate::transport::Transport;
use crate::transport::message::ServerMessage;
use crate::utils::error::TransportError;

/// Instruction for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    Frame(WsMessage),
    /// Send a close frame with this reason and stop writing.
    Close(String),
}

#[derive(Debug, Default)]
pub struct WsTransport {
    connections: RwLock<HashMap<ConnectionId, UnboundedSender<Outbound>>>,
    groups: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, id: &str, sender: UnboundedSender<Outbound>) {
        self.connections.write().insert(id.to_string(), sender);
    }

    /// Forgets a connection and drops it from every group.
    pub fn detach(&self, id: &str) {
        self.connections.write().remove(id);
        self.groups.write().retain(|_, members| {
            members.remove(id);
            !members.is_empty()
        });
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.connections.read().contains_key(id)
    }

    pub fn group_size(&self, topic: &str) -> usize {
        self.groups.read().get(topic).map_or(0, HashSet::len)
    }

    /// Serializes and queues a frame for one connection.
    pub fn send_frame(&self, id: &str, frame: &ServerMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame)?;
        self.push(id, Outbound::Frame(WsMessage::text(text)))
    }

    fn push(&self, id: &str, outbound: Outbound) -> Result<(), TransportError> {
        let connections = self.connections.read();
        let sender = connections
            .get(id)
            .ok_or_else(|| TransportError::ConnectionClosed(id.to_string()))?;
        sender
            .send(outbound)
            .map_err(|_| TransportError::ConnectionClosed(id.to_string()))
    }
}

impl Transport for WsTransport {
    fn send_to_connection(&self, id: &str, delivery: &Delivery) -> Result<(), TransportError> {
        self.send_frame(id, &ServerMessage::from(delivery))
    }

    fn join_group(&self, id: &str, topic: &str) {
        self.groups
            .write()
            .entry(topic.to_string())
            .or_default()
            .insert(id.to_string());
    }

    fn leave_group(&self, id: &str, topic: &str) {
        let mut groups = self.groups.write();
        if let Some(members) = groups.get_mut(topic) {
            members.remove(id);
            if members.is_empty() {
                groups.remove(topic);
            }
        }
    }

    fn broadcast_to_group(&self, topic: &str, delivery: &Delivery) -> usize {
        let members: Vec<ConnectionId> = match self.groups.read().get(topic) {
            Some(members) => members.iter().cloned().collect(),
            None => return 0,
        };
        let text = match serde_json::to_string(&ServerMessage::from(delivery)) {
            Ok(text) => text,
            Err(e) => {
                debug!(topic, error = %e, "failed to encode broadcast");
                return 0;
            }
        };

        members
            .iter()
            .filter(|id| {
                self.push(id.as_str(), Outbound::Frame(WsMessage::text(text.clone())))
                    .is_ok()
            })
            .count()
    }

    fn close_connection(&self, id: &str, reason: &str) -> Result<(), TransportError> {
        self.push(id, Outbound::Close(reason.to_string()))
    }
}
