//! In-memory transport that records everything the broker asks of it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::auth::Policy;
use crate::broker::{Broker, Delivery, Message};
use crate::transport::Transport;
use crate::utils::error::TransportError;

#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(String, Delivery)>>,
    failing: Mutex<HashSet<String>>,
    groups: Mutex<HashMap<String, HashSet<String>>>,
    closed: Mutex<Vec<(String, String)>>,
    fail_close: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every send to `id` fail.
    pub fn fail_for(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn fail_closes(&self) {
        *self.fail_close.lock() = true;
    }

    pub fn deliveries_to(&self, id: &str) -> Vec<Delivery> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == id)
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn messages_to(&self, id: &str) -> Vec<Message> {
        self.deliveries_to(id)
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Message(m) => Some(m),
                Delivery::Notification(_) => None,
            })
            .collect()
    }

    pub fn group(&self, topic: &str) -> HashSet<String> {
        self.groups.lock().get(topic).cloned().unwrap_or_default()
    }

    pub fn closed(&self) -> Vec<(String, String)> {
        self.closed.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn send_to_connection(&self, id: &str, delivery: &Delivery) -> Result<(), TransportError> {
        if self.failing.lock().contains(id) {
            return Err(TransportError::ConnectionClosed(id.to_string()));
        }
        self.sent.lock().push((id.to_string(), delivery.clone()));
        Ok(())
    }

    fn join_group(&self, id: &str, topic: &str) {
        self.groups
            .lock()
            .entry(topic.to_string())
            .or_default()
            .insert(id.to_string());
    }

    fn leave_group(&self, id: &str, topic: &str) {
        let mut groups = self.groups.lock();
        if let Some(members) = groups.get_mut(topic) {
            members.remove(id);
            if members.is_empty() {
                groups.remove(topic);
            }
        }
    }

    fn broadcast_to_group(&self, topic: &str, delivery: &Delivery) -> usize {
        let members: Vec<String> = self.group(topic).into_iter().collect();
        members
            .iter()
            .filter(|id| self.send_to_connection(id.as_str(), delivery).is_ok())
            .count()
    }

    fn close_connection(&self, id: &str, reason: &str) -> Result<(), TransportError> {
        if *self.fail_close.lock() {
            return Err(TransportError::ConnectionClosed(id.to_string()));
        }
        self.closed.lock().push((id.to_string(), reason.to_string()));
        Ok(())
    }
}

pub(crate) fn broker_with(transport: &Arc<RecordingTransport>) -> Arc<Broker> {
    Arc::new(Broker::new(Policy::default(), transport.clone()))
}
