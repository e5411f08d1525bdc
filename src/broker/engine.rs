//! Broker engine
//!
//! The broker owns the connection registry and the topic directory and is
//! the only place either is mutated. Responsibilities:
//! - subscribe/unsubscribe with authorization, keeping both sides of the
//!   connection/topic relationship in step
//! - sequencing and fan-out of published messages
//! - reclaiming connections on disconnect or staleness
//!
//! Concurrency and usage notes:
//! - Registry and directory share one lock, so every operation is atomic with
//!   respect to the others. The lock is never held across a transport call.
//! - Publish reserves a delivery turn on the topic while it assigns the
//!   sequence number, then waits for that turn after releasing the state
//!   lock. Fan-out therefore happens outside the lock but still in sequence
//!   order for each topic. Archiving happens before the wait and does not
//!   hold up other publishers.
//! - The broker is shared as `Arc<Broker>` between the transport's
//!   per-connection tasks and the supervisor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{Action, Policy, Principal, validate_topic};
use crate::broker::directory::{DeliveryTicket, TopicDirectory, TopicInfo};
use crate::broker::message::{
    Delivery, Message, MessageKind, Notification, NotificationLevel, SYSTEM_SENDER,
};
use crate::persistence::{MessageStore, NoopStore};
use crate::registry::{ConnectionId, ConnectionSnapshot, Registry};
use crate::transport::Transport;
use crate::utils::error::{HubError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeReceipt {
    pub topic: String,
    pub created: bool,
    pub subscriber_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeReceipt {
    pub topic: String,
    pub subscriber_count: usize,
    pub topic_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: String,
    pub sequence: u64,
    /// Successful sends among the subscribers present when the sequence
    /// number was assigned.
    pub delivered_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    pub connections: usize,
    pub topics: usize,
    pub messages_published: u64,
}

#[derive(Debug, Default)]
struct BrokerState {
    registry: Registry,
    directory: TopicDirectory,
}

pub struct Broker {
    state: Mutex<BrokerState>,
    policy: Policy,
    transport: Arc<dyn Transport>,
    store: Arc<dyn MessageStore>,
    published: AtomicU64,
}

impl Broker {
    pub fn new(policy: Policy, transport: Arc<dyn Transport>) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            policy,
            transport,
            store: Arc::new(NoopStore),
            published: AtomicU64::new(0),
        }
    }

    /// Archive every published message in `store`.
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = store;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Registers a freshly authenticated connection.
    pub fn connect(&self, id: ConnectionId, principal: Principal) -> Result<()> {
        let principal_id = principal.id.clone();
        self.state.lock().registry.register(id.clone(), principal)?;
        info!(connection = %id, principal = %principal_id, "connection registered");
        Ok(())
    }

    pub fn principal(&self, id: &str) -> Option<Principal> {
        self.state
            .lock()
            .registry
            .get(id)
            .map(|conn| conn.principal.clone())
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.state.lock().registry.contains(id)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().registry.count()
    }

    /// Records activity on a connection. Unknown ids are ignored.
    pub fn touch(&self, id: &str) {
        self.state.lock().registry.touch(id);
    }

    pub fn subscribe(&self, id: &str, topic: &str) -> Result<SubscribeReceipt> {
        let outcome = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let conn = state
                .registry
                .get(id)
                .ok_or_else(|| HubError::ConnectionNotFound(id.to_string()))?;
            self.policy.check(&conn.principal, topic, Action::Subscribe)?;

            state.registry.add_topic(id, topic)?;
            state.directory.subscribe(topic, id.to_string())
        };

        self.transport.join_group(id, topic);
        if outcome.created {
            debug!(topic, "topic created");
        }
        debug!(connection = %id, topic, subscribers = outcome.subscriber_count, "subscribed");

        Ok(SubscribeReceipt {
            topic: topic.to_string(),
            created: outcome.created,
            subscriber_count: outcome.subscriber_count,
        })
    }

    /// Leaves a topic. Repeating the call, or leaving a topic the connection
    /// never joined, is a no-op.
    pub fn unsubscribe(&self, id: &str, topic: &str) -> Result<UnsubscribeReceipt> {
        let outcome = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.registry.remove_topic(id, topic)?;
            state.directory.unsubscribe(topic, id)
        };

        self.transport.leave_group(id, topic);
        if outcome.topic_removed {
            debug!(topic, "topic removed");
        }
        debug!(connection = %id, topic, subscribers = outcome.subscriber_count, "unsubscribed");

        Ok(UnsubscribeReceipt {
            topic: topic.to_string(),
            subscriber_count: outcome.subscriber_count,
            topic_removed: outcome.topic_removed,
        })
    }

    /// Publishes `payload` on behalf of connection `id`.
    ///
    /// Rejected with `TopicNotFound` when nobody is subscribed; in that case
    /// no topic entry is created and no counter moves.
    pub fn publish(&self, id: &str, topic: &str, payload: Value) -> Result<PublishReceipt> {
        let (message, ticket) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let conn = state
                .registry
                .get(id)
                .ok_or_else(|| HubError::ConnectionNotFound(id.to_string()))?;
            self.policy.check(&conn.principal, topic, Action::Publish)?;
            let from = conn.principal.id.clone();

            let ticket = state.directory.prepare_delivery(topic)?;
            let message = Message::new(MessageKind::Message, topic, &from, payload, ticket.sequence);
            (message, ticket)
        };

        Ok(self.fan_out(message, ticket))
    }

    /// Server-originated publish. Sequenced like any other message and sent
    /// as an `event` from the system sender; no authorization applies. The
    /// supervisor uses it for presence events.
    pub fn emit_event(&self, topic: &str, payload: Value) -> Result<PublishReceipt> {
        validate_topic(topic)?;
        let (message, ticket) = {
            let mut state = self.state.lock();
            let ticket = state.directory.prepare_delivery(topic)?;
            let message = Message::new(
                MessageKind::Event,
                topic,
                SYSTEM_SENDER,
                payload,
                ticket.sequence,
            );
            (message, ticket)
        };

        Ok(self.fan_out(message, ticket))
    }

    /// Sends a notification to a single connection.
    ///
    /// Clients cannot trigger notifications over the wire; this and
    /// `notify_topic` are for the application embedding the broker.
    pub fn notify(&self, id: &str, level: NotificationLevel, message: &str) -> Result<()> {
        if !self.is_connected(id) {
            return Err(HubError::ConnectionNotFound(id.to_string()));
        }
        let delivery = Delivery::Notification(Notification::new(level, message));
        self.transport
            .send_to_connection(id, &delivery)
            .map_err(|e| {
                warn!(connection = %id, error = %e, "notification not delivered");
                HubError::ConnectionNotFound(id.to_string())
            })
    }

    /// Broadcasts a notification to the transport group of `topic`. Returns
    /// the number of connections reached.
    pub fn notify_topic(&self, topic: &str, level: NotificationLevel, message: &str) -> usize {
        let delivery = Delivery::Notification(Notification::new(level, message));
        self.transport.broadcast_to_group(topic, &delivery)
    }

    pub fn topic_info(&self, topic: &str) -> Option<TopicInfo> {
        self.state.lock().directory.info(topic)
    }

    /// Snapshot of the subscriber ids currently joined to `topic`.
    pub fn subscribers(&self, topic: &str) -> Vec<ConnectionId> {
        self.state.lock().directory.subscribers(topic)
    }

    pub fn stats(&self) -> BrokerStats {
        let state = self.state.lock();
        BrokerStats {
            connections: state.registry.count(),
            topics: state.directory.len(),
            messages_published: self.published.load(Ordering::Relaxed),
        }
    }

    /// Removes a connection and every membership it held. Returns `None` if
    /// it was already gone.
    pub(crate) fn reclaim(&self, id: &str, reason: &str) -> Option<ConnectionSnapshot> {
        self.reclaim_where(id, reason, |_| true)
    }

    /// Like `reclaim`, but only if the connection is still idle past
    /// `timeout` when the lock is taken.
    pub(crate) fn reclaim_if_stale(
        &self,
        id: &str,
        now: Instant,
        timeout: Duration,
    ) -> Option<ConnectionSnapshot> {
        self.reclaim_where(id, "timeout", |broker_state| {
            broker_state
                .registry
                .get(id)
                .is_some_and(|conn| conn.idle_for(now) > timeout)
        })
    }

    pub(crate) fn stale_connections(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.state.lock().registry.stale(now, timeout)
    }

    fn reclaim_where<F>(&self, id: &str, reason: &str, should_reclaim: F) -> Option<ConnectionSnapshot>
    where
        F: FnOnce(&BrokerState) -> bool,
    {
        let snapshot = {
            let mut guard = self.state.lock();
            if !should_reclaim(&*guard) {
                return None;
            }
            let state = &mut *guard;
            let snapshot = state.registry.remove(id)?;
            for topic in &snapshot.topics {
                let outcome = state.directory.unsubscribe(topic, id);
                if outcome.topic_removed {
                    debug!(topic = %topic, "topic removed");
                }
            }
            snapshot
        };

        for topic in &snapshot.topics {
            self.transport.leave_group(id, topic);
        }
        info!(
            connection = %id,
            principal = %snapshot.principal.id,
            topics = snapshot.topics.len(),
            reason,
            "connection reclaimed"
        );
        Some(snapshot)
    }

    fn fan_out(&self, message: Message, ticket: DeliveryTicket) -> PublishReceipt {
        let DeliveryTicket {
            recipients,
            mut turn,
            ..
        } = ticket;

        self.published.fetch_add(1, Ordering::Relaxed);
        // Archive keys carry the sequence number, so this needs no turn.
        if let Err(e) = self.store.record(&message) {
            warn!(topic = %message.topic, seq = message.seq, error = %e, "failed to archive message");
        }

        turn.wait();

        let message_id = message.id.clone();
        let sequence = message.seq;
        let topic = message.topic.clone();
        let delivery = Delivery::Message(message);

        let mut delivered_count = 0;
        for id in &recipients {
            match self.transport.send_to_connection(id, &delivery) {
                Ok(()) => delivered_count += 1,
                Err(e) => warn!(connection = %id, error = %e, "delivery failed"),
            }
        }
        drop(turn);
        debug!(
            topic = %topic,
            seq = sequence,
            recipients = recipients.len(),
            delivered = delivered_count,
            "message published"
        );

        PublishReceipt {
            message_id,
            sequence,
            delivered_count,
        }
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
