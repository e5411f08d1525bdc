//! Topic state
//!
//! A `Topic` holds the subscriber ids for one topic name together with its
//! sequence counter. Callers must synchronize access (the broker keeps every
//! topic behind its state lock).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::registry::ConnectionId;

#[derive(Debug)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashSet<ConnectionId>,
    pub created_at: DateTime<Utc>,
    /// Last sequence number handed out; 0 until the first publish.
    sequence: u64,
    delivery_gate: Arc<DeliveryGate>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
            created_at: Utc::now(),
            sequence: 0,
            delivery_gate: Arc::new(DeliveryGate::default()),
        }
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn subscribe(&mut self, id: ConnectionId) -> bool {
        self.subscribers.insert(id)
    }

    /// Remove a subscriber. Returns `false` if it was not a member.
    pub fn unsubscribe(&mut self, id: &str) -> bool {
        self.subscribers.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Advances the counter and returns the new value, starting at 1.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Number of messages published since the topic was created.
    pub fn message_count(&self) -> u64 {
        self.sequence
    }

    /// Reserves the next delivery turn. Call under the same lock that
    /// assigns sequence numbers so turns and sequences line up.
    pub(crate) fn reserve_turn(&self) -> DeliveryTurn {
        DeliveryGate::reserve(&self.delivery_gate)
    }
}

#[derive(Debug, Default)]
struct GateState {
    issued: u64,
    serving: u64,
}

/// Orders fan-out per topic. Turns are reserved under the broker's state
/// lock and waited for after it is released.
#[derive(Debug, Default)]
pub(crate) struct DeliveryGate {
    state: Mutex<GateState>,
    turn_changed: Condvar,
}

impl DeliveryGate {
    fn reserve(gate: &Arc<Self>) -> DeliveryTurn {
        let mut state = gate.state.lock();
        let number = state.issued;
        state.issued += 1;
        DeliveryTurn {
            gate: Arc::clone(gate),
            number,
            active: false,
        }
    }

    fn wait_for(&self, number: u64) {
        let mut state = self.state.lock();
        while state.serving != number {
            self.turn_changed.wait(&mut state);
        }
    }

    fn finish(&self, number: u64) {
        let mut state = self.state.lock();
        state.serving = number + 1;
        self.turn_changed.notify_all();
    }
}

/// A reserved place in a topic's delivery order. Dropping the turn passes
/// it on; a turn dropped before `wait` still waits its place first so later
/// turns never overtake it.
#[derive(Debug)]
pub(crate) struct DeliveryTurn {
    gate: Arc<DeliveryGate>,
    number: u64,
    active: bool,
}

impl DeliveryTurn {
    /// Blocks until every earlier turn on this topic has finished.
    pub(crate) fn wait(&mut self) {
        if !self.active {
            self.gate.wait_for(self.number);
            self.active = true;
        }
    }
}

impl Drop for DeliveryTurn {
    fn drop(&mut self) {
        self.wait();
        self.gate.finish(self.number);
    }
}
