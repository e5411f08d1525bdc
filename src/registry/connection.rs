use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::auth::Principal;

pub type ConnectionId = String;

/// A live client connection as tracked by the registry.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier assigned by the transport on accept.
    pub id: ConnectionId,

    /// Identity established during the handshake.
    pub principal: Principal,

    pub created_at: DateTime<Utc>,

    /// Monotonic timestamp of the last request or heartbeat.
    pub last_activity: Instant,

    /// Topics this connection is currently subscribed to.
    pub topics: HashSet<String>,
}

impl Connection {
    pub fn new(id: ConnectionId, principal: Principal) -> Self {
        Self {
            id,
            principal,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            topics: HashSet::new(),
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Final state of a connection handed back on removal so the caller can
/// unwind its topic memberships.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub principal: Principal,
    pub topics: HashSet<String>,
}

impl From<Connection> for ConnectionSnapshot {
    fn from(conn: Connection) -> Self {
        Self {
            id: conn.id,
            principal: conn.principal,
            topics: conn.topics,
        }
    }
}
