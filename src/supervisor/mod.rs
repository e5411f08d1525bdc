//! Connection lifecycle supervisor
//!
//! Reclaims resources held by connections that went away, either because the
//! transport reported a disconnect or because they stopped sending anything
//! for longer than the staleness timeout.
//!
//! Every reclamation is announced as an `event` on `system:presence` with
//! the connection id, principal and reason, for whoever listens there.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::registry::ConnectionSnapshot;
use crate::utils::error::HubError;

/// Topic that receives a `disconnected` event for each reclaimed connection.
pub const PRESENCE_TOPIC: &str = "system:presence";

pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct Supervisor {
    broker: Arc<Broker>,
    stale_timeout: Duration,
    sweep_interval: Duration,
}

impl Supervisor {
    pub fn new(broker: Arc<Broker>, stale_timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            broker,
            stale_timeout,
            sweep_interval,
        }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Immediate reclamation after a transport-level disconnect. Safe to call
    /// more than once; returns whether anything was reclaimed.
    pub fn on_disconnect(&self, id: &str, reason: &str) -> bool {
        match self.broker.reclaim(id, reason) {
            Some(snapshot) => {
                self.announce_departure(&snapshot, reason);
                true
            }
            None => false,
        }
    }

    pub fn heartbeat(&self, id: &str) {
        self.broker.touch(id);
    }

    /// Reclaims every connection idle for longer than `timeout` and asks the
    /// transport to close it. Returns the number reclaimed.
    pub fn sweep_stale(&self, timeout: Duration) -> usize {
        self.sweep_stale_at(Instant::now(), timeout)
    }

    pub fn sweep_stale_at(&self, now: Instant, timeout: Duration) -> usize {
        let mut reclaimed = 0;
        for id in self.broker.stale_connections(now, timeout) {
            // A heartbeat may have landed since the scan; the broker re-checks.
            let Some(snapshot) = self.broker.reclaim_if_stale(&id, now, timeout) else {
                continue;
            };
            reclaimed += 1;
            self.announce_departure(&snapshot, "timeout");
            if let Err(e) = self.broker.transport().close_connection(&id, "timeout") {
                warn!(connection = %id, error = %e, "failed to close stale connection");
            }
        }
        reclaimed
    }

    fn announce_departure(&self, snapshot: &ConnectionSnapshot, reason: &str) {
        let payload = json!({
            "event": "disconnected",
            "connection": snapshot.id,
            "principal": snapshot.principal.id,
            "reason": reason,
        });
        match self.broker.emit_event(PRESENCE_TOPIC, payload) {
            Ok(receipt) => debug!(connection = %snapshot.id, seq = receipt.sequence, "presence event emitted"),
            // Nobody is listening.
            Err(HubError::TopicNotFound(_)) => {}
            Err(e) => warn!(connection = %snapshot.id, error = %e, "failed to emit presence event"),
        }
    }

    /// Runs the periodic sweep until the task is dropped. A zero interval or
    /// timeout disables the sweep and returns immediately.
    pub async fn run(self) {
        if self.sweep_interval.is_zero() || self.stale_timeout.is_zero() {
            warn!("stale connection sweep disabled");
            return;
        }

        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_secs = self.sweep_interval.as_secs(),
            timeout_secs = self.stale_timeout.as_secs(),
            "stale connection sweep started"
        );

        loop {
            ticker.tick().await;
            let reclaimed = self.sweep_stale(self.stale_timeout);
            if reclaimed > 0 {
                info!(reclaimed, "reclaimed stale connections");
            } else {
                debug!("sweep found no stale connections");
            }
        }
    }
}
