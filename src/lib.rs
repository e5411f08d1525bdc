//! # PulseHub
//!
//! `pulsehub` is an in-memory, topic-based publish/subscribe server. Clients
//! connect over WebSockets, authenticate with a signed token during the
//! handshake and exchange JSON frames to subscribe, unsubscribe and publish.
//!
//! ## Core Modules
//!
//! - `registry`: live connections, their principals and topic memberships.
//! - `broker`: the topic directory and the engine that authorizes, sequences
//!   and fans out messages.
//! - `auth`: principals, topic classes and the access policy, plus token
//!   verification.
//! - `supervisor`: reclaims disconnected and idle connections.
//! - `transport`: the `Transport` trait the broker delivers through and its
//!   WebSocket implementation.
//! - `persistence`: optional write-only archive of published messages.
//! - `config`: settings loaded from a file and the environment.
//! - `utils`: error types and logging setup.

pub mod auth;
pub mod broker;
pub mod config;
pub mod persistence;
pub mod registry;
pub mod supervisor;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_support;
