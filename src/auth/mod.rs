//! Identity and topic authorization.
//!
//! `Principal` is the identity attached to every connection, `Policy` decides
//! subscribe/publish rights from the topic prefix, and `TokenVerifier` turns
//! handshake tokens into principals.

pub mod policy;
pub mod principal;
pub mod token;

pub use policy::{Action, Policy, TopicClass, validate_topic};
pub use principal::{Principal, Role};
pub use token::{Claims, TokenVerifier};

#[cfg(test)]
mod tests;
