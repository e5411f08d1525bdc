//! The `persistence` module archives published messages.
//!
//! The broker records every sequenced message through `MessageStore` after
//! releasing its state lock. The archive is write-only from the clients'
//! perspective; nothing is replayed on subscribe.

pub mod sled_store;

pub use sled_store::SledStore;

use crate::broker::message::Message;
use crate::utils::error::StoreError;

pub trait MessageStore: Send + Sync {
    fn record(&self, message: &Message) -> Result<(), StoreError>;
}

/// Store used when persistence is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl MessageStore for NoopStore {
    fn record(&self, _message: &Message) -> Result<(), StoreError> {
        Ok(())
    }
}
