//! The broker: topic directory, message records and the engine that ties
//! them to the connection registry.

pub mod directory;
pub mod engine;
pub mod message;
pub mod topic;

pub use directory::{SubscribeOutcome, TopicDirectory, TopicInfo, UnsubscribeOutcome};
pub use engine::{Broker, BrokerStats, PublishReceipt, SubscribeReceipt, UnsubscribeReceipt};
pub use message::{Delivery, Message, MessageKind, Notification, NotificationLevel};
