//! Topic authorization
//!
//! Topic names are partitioned by a colon-delimited class prefix and the
//! prefix alone decides who may subscribe or publish:
//!
//! - `public:*`  anyone may subscribe and publish
//! - `private:*` both actions require the configured private permission
//! - `user:<id>*` both actions are restricted to the principal `<id>`
//! - `system:*`  anyone may subscribe, only admins publish
//!
//! Admins bypass every check. Names without a known prefix are invalid.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::Principal;
use crate::utils::error::{HubError, Result};

pub const DEFAULT_PRIVATE_PERMISSION: &str = "private_channel_access";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Subscribe,
    Publish,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Subscribe => f.write_str("subscribe"),
            Action::Publish => f.write_str("publish"),
        }
    }
}

/// Classification of a topic name by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass<'a> {
    Public,
    Private,
    /// Per-user topic; carries the owning principal id.
    User(&'a str),
    System,
}

impl<'a> TopicClass<'a> {
    /// Returns `None` for unknown prefixes and for names with nothing after
    /// the prefix.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let (prefix, rest) = topic.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        match prefix {
            "public" => Some(TopicClass::Public),
            "private" => Some(TopicClass::Private),
            "system" => Some(TopicClass::System),
            "user" => {
                // `user:42` and `user:42:inbox` both belong to principal 42.
                let owner = rest.split(':').next().unwrap_or_default();
                if owner.is_empty() {
                    None
                } else {
                    Some(TopicClass::User(owner))
                }
            }
            _ => None,
        }
    }
}

/// Validates a topic name, returning `InvalidTopic` when no class matches.
pub fn validate_topic(topic: &str) -> Result<TopicClass<'_>> {
    TopicClass::parse(topic).ok_or_else(|| HubError::InvalidTopic(topic.to_string()))
}

/// Pure decision function over (principal, topic, action).
#[derive(Debug, Clone)]
pub struct Policy {
    private_permission: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(DEFAULT_PRIVATE_PERMISSION)
    }
}

impl Policy {
    pub fn new(private_permission: impl Into<String>) -> Self {
        Self {
            private_permission: private_permission.into(),
        }
    }

    pub fn private_permission(&self) -> &str {
        &self.private_permission
    }

    pub fn allow(&self, principal: &Principal, topic: &str, action: Action) -> bool {
        if principal.is_admin() {
            return true;
        }
        match (TopicClass::parse(topic), action) {
            (Some(TopicClass::Public), _) => true,
            (Some(TopicClass::Private), _) => principal.has_permission(&self.private_permission),
            (Some(TopicClass::User(owner)), _) => principal.id == owner,
            (Some(TopicClass::System), Action::Subscribe) => true,
            (Some(TopicClass::System), Action::Publish) => false,
            (None, _) => false,
        }
    }

    /// Name validation followed by the permission check, mapped to the
    /// errors clients see in their acks.
    pub fn check(&self, principal: &Principal, topic: &str, action: Action) -> Result<()> {
        validate_topic(topic)?;
        if self.allow(principal, topic, action) {
            Ok(())
        } else {
            Err(HubError::PermissionDenied {
                action,
                topic: topic.to_string(),
            })
        }
    }
}
