use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub auth: AuthSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Host and port the WebSocket server binds to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Connection limits and lifecycle timing. A zero timeout or interval turns
/// the stale connection sweep off.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub max_connections: usize,
    pub stale_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Token verification and the permission that unlocks `private:` topics.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub private_permission: String,
}

/// Message archive. Disabled unless explicitly turned on.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PersistenceSettings {
    pub enabled: bool,
    pub path: String,
    pub message_ttl_secs: u64,
    pub max_messages_per_topic: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub stale_timeout_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialAuthSettings {
    pub jwt_secret: Option<String>,
    pub private_permission: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPersistenceSettings {
    pub enabled: Option<bool>,
    pub path: Option<String>,
    pub message_ttl_secs: Option<u64>,
    pub max_messages_per_topic: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            broker: BrokerSettings {
                max_connections: 1000,
                stale_timeout_secs: 300,
                sweep_interval_secs: 300,
            },
            auth: AuthSettings {
                jwt_secret: "change-me".to_string(),
                private_permission: crate::auth::policy::DEFAULT_PRIVATE_PERMISSION.to_string(),
            },
            persistence: PersistenceSettings {
                enabled: false,
                path: "pulsehub_db".to_string(),
                message_ttl_secs: 3600,
                max_messages_per_topic: 1000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let auth = self.auth.unwrap_or_default();
        let persistence = self.persistence.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(defaults.server.host),
                port: server.port.unwrap_or(defaults.server.port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .max_connections
                    .unwrap_or(defaults.broker.max_connections),
                stale_timeout_secs: broker
                    .stale_timeout_secs
                    .unwrap_or(defaults.broker.stale_timeout_secs),
                sweep_interval_secs: broker
                    .sweep_interval_secs
                    .unwrap_or(defaults.broker.sweep_interval_secs),
            },
            auth: AuthSettings {
                jwt_secret: auth.jwt_secret.unwrap_or(defaults.auth.jwt_secret),
                private_permission: auth
                    .private_permission
                    .unwrap_or(defaults.auth.private_permission),
            },
            persistence: PersistenceSettings {
                enabled: persistence.enabled.unwrap_or(defaults.persistence.enabled),
                path: persistence.path.unwrap_or(defaults.persistence.path),
                message_ttl_secs: persistence
                    .message_ttl_secs
                    .unwrap_or(defaults.persistence.message_ttl_secs),
                max_messages_per_topic: persistence
                    .max_messages_per_topic
                    .unwrap_or(defaults.persistence.max_messages_per_topic),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(defaults.logging.level),
            },
        }
    }
}

impl BrokerSettings {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl PersistenceSettings {
    /// TTL and cap as the archive expects them; zero disables either limit.
    pub fn limits(&self) -> (Option<i64>, Option<usize>) {
        let ttl = i64::try_from(self.message_ttl_secs)
            .ok()
            .filter(|secs| *secs > 0);
        let cap = Some(self.max_messages_per_topic).filter(|max| *max > 0);
        (ttl, cap)
    }
}
