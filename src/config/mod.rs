mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    AuthSettings, BrokerSettings, LoggingSettings, PersistenceSettings, ServerSettings, Settings,
};

/// File consulted when no explicit path is given. Optional.
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Loads configuration from `path` (or the default file) and `PULSEHUB_*`
/// environment variables, then merges it with default values.
///
/// Sections in environment variables are separated by `__`, so
/// `PULSEHUB_SERVER__PORT=9000` sets `server.port`. An explicitly given file
/// must exist.
pub fn load_config_from(path: Option<&str>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("PULSEHUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
