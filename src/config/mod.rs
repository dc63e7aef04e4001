mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LoggingSettings, Settings};

/// Prefix for environment overrides, e.g. `PIPESUB_BROKER__DELIVERY_TIMEOUT_MS=250`.
pub const ENV_PREFIX: &str = "PIPESUB";

/// Loads the configuration from `config/default` and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the given file stem (any format `config`
/// recognises; the file is optional) and environment variables, then merges
/// the result over the defaults.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    // a missing .env file is not an error
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        broker: BrokerSettings {
            delivery_timeout_ms: partial
                .broker
                .as_ref()
                .and_then(|b| b.delivery_timeout_ms)
                .unwrap_or(default.broker.delivery_timeout_ms),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}

#[cfg(test)]
mod tests;
