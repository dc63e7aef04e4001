use std::time::Duration;

use serde::Deserialize;

use crate::pipe::DEFAULT_DELIVERY_TIMEOUT;

/// Top-level configuration settings for the library.
///
/// Includes settings for the broker and for log output.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the broker.
///
/// `delivery_timeout_ms` is how long a single payload may wait for its
/// consumer before the subscription is considered unresponsive and stopped.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub delivery_timeout_ms: u64,
}

impl BrokerSettings {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Configuration settings for log output.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub delivery_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
