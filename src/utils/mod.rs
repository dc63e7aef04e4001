//! The `utils` module provides shared definitions used across `pipesub`:
//! the error types and the tracing initialisation helper.

pub mod error;
pub mod logging;

pub use error::{BrokerError, DispatchError, RunError};

#[cfg(test)]
mod tests {
    use super::logging;
    use crate::config::LoggingSettings;
    use tracing::Level;

    #[test]
    fn parse_level_accepts_aliases() {
        assert_eq!(logging::parse_level("debug"), Level::DEBUG);
        assert_eq!(logging::parse_level(" WARNING "), Level::WARN);
        assert_eq!(logging::parse_level("error"), Level::ERROR);
        assert_eq!(logging::parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn logging_init_is_idempotent() {
        // Should not panic
        logging::init(&LoggingSettings::default());
        logging::init(&LoggingSettings {
            level: "trace".to_string(),
        });
    }
}
