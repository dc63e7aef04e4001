//! Tracing initialisation.

use std::str::FromStr;

use tracing::Level;

use crate::config::LoggingSettings;

/// Installs a `fmt` subscriber at the configured level.
///
/// Uses `try_init`, so embedding applications and tests may call this more
/// than once; only the first call takes effect.
pub fn init(settings: &LoggingSettings) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(&settings.level))
        .with_target(false)
        .try_init();
}

/// Unknown levels fall back to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "warning" => Level::WARN,
        other => Level::from_str(other).unwrap_or(Level::INFO),
    }
}
