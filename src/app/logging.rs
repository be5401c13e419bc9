use super::config::LogLevel;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Directives quieting dependency noise below the chosen level.
const DEFAULT_DIRECTIVES: [&str; 3] = ["hyper=warn", "reqwest=warn", "h2=warn"];

pub fn setup_logging(level: LogLevel) -> Result<(), LoggingError> {
    let mut filter_parts = vec![level.as_filter().to_string()];
    filter_parts.extend(DEFAULT_DIRECTIVES.iter().map(|d| (*d).to_string()));

    let env_filter = EnvFilter::try_new(filter_parts.join(","))
        .map_err(|e| LoggingError::InitFailed(format!("invalid filter: {e}")))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).compact())
        .try_init()
        .map_err(|e| LoggingError::InitFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn setup_is_tolerant_of_repeat_initialization() {
        // The first call in the test process wins; later ones must fail
        // cleanly rather than panic.
        let first = setup_logging(LogLevel::Info);
        let second = setup_logging(LogLevel::Debug);
        assert!(first.is_ok() || second.is_err());
    }
}
