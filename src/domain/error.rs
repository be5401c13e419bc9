use thiserror::Error;

/// Top-level error type for the dispatch engine: everything that can abort
/// startup or the pipeline run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::config::ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::app::logging::LoggingError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] crate::metadata::MetadataError),

    #[error("Identity resolution failed: {0}")]
    Identity(#[from] crate::metadata::ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] crate::sender::ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
