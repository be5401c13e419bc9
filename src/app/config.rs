use crate::sender::DEFAULT_ENDPOINT;
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Runtime configuration, from CLI arguments and environment variables, or
/// from a TOML file when `--config-file` is given.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(
    name = "gcloud-log-dispatch",
    version,
    about = "Forwards collected log records to Google Cloud Logging"
)]
pub struct Config {
    /// Load all settings from this TOML file instead of the command line
    #[arg(long, env = "CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Probe the cloud metadata service for platform and identity fields
    #[arg(
        long,
        env = "USE_METADATA_SERVICE",
        action = ArgAction::Set,
        default_value_t = true
    )]
    #[serde(default = "default_true")]
    pub use_metadata_service: bool,

    /// Project id override; skips the corresponding metadata fetch
    #[arg(long, env = "PROJECT_ID")]
    #[serde(default)]
    pub project_id: Option<String>,

    /// Zone override; skips the corresponding metadata fetch
    #[arg(long, env = "ZONE")]
    #[serde(default)]
    pub zone: Option<String>,

    /// VM id override; skips the corresponding metadata fetch
    #[arg(long, env = "VM_ID")]
    #[serde(default)]
    pub vm_id: Option<String>,

    /// Record field to entry label mappings, as `field=label` pairs
    #[arg(long = "label-map", env = "LABEL_MAP", value_delimiter = ',')]
    #[serde(default)]
    pub label_map: Vec<String>,

    /// Base URL of the logging backend
    #[arg(long, env = "ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum tuples accumulated before a chunk is dispatched
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 100)]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Flush interval for partially filled chunks, in milliseconds
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value_t = 5000)]
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Log level for the process's own diagnostics
    #[arg(long, env = "LOG_LEVEL", value_enum, default_value = "info")]
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_chunk_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: None,
            use_metadata_service: true,
            project_id: None,
            zone: None,
            vm_id: None,
            label_map: Vec::new(),
            endpoint: default_endpoint(),
            chunk_size: default_chunk_size(),
            flush_interval_ms: default_flush_interval_ms(),
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Parses the command line; a `--config-file` argument switches to the
    /// TOML file as the single source of settings.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::parse();
        match &config.config_file {
            Some(path) => Self::from_file(path),
            None => Ok(config),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("endpoint '{}': {e}", self.endpoint)))?;

        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "flush_interval_ms must be greater than zero".to_string(),
            ));
        }

        self.parsed_label_map().map(|_| ())
    }

    /// The `field=label` pairs as a lookup map for the transformer.
    pub fn parsed_label_map(&self) -> Result<HashMap<String, String>, ConfigError> {
        let mut label_map = HashMap::with_capacity(self.label_map.len());
        for pair in &self.label_map {
            let Some((field, label)) = pair.split_once('=') else {
                return Err(ConfigError::InvalidConfig(format!(
                    "label map entry '{pair}' is not of the form field=label"
                )));
            };
            if field.is_empty() || label.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "label map entry '{pair}' has an empty side"
                )));
            }
            label_map.insert(field.to_string(), label.to_string());
        }
        Ok(label_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn label_map_pairs_parse() {
        let config = Config {
            label_map: vec![
                "extra_field=my/label".to_string(),
                "instance=compute.googleapis.com/resource_id".to_string(),
            ],
            ..Default::default()
        };
        let parsed = config.parsed_label_map().unwrap();
        assert_eq!(parsed["extra_field"], "my/label");
        assert_eq!(parsed["instance"], "compute.googleapis.com/resource_id");
    }

    #[test]
    fn malformed_label_map_entry_is_rejected() {
        let config = Config {
            label_map: vec!["no-equals-sign".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let config = Config {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = Config {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cli_defaults_match_config_defaults() {
        let parsed = Config::parse_from(["gcloud-log-dispatch"]);
        let defaults = Config::default();
        assert_eq!(parsed.use_metadata_service, defaults.use_metadata_service);
        assert_eq!(parsed.endpoint, defaults.endpoint);
        assert_eq!(parsed.chunk_size, defaults.chunk_size);
        assert_eq!(parsed.log_level, defaults.log_level);
    }

    #[test]
    fn cli_overrides_parse() {
        let parsed = Config::parse_from([
            "gcloud-log-dispatch",
            "--use-metadata-service",
            "false",
            "--project-id",
            "my-project",
            "--label-map",
            "a=b,c=d",
        ]);
        assert!(!parsed.use_metadata_service);
        assert_eq!(parsed.project_id.as_deref(), Some("my-project"));
        assert_eq!(parsed.label_map, vec!["a=b", "c=d"]);
    }
}
