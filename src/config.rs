use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    /// Port to listen on in server mode.
    pub listen_port: u16,
    /// Peer address for client mode.
    pub host: String,
    pub connect_port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    pub max_queue_capacity: usize,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            ingest: IngestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            host: "127.0.0.1".to_string(),
            connect_port: 8080,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_queue_capacity: 10_000,
            tick_interval_ms: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else if Path::new("plotfeed.toml").exists() {
        builder = builder.add_source(File::with_name("plotfeed.toml"));
    }

    // Environment variable overrides with prefix "PLOTFEED_"
    builder = builder.add_source(
        Environment::with_prefix("PLOTFEED")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<AppConfig>()
}

/// Load configuration with better error handling and defaults
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_receiver_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ingest.max_queue_capacity, 10_000);
        assert_eq!(config.ingest.tick_interval_ms, 16);
        assert_eq!(config.network.listen_port, 8080);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/plotfeed.toml")));
        assert!(result.is_err());
    }
}
