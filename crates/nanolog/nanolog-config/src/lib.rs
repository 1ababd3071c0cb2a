//! TOML configuration for a nanolog producer.

use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug)]
pub struct ProducerConfig {
    #[serde(default = "defaults::shm_path")]
    pub shm_path: String,
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            shm_path: defaults::shm_path(),
            capacity: defaults::capacity(),
            log_level: defaults::log_level(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn shm_path() -> String {
        "/tmp/nanolog_buffer".into()
    }

    pub fn capacity() -> usize {
        1 << 15 // 32768, the largest power of two the on-disk header's u16 field holds
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

impl ProducerConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: ProducerConfig = toml::from_str(&raw)?;
        Ok(config)
    }
}
