// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Pipe device table configuration
//! INTENT: TOML loading and validation of device count and ring size
//! DEPS: serde, toml, std::fs
//!
//! ```toml
//! devices = 4
//! buffer_size = 4000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ring::MIN_CAPACITY;

/// Number of pipe devices registered when unconfigured.
pub const DEFAULT_DEVICES: u32 = 4;
/// Ring capacity used when unconfigured.
pub const DEFAULT_BUFFER_SIZE: usize = 4000;
/// Largest ring capacity accepted.
pub const MAX_BUFFER_SIZE: usize = 1 << 20;

/// Errors raised while loading a [`PipeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read pipe config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The config text is not valid TOML for this schema.
    #[error("failed to parse pipe config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The config parsed but holds unusable values.
    #[error("invalid pipe config: {0}")]
    Invalid(String),
}

/// Device table settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipeConfig {
    /// How many pipe devices (minors `0..devices`) to register.
    pub devices: u32,
    /// Ring capacity in bytes; one byte is reserved, so `buffer_size - 1` are usable.
    pub buffer_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self { devices: DEFAULT_DEVICES, buffer_size: DEFAULT_BUFFER_SIZE }
    }
}

impl PipeConfig {
    /// Parses and validates a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Checks device count and ring size bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices == 0 {
            return Err(ConfigError::Invalid("devices must be at least 1".to_string()));
        }
        if !(MIN_CAPACITY..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(ConfigError::Invalid(format!(
                "buffer_size {} outside {MIN_CAPACITY}..={MAX_BUFFER_SIZE}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}
