//! Configuration System
//!
//! Layered configuration built on the `config` crate. Sources, lowest to
//! highest precedence: built-in defaults, the user config file
//! (`<config dir>/treesum/config.toml`), an explicit TOML file, then
//! environment variables such as `TREESUM__MANAGER__LRU_CAPACITY=50`.

use crate::error::ChecksumError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod defaults;
mod sources;

pub use sources::user_config_path;

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "TREESUM";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreesumConfig {
    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cache manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of resident contexts
    #[serde(default = "default_lru_capacity")]
    pub lru_capacity: usize,

    /// Bound on symlink substitutions during one resolution
    #[serde(default = "default_max_symlink_hops")]
    pub max_symlink_hops: usize,

    /// Persist modified contexts in the background after each checksum or
    /// change stream
    #[serde(default = "default_true")]
    pub persist_on_checksum: bool,

    /// Sled database directory; `None` keeps everything in memory
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

pub(crate) fn default_lru_capacity() -> usize {
    20
}

pub(crate) fn default_max_symlink_hops() -> usize {
    255
}

fn default_true() -> bool {
    true
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            lru_capacity: default_lru_capacity(),
            max_symlink_hops: default_max_symlink_hops(),
            persist_on_checksum: default_true(),
            store_path: None,
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.lru_capacity == 0 {
            return Err("lru_capacity must be at least 1".to_string());
        }
        if self.max_symlink_hops == 0 {
            return Err("max_symlink_hops must be at least 1".to_string());
        }
        if let Some(path) = &self.store_path {
            if path.as_os_str().is_empty() {
                return Err("store_path cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl TreesumConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ChecksumError> {
        self.manager
            .validate()
            .map_err(|e| ChecksumError::Config(format!("manager: {}", e)))?;
        self.logging
            .validate()
            .map_err(|e| ChecksumError::Config(format!("logging: {}", e)))?;
        Ok(())
    }
}

/// Loads [`TreesumConfig`] from layered sources
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    include_user_file: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            env_prefix: ENV_PREFIX.to_string(),
            include_user_file: true,
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read environment overrides from `<prefix>__...` instead of `TREESUM__...`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip the per-user config file.
    pub fn without_user_file(mut self) -> Self {
        self.include_user_file = false;
        self
    }

    /// Load with the default loader.
    pub fn load(path: Option<&Path>) -> Result<TreesumConfig, ChecksumError> {
        Self::new().load_from(path)
    }

    /// Build, deserialize and validate the layered configuration.
    pub fn load_from(&self, path: Option<&Path>) -> Result<TreesumConfig, ChecksumError> {
        let mut builder = defaults::builder_with_defaults()?;
        if self.include_user_file {
            builder = sources::add_user_file(builder)?;
        }
        if let Some(path) = path {
            builder = sources::add_explicit_file(builder, path)?;
        }
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: TreesumConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
