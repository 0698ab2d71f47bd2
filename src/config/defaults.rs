//! Built-in defaults, the lowest configuration layer.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("manager.lru_capacity", super::default_lru_capacity() as u64)?
        .set_default(
            "manager.max_symlink_hops",
            super::default_max_symlink_hops() as u64,
        )?
        .set_default("manager.persist_on_checksum", true)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
