//! File sources: the per-user config file and an explicit path.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path to the per-user config file (`$XDG_CONFIG_HOME/treesum/config.toml`
/// on Linux).
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treesum").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Add the per-user config file to the builder if it exists.
pub fn add_user_file(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match user_config_path() {
        Some(path) if path.exists() => {
            debug!(config_path = %path.display(), "Loading user configuration");
            Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)))
        }
        _ => Ok(builder),
    }
}

/// Add an explicitly requested TOML file; it must exist.
pub fn add_explicit_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Message(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    debug!(config_path = %path.display(), "Loading configuration file");
    Ok(builder.add_source(
        File::from(path.to_path_buf())
            .format(FileFormat::Toml)
            .required(true),
    ))
}
