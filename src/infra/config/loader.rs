use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::infra::{
    config::{file_config::FileConfig, AppConfig},
    error::AppError,
    storage_layout::StorageLayout,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Loads config from `path`, then `./config.toml`, then the per-user config dir.
pub fn load(path: Option<&Path>) -> Result<AppConfig, AppError> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path(),
    };

    load_from(&config_path)
}

fn default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_PATH);
    if local.exists() {
        return local;
    }

    StorageLayout::resolve()
        .map(|layout| layout.config_file())
        .unwrap_or(local)
}

fn load_from(config_path: &Path) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::default();

    if !config_path.exists() {
        return Ok(config);
    }

    let raw = fs::read_to_string(config_path).map_err(|source| AppError::ConfigRead {
        path: config_path.to_path_buf(),
        source,
    })?;

    let file_config: FileConfig = toml::from_str(&raw).map_err(|source| AppError::ConfigParse {
        path: config_path.to_path_buf(),
        source,
    })?;

    file_config.merge_into(&mut config);
    Ok(config)
}
