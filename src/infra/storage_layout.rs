use std::path::PathBuf;

use crate::infra::error::AppError;

const APP_DIR_NAME: &str = "dmchat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub config_dir: PathBuf,
}

impl StorageLayout {
    pub fn resolve() -> Result<Self, AppError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::StoragePathResolution {
                details: "unable to resolve the user config directory".into(),
            })?
            .join(APP_DIR_NAME);

        Ok(Self { config_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn session_file(&self) -> PathBuf {
        self.config_dir.join("session.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_is_under_config_dir() {
        let Ok(layout) = StorageLayout::resolve() else {
            return;
        };

        assert!(layout.config_file().starts_with(&layout.config_dir));
        assert!(layout.session_file().starts_with(&layout.config_dir));
        assert!(layout.config_dir.ends_with(APP_DIR_NAME));
    }
}
