use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::infra::{
    config::{load, AppConfig},
    contracts::ConfigAdapter,
};

#[derive(Debug, Clone, Default)]
pub struct FileConfigAdapter {
    path: Option<PathBuf>,
}

impl FileConfigAdapter {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
        }
    }
}

impl ConfigAdapter for FileConfigAdapter {
    fn load(&self) -> Result<AppConfig> {
        Ok(load(self.path.as_deref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_used() {
        let temp_dir = tempfile::tempdir().expect("must create temp dir");
        let config_path = temp_dir.path().join("dmchat.toml");
        std::fs::write(&config_path, "[session]\nuser_name = \"Ada\"\n")
            .expect("must write test config");

        let config = FileConfigAdapter::new(Some(&config_path))
            .load()
            .expect("config must load");

        assert_eq!(config.session.user_name.as_deref(), Some("Ada"));
    }
}
