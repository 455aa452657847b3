//! Session saved by `dmchat login`, used when the config carries no cookie.

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::infra::{config::SessionConfig, error::AppError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub cookie: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl StoredSession {
    /// Fills an empty configured session. A configured cookie always wins.
    pub fn apply_to(&self, session: &mut SessionConfig) -> bool {
        if !session.cookie.trim().is_empty() || self.cookie.trim().is_empty() {
            return false;
        }

        session.cookie = self.cookie.clone();
        if session.user_id.is_none() {
            session.user_id = self.user_id.clone();
        }
        if session.user_name.is_none() {
            session.user_name = self.user_name.clone();
        }
        true
    }
}

pub fn load(path: &Path) -> Result<Option<StoredSession>, AppError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(AppError::SessionRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    toml::from_str(&raw)
        .map(Some)
        .map_err(|source| AppError::SessionParse {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes through a temp file so a crash never leaves half a session behind.
pub fn save(path: &Path, session: &StoredSession) -> Result<(), AppError> {
    let write_error = |source| AppError::SessionWrite {
        path: path.to_path_buf(),
        source,
    };

    let encoded = toml::to_string(session).map_err(AppError::SessionEncode)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let tmp_path = path.with_extension("tmp");
    write_private(&tmp_path, encoded.as_bytes()).map_err(write_error)?;
    fs::rename(&tmp_path, path).map_err(write_error)
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::{io::Write, os::unix::fs::OpenOptionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}
