use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to load config: {0}")]
    ConfigLoad(#[source] anyhow::Error),
    #[error("failed to initialize logging: {0}")]
    LoggingInit(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("invalid log file path {path}")]
    LogFilePath { path: PathBuf },
    #[error("failed to resolve storage path: {details}")]
    StoragePathResolution { details: String },
    #[error("invalid backend url {url}: {details}")]
    InvalidBackendUrl { url: String, details: String },
    #[error("failed to build http client: {0}")]
    HttpClientInit(#[source] reqwest::Error),
    #[error("failed to start async runtime: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error("failed to read saved session at {path}: {source}")]
    SessionRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse saved session at {path}: {source}")]
    SessionParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode session: {0}")]
    SessionEncode(#[source] toml::ser::Error),
    #[error("failed to write session to {path}: {source}")]
    SessionWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
