use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, BackendConfig, LogConfig, RealtimeConfig, SessionConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub backend: Option<FileBackendConfig>,
    pub realtime: Option<FileRealtimeConfig>,
    pub session: Option<FileSessionConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(backend) = self.backend {
            backend.merge_into(&mut config.backend);
        }

        if let Some(realtime) = self.realtime {
            realtime.merge_into(&mut config.realtime);
        }

        if let Some(session) = self.session {
            session.merge_into(&mut config.session);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileBackendConfig {
    pub api_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl FileBackendConfig {
    fn merge_into(self, config: &mut BackendConfig) {
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }

        if let Some(timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileRealtimeConfig {
    pub reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
}

impl FileRealtimeConfig {
    fn merge_into(self, config: &mut RealtimeConfig) {
        if let Some(attempts) = self.reconnect_attempts {
            config.reconnect_attempts = attempts;
        }

        if let Some(delay_ms) = self.reconnect_delay_ms {
            config.reconnect_delay_ms = delay_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSessionConfig {
    pub cookie: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl FileSessionConfig {
    fn merge_into(self, config: &mut SessionConfig) {
        if let Some(cookie) = self.cookie {
            config.cookie = cookie;
        }

        if let Some(user_id) = self.user_id {
            config.user_id = Some(user_id);
        }

        if let Some(user_name) = self.user_name {
            config.user_name = Some(user_name);
        }
    }
}
