use tracing_appender::non_blocking::WorkerGuard;

use crate::{backend::BackendAdapter, infra::config::AppConfig};

#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    pub backend: BackendAdapter,
    /// Keeps the log file writer alive for the process lifetime.
    pub log_guard: Option<WorkerGuard>,
}

impl AppContext {
    pub fn new(config: AppConfig, backend: BackendAdapter) -> Self {
        Self {
            config,
            backend,
            log_guard: None,
        }
    }
}
