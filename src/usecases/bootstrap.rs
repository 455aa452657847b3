use std::path::Path;

use crate::{
    backend::BackendAdapter,
    infra::{
        self,
        config::{AppConfig, FileConfigAdapter},
        contracts::ConfigAdapter,
        error::AppError,
        session_store,
        storage_layout::StorageLayout,
    },
    usecases::context::AppContext,
};

const SESSION_RESTORED: &str = "BOOTSTRAP_SESSION_RESTORED";
const SESSION_IGNORED: &str = "BOOTSTRAP_SESSION_IGNORED";

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let config = FileConfigAdapter::new(config_path)
        .load()
        .map_err(AppError::ConfigLoad)?;
    let log_guard = infra::logging::init(&config.logging)?;

    let session_file = StorageLayout::resolve()
        .ok()
        .map(|layout| layout.session_file());
    let mut context = build_context(config, session_file.as_deref())?;
    context.log_guard = log_guard;

    Ok(context)
}

fn build_context(mut config: AppConfig, session_file: Option<&Path>) -> Result<AppContext, AppError> {
    if let Some(path) = session_file {
        restore_session(&mut config, path);
    }

    let backend = BackendAdapter::new(&config)?;

    Ok(AppContext::new(config, backend))
}

/// An unreadable session file must not block `dmchat login` from replacing it.
fn restore_session(config: &mut AppConfig, path: &Path) {
    match session_store::load(path) {
        Ok(Some(stored)) => {
            if stored.apply_to(&mut config.session) {
                tracing::debug!(code = SESSION_RESTORED, path = %path.display(), "using saved session");
            }
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(code = SESSION_IGNORED, error = %error, "saved session ignored");
        }
    }
}
