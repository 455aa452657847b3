//! Marketplace backend integration: REST client, realtime hub and the
//! adapter that exposes both to the use-case layer.

pub mod realtime;
pub mod rest;
pub mod wire;

use reqwest::Url;
use serde_json::Value;
use tokio::runtime::Runtime;

use crate::{
    domain::requirement::RequirementDecision,
    infra::{config::AppConfig, error::AppError, secrets::redact_cookie},
    usecases::{
        current_user::{CurrentUserSource, CurrentUserSourceError},
        list_contacts::{ContactsSource, ContactsSourceError},
        load_history::{HistorySource, HistorySourceError},
        login::{LoginResponse, LoginSource, LoginSourceError},
        mark_read::{ReadMarker, ReadMarkerError},
        notifications::{NotificationsSource, NotificationsSourceError},
        requirements::{RequirementsSource, RequirementsSourceError},
    },
};

use self::{
    realtime::RealtimeHub,
    rest::{RestClient, RestError},
};

const BACKEND_ADAPTER_READY: &str = "BACKEND_ADAPTER_READY";
const BACKEND_MARK_READ_FAILED: &str = "BACKEND_MARK_READ_FAILED";

/// Owns the async runtime and exposes blocking sources to the use cases.
#[derive(Debug)]
pub struct BackendAdapter {
    runtime: Runtime,
    rest: RestClient,
    socket_url: Url,
    config: AppConfig,
}

impl BackendAdapter {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dmchat-io")
            .enable_all()
            .build()
            .map_err(AppError::RuntimeInit)?;

        let rest = RestClient::new(&config.backend, &config.session)?;
        let socket_url =
            wire::socket_url(rest.base_url()).ok_or_else(|| AppError::InvalidBackendUrl {
                url: config.backend.api_url.clone(),
                details: "no websocket endpoint for this url".to_owned(),
            })?;

        tracing::debug!(
            code = BACKEND_ADAPTER_READY,
            api_url = %config.backend.api_url,
            cookie = %redact_cookie(&config.session.cookie),
            "backend adapter ready"
        );

        Ok(Self {
            runtime,
            rest,
            socket_url,
            config: config.clone(),
        })
    }

    /// Returns the shared realtime connection, connecting on first use.
    pub fn realtime(&self) -> RealtimeHub {
        RealtimeHub::acquire(
            self.runtime.handle(),
            &self.socket_url,
            &self.config.realtime,
            &self.config.session.cookie,
        )
    }
}

impl HistorySource for BackendAdapter {
    fn fetch_history(&self, partner_id: &str) -> Result<Vec<Value>, HistorySourceError> {
        let body = self
            .runtime
            .block_on(self.rest.history(partner_id))
            .map_err(|error| match error {
                RestError::Unauthorized => HistorySourceError::Unauthorized,
                RestError::NotFound => HistorySourceError::NotFound,
                RestError::Unavailable => HistorySourceError::Unavailable,
                RestError::InvalidData => HistorySourceError::InvalidData,
            })?;

        into_records(body, "messages").ok_or(HistorySourceError::InvalidData)
    }
}

/// Fire-and-forget: the request runs on the io runtime and failures are
/// only logged, so the caller never waits on the network.
impl ReadMarker for BackendAdapter {
    fn mark_read(&self, partner_id: &str) -> Result<(), ReadMarkerError> {
        let rest = self.rest.clone();
        let partner_id = partner_id.to_owned();

        self.runtime.spawn(async move {
            if let Err(error) = rest.mark_read(&partner_id).await {
                tracing::warn!(
                    code = BACKEND_MARK_READ_FAILED,
                    partner_id = %partner_id,
                    error = %error,
                    "mark read failed"
                );
            }
        });

        Ok(())
    }
}

impl LoginSource for BackendAdapter {
    fn login(&self, email: &str, password: &str) -> Result<LoginResponse, LoginSourceError> {
        let reply = self
            .runtime
            .block_on(self.rest.login(email, password))
            .map_err(|error| match error {
                RestError::InvalidData => LoginSourceError::InvalidData,
                RestError::Unauthorized | RestError::NotFound | RestError::Unavailable => {
                    LoginSourceError::Unavailable
                }
            })?;

        Ok(LoginResponse {
            body: reply.body,
            cookie: reply.cookie,
        })
    }
}

impl RequirementsSource for BackendAdapter {
    fn list_requirements(&self) -> Result<Value, RequirementsSourceError> {
        self.runtime
            .block_on(self.rest.requirements())
            .map_err(map_requirements_error)
    }

    fn decide_requirement(
        &self,
        id: &str,
        decision: RequirementDecision,
    ) -> Result<Value, RequirementsSourceError> {
        self.runtime
            .block_on(self.rest.decide_requirement(id, decision))
            .map_err(map_requirements_error)
    }
}

impl ContactsSource for BackendAdapter {
    fn list_contacts(&self) -> Result<Vec<Value>, ContactsSourceError> {
        let body = self
            .runtime
            .block_on(self.rest.contacts())
            .map_err(|error| match error {
                RestError::Unauthorized => ContactsSourceError::Unauthorized,
                RestError::InvalidData => ContactsSourceError::InvalidData,
                RestError::NotFound | RestError::Unavailable => ContactsSourceError::Unavailable,
            })?;

        into_records(body, "users").ok_or(ContactsSourceError::InvalidData)
    }
}

impl CurrentUserSource for BackendAdapter {
    fn current_user(&self) -> Result<Value, CurrentUserSourceError> {
        self.runtime
            .block_on(self.rest.current_user())
            .map_err(|error| match error {
                RestError::Unauthorized | RestError::NotFound => {
                    CurrentUserSourceError::Unauthorized
                }
                RestError::InvalidData => CurrentUserSourceError::InvalidData,
                RestError::Unavailable => CurrentUserSourceError::Unavailable,
            })
    }
}

impl NotificationsSource for BackendAdapter {
    fn list_notifications(&self, page: u32, limit: u32) -> Result<Value, NotificationsSourceError> {
        self.runtime
            .block_on(self.rest.notifications(page, limit))
            .map_err(map_notifications_error)
    }

    fn mark_notification_read(&self, id: &str) -> Result<Option<Value>, NotificationsSourceError> {
        self.runtime
            .block_on(self.rest.mark_notification_read(id))
            .map_err(map_notifications_error)
    }

    fn delete_notification(&self, id: &str) -> Result<(), NotificationsSourceError> {
        self.runtime
            .block_on(self.rest.delete_notification(id))
            .map_err(map_notifications_error)
    }
}

fn map_notifications_error(error: RestError) -> NotificationsSourceError {
    match error {
        RestError::Unauthorized => NotificationsSourceError::Unauthorized,
        RestError::NotFound => NotificationsSourceError::NotFound,
        RestError::Unavailable => NotificationsSourceError::Unavailable,
        RestError::InvalidData => NotificationsSourceError::InvalidData,
    }
}

fn map_requirements_error(error: RestError) -> RequirementsSourceError {
    match error {
        RestError::Unauthorized => RequirementsSourceError::Unauthorized,
        RestError::NotFound => RequirementsSourceError::NotFound,
        RestError::Unavailable => RequirementsSourceError::Unavailable,
        RestError::InvalidData => RequirementsSourceError::InvalidData,
    }
}

/// Accepts a bare array or an object wrapping one under `key`.
fn into_records(body: Value, key: &str) -> Option<Vec<Value>> {
    match body {
        Value::Array(records) => Some(records),
        Value::Object(mut fields) => match fields.remove(key) {
            Some(Value::Array(records)) => Some(records),
            _ => None,
        },
        _ => None,
    }
}

/// Returns the backend module name for smoke checks.
pub fn module_name() -> &'static str {
    "backend"
}
