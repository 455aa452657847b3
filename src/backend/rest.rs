use std::{sync::Arc, time::Duration};

use reqwest::{
    cookie::{CookieStore, Jar},
    header, Client, Method, StatusCode, Url,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    domain::requirement::RequirementDecision,
    infra::{
        config::{BackendConfig, SessionConfig},
        error::AppError,
    },
};

const TOKEN_COOKIE: &str = "token";

const REST_REQUEST_FAILED: &str = "BACKEND_REST_REQUEST_FAILED";
const REST_STATUS_REJECTED: &str = "BACKEND_REST_STATUS_REJECTED";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestError {
    #[error("session rejected by backend")]
    Unauthorized,
    #[error("resource not found")]
    NotFound,
    #[error("backend unavailable")]
    Unavailable,
    #[error("backend returned an unreadable body")]
    InvalidData,
}

/// Chat endpoints rely on the cookie alone; the notification endpoints also
/// expect the `token` cookie echoed as a bearer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Cookie,
    CookieAndBearer,
}

/// Answer to a login attempt. Rejected credentials still carry the body so
/// the caller can show the backend's message.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginReply {
    pub body: Value,
    /// Cookie header value the backend set, ready to be stored.
    pub cookie: Option<String>,
}

/// Cookie-authenticated JSON client for the marketplace REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    jar: Arc<Jar>,
    base: Url,
    bearer: Option<String>,
}

impl RestClient {
    pub fn new(backend: &BackendConfig, session: &SessionConfig) -> Result<Self, AppError> {
        let base = parse_base_url(&backend.api_url)?;

        let jar = Arc::new(Jar::default());
        let cookie = session.cookie.trim();
        for pair in cookie.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            jar.add_cookie_str(pair, &base);
        }

        let http = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_millis(backend.request_timeout_ms))
            .build()
            .map_err(AppError::HttpClientInit)?;

        Ok(Self {
            http,
            jar,
            base,
            bearer: bearer_token(cookie),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginReply, RestError> {
        let url = endpoint(&self.base, &["api", "auth", "login"]);
        let response = self
            .http
            .post(url.clone())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|error| request_failed(&Method::POST, &url, &error))?;

        let status = response.status();
        let credentials_rejected = matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        );
        if !status.is_success() && !credentials_rejected {
            return Err(status_rejected(&Method::POST, &url, status));
        }

        let body = response.text().await.map_err(|_| RestError::Unavailable)?;
        let body = serde_json::from_str(&body).unwrap_or(Value::Null);
        let cookie = self
            .jar
            .cookies(&self.base)
            .and_then(|value| value.to_str().ok().map(str::to_owned))
            .filter(|cookie| !cookie.trim().is_empty());

        Ok(LoginReply { body, cookie })
    }

    pub async fn current_user(&self) -> Result<Value, RestError> {
        self.request_json(Method::GET, &["api", "auth", "me"], &[], Auth::Cookie)
            .await
    }

    pub async fn contacts(&self) -> Result<Value, RestError> {
        self.request_json(Method::GET, &["api", "chat", "users"], &[], Auth::Cookie)
            .await
    }

    pub async fn history(&self, partner_id: &str) -> Result<Value, RestError> {
        self.request_json(
            Method::GET,
            &["api", "chat", "messages", partner_id],
            &[],
            Auth::Cookie,
        )
        .await
    }

    pub async fn mark_read(&self, partner_id: &str) -> Result<(), RestError> {
        self.request(
            Method::PUT,
            &["api", "chat", "mark-read", partner_id],
            &[],
            Auth::Cookie,
        )
        .await
        .map(|_| ())
    }

    pub async fn notifications(&self, page: u32, limit: u32) -> Result<Value, RestError> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        self.request_json(
            Method::GET,
            &["api", "notifications"],
            &query,
            Auth::CookieAndBearer,
        )
        .await
    }

    /// Returns the updated record when the response has a JSON body.
    pub async fn mark_notification_read(&self, id: &str) -> Result<Option<Value>, RestError> {
        let body = self
            .request(
                Method::PATCH,
                &["api", "notifications", id, "read"],
                &[],
                Auth::CookieAndBearer,
            )
            .await?;

        Ok(serde_json::from_str(&body).ok())
    }

    pub async fn delete_notification(&self, id: &str) -> Result<(), RestError> {
        self.request(
            Method::DELETE,
            &["api", "notifications", id],
            &[],
            Auth::CookieAndBearer,
        )
        .await
        .map(|_| ())
    }

    pub async fn requirements(&self) -> Result<Value, RestError> {
        self.request_json(Method::GET, &["api", "requirements"], &[], Auth::Cookie)
            .await
    }

    pub async fn decide_requirement(
        &self,
        id: &str,
        decision: RequirementDecision,
    ) -> Result<Value, RestError> {
        self.request_json(
            Method::PUT,
            &["api", "requirements", id, decision_segment(decision)],
            &[],
            Auth::Cookie,
        )
        .await
    }

    async fn request_json(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        auth: Auth,
    ) -> Result<Value, RestError> {
        let body = self.request(method, segments, query, auth).await?;
        serde_json::from_str(&body).map_err(|_| RestError::InvalidData)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        auth: Auth,
    ) -> Result<String, RestError> {
        let url = endpoint(&self.base, segments);
        let mut request = self.http.request(method.clone(), url.clone()).query(query);
        if let (Auth::CookieAndBearer, Some(token)) = (auth, &self.bearer) {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|error| request_failed(&method, &url, &error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_rejected(&method, &url, status));
        }

        response.text().await.map_err(|_| RestError::Unavailable)
    }
}

fn request_failed(method: &Method, url: &Url, error: &reqwest::Error) -> RestError {
    tracing::warn!(
        code = REST_REQUEST_FAILED,
        method = %method,
        path = url.path(),
        error = %error,
        "backend request failed"
    );
    RestError::Unavailable
}

fn status_rejected(method: &Method, url: &Url, status: StatusCode) -> RestError {
    tracing::warn!(
        code = REST_STATUS_REJECTED,
        method = %method,
        path = url.path(),
        status = status.as_u16(),
        "backend rejected request"
    );
    classify_status(status).unwrap_or(RestError::Unavailable)
}

fn decision_segment(decision: RequirementDecision) -> &'static str {
    match decision {
        RequirementDecision::Accept => "accept",
        RequirementDecision::Reject => "reject",
    }
}

fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let base = Url::parse(raw.trim()).map_err(|error| AppError::InvalidBackendUrl {
        url: raw.to_owned(),
        details: error.to_string(),
    })?;

    if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
        return Err(AppError::InvalidBackendUrl {
            url: raw.to_owned(),
            details: "expected an http(s) base url".to_owned(),
        });
    }

    Ok(base)
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn bearer_token(cookie: &str) -> Option<String> {
    cookie
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == TOKEN_COOKIE)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn classify_status(status: StatusCode) -> Option<RestError> {
    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RestError::Unauthorized,
        StatusCode::NOT_FOUND => RestError::NotFound,
        _ => RestError::Unavailable,
    })
}
