use chrono::{DateTime, Utc};
use serde_json::Value;

use super::normalize::{first_id, first_string, first_timestamp, resolve_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequirementStatus {
    /// Unknown or missing statuses read as pending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("accepted") => Self::Accepted,
            Some("rejected") => Self::Rejected,
            _ => Self::Pending,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementDecision {
    Accept,
    Reject,
}

/// A client's project request addressed to developers.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub charges: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: RequirementStatus,
    pub client_id: String,
    pub client_name: Option<String>,
    pub developer_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Requirement {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        !self.client_id.is_empty() && self.client_id == user_id
    }
}

/// `client` and `developer` arrive either populated or as bare references.
pub fn normalize_requirement(raw: &Value) -> Requirement {
    let client = raw.get("client");
    let developer = Some(resolve_id(raw.get("developer"))).filter(|id| !id.is_empty());

    Requirement {
        id: first_id(raw).unwrap_or_default(),
        title: first_string(raw, &["title"]).unwrap_or_default(),
        description: first_string(raw, &["description"]),
        charges: raw.get("charges").and_then(charges_value),
        deadline: first_timestamp(raw, &["deadline"]),
        status: RequirementStatus::parse(raw.get("status").and_then(Value::as_str)),
        client_id: resolve_id(client),
        client_name: client
            .and_then(|client| client.get("name"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        developer_id: developer,
        created_at: first_timestamp(raw, &["createdAt"]),
    }
}

/// Accepts a bare array or `{ "requirements": [...] }`.
pub fn normalize_requirement_list(raw: &Value) -> Option<Vec<Requirement>> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(fields) => fields.get("requirements")?.as_array()?,
        _ => return None,
    };

    Some(items.iter().map(normalize_requirement).collect())
}

fn charges_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
