use serde_json::Value;

use crate::domain::requirement::{normalize_requirement_list, Requirement, RequirementDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementsSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
    NotFound,
}

pub trait RequirementsSource {
    fn list_requirements(&self) -> Result<Value, RequirementsSourceError>;

    /// Returns the backend's `{ success, message }` reply.
    fn decide_requirement(
        &self,
        id: &str,
        decision: RequirementDecision,
    ) -> Result<Value, RequirementsSourceError>;
}

impl<T: RequirementsSource + ?Sized> RequirementsSource for &T {
    fn list_requirements(&self) -> Result<Value, RequirementsSourceError> {
        (*self).list_requirements()
    }

    fn decide_requirement(
        &self,
        id: &str,
        decision: RequirementDecision,
    ) -> Result<Value, RequirementsSourceError> {
        (*self).decide_requirement(id, decision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementsError {
    MissingId,
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
    NotFound,
    /// The backend answered `success: false`.
    Refused(String),
}

impl RequirementsError {
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingId => "Requirement id is required.".to_owned(),
            Self::Unauthorized => "Session expired. Please sign in again.".to_owned(),
            Self::TemporarilyUnavailable => "Could not reach the marketplace backend.".to_owned(),
            Self::DataContractViolation => "The server returned unreadable requirements.".to_owned(),
            Self::NotFound => "Requirement not found.".to_owned(),
            Self::Refused(message) => message.clone(),
        }
    }
}

/// Lists requirements; `owner_id` keeps only those posted by that client.
pub fn list_requirements(
    source: &dyn RequirementsSource,
    owner_id: Option<&str>,
) -> Result<Vec<Requirement>, RequirementsError> {
    let raw = source.list_requirements().map_err(map_source_error)?;
    let requirements =
        normalize_requirement_list(&raw).ok_or(RequirementsError::DataContractViolation)?;

    Ok(match owner_id {
        Some(owner_id) => requirements
            .into_iter()
            .filter(|requirement| requirement.is_owned_by(owner_id))
            .collect(),
        None => requirements,
    })
}

/// Accepts or rejects a requirement and returns the backend's confirmation.
pub fn decide_requirement(
    source: &dyn RequirementsSource,
    id: &str,
    decision: RequirementDecision,
) -> Result<String, RequirementsError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(RequirementsError::MissingId);
    }

    let reply = source
        .decide_requirement(id, decision)
        .map_err(map_source_error)?;
    let message = reply
        .get("message")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);

    if reply.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(RequirementsError::Refused(
            message.unwrap_or_else(|| "The backend refused the change.".to_owned()),
        ));
    }

    Ok(message.unwrap_or_else(|| match decision {
        RequirementDecision::Accept => "Requirement accepted.".to_owned(),
        RequirementDecision::Reject => "Requirement rejected.".to_owned(),
    }))
}

fn map_source_error(error: RequirementsSourceError) -> RequirementsError {
    match error {
        RequirementsSourceError::Unauthorized => RequirementsError::Unauthorized,
        RequirementsSourceError::Unavailable => RequirementsError::TemporarilyUnavailable,
        RequirementsSourceError::InvalidData => RequirementsError::DataContractViolation,
        RequirementsSourceError::NotFound => RequirementsError::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;

    struct StubSource {
        list: Result<Value, RequirementsSourceError>,
        reply: Result<Value, RequirementsSourceError>,
        decided: RefCell<Vec<(String, RequirementDecision)>>,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                list: Ok(json!([
                    { "_id": "r1", "title": "Shop", "client": { "_id": "me", "name": "Me" } },
                    { "_id": "r2", "title": "Blog", "client": "someone" },
                ])),
                reply: Ok(json!({ "success": true, "message": "Requirement accepted successfully" })),
                decided: RefCell::new(Vec::new()),
            }
        }
    }

    impl RequirementsSource for StubSource {
        fn list_requirements(&self) -> Result<Value, RequirementsSourceError> {
            self.list.clone()
        }

        fn decide_requirement(
            &self,
            id: &str,
            decision: RequirementDecision,
        ) -> Result<Value, RequirementsSourceError> {
            self.decided.borrow_mut().push((id.to_owned(), decision));
            self.reply.clone()
        }
    }

    #[test]
    fn lists_all_or_only_own_requirements() {
        let source = StubSource::new();

        let all = list_requirements(&source, None).expect("must list");
        let mine = list_requirements(&source, Some("me")).expect("must list");

        assert_eq!(all.len(), 2);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "r1");
    }

    #[test]
    fn unreadable_list_is_a_contract_violation() {
        let mut source = StubSource::new();
        source.list = Ok(json!({ "error": "boom" }));

        let err = list_requirements(&source, None).expect_err("must fail");

        assert_eq!(err, RequirementsError::DataContractViolation);
    }

    #[test]
    fn decision_returns_backend_message() {
        let source = StubSource::new();

        let message = decide_requirement(&source, " r1 ", RequirementDecision::Accept)
            .expect("must succeed");

        assert_eq!(message, "Requirement accepted successfully");
        assert_eq!(
            source.decided.borrow().as_slice(),
            &[("r1".to_owned(), RequirementDecision::Accept)]
        );
    }

    #[test]
    fn refused_decision_surfaces_message() {
        let mut source = StubSource::new();
        source.reply = Ok(json!({ "success": false, "message": "Already rejected" }));

        let err = decide_requirement(&source, "r1", RequirementDecision::Reject)
            .expect_err("must fail");

        assert_eq!(err, RequirementsError::Refused("Already rejected".to_owned()));
    }

    #[test]
    fn blank_id_never_reaches_backend() {
        let source = StubSource::new();

        let err = decide_requirement(&source, "  ", RequirementDecision::Accept)
            .expect_err("must fail");

        assert_eq!(err, RequirementsError::MissingId);
        assert!(source.decided.borrow().is_empty());
    }

    #[test]
    fn maps_not_found() {
        let mut source = StubSource::new();
        source.reply = Err(RequirementsSourceError::NotFound);

        let err = decide_requirement(&source, "r9", RequirementDecision::Accept)
            .expect_err("must fail");

        assert_eq!(err, RequirementsError::NotFound);
    }
}
