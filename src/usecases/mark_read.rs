#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadMarkerError {
    Unauthorized,
    Unavailable,
    NotFound,
}

/// Implementations may return before the backend has answered.
pub trait ReadMarker {
    fn mark_read(&self, partner_id: &str) -> Result<(), ReadMarkerError>;
}

impl<T: ReadMarker + ?Sized> ReadMarker for &T {
    fn mark_read(&self, partner_id: &str) -> Result<(), ReadMarkerError> {
        (*self).mark_read(partner_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    Marked,
    /// Nothing to mark: no partner, or the partner is the current user.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkReadError {
    Unauthorized,
    TemporarilyUnavailable,
    PartnerNotFound,
}

/// Marks the conversation with `partner_id` as read for `current_user_id`.
pub fn mark_conversation_read(
    marker: &dyn ReadMarker,
    current_user_id: &str,
    partner_id: &str,
) -> Result<MarkReadOutcome, MarkReadError> {
    let partner_id = partner_id.trim();
    if partner_id.is_empty() || partner_id == current_user_id {
        return Ok(MarkReadOutcome::Skipped);
    }

    marker.mark_read(partner_id).map_err(map_source_error)?;
    Ok(MarkReadOutcome::Marked)
}

fn map_source_error(error: ReadMarkerError) -> MarkReadError {
    match error {
        ReadMarkerError::Unauthorized => MarkReadError::Unauthorized,
        ReadMarkerError::Unavailable => MarkReadError::TemporarilyUnavailable,
        ReadMarkerError::NotFound => MarkReadError::PartnerNotFound,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct StubMarker {
        result: Result<(), ReadMarkerError>,
        captured: RefCell<Vec<String>>,
    }

    impl StubMarker {
        fn with_result(result: Result<(), ReadMarkerError>) -> Self {
            Self {
                result,
                captured: RefCell::new(Vec::new()),
            }
        }
    }

    impl ReadMarker for StubMarker {
        fn mark_read(&self, partner_id: &str) -> Result<(), ReadMarkerError> {
            self.captured.borrow_mut().push(partner_id.to_owned());
            self.result.clone()
        }
    }

    #[test]
    fn skips_own_conversation() {
        let marker = StubMarker::with_result(Ok(()));

        let outcome = mark_conversation_read(&marker, "me", "me").expect("must not fail");

        assert_eq!(outcome, MarkReadOutcome::Skipped);
        assert!(marker.captured.borrow().is_empty());
    }

    #[test]
    fn skips_blank_partner() {
        let marker = StubMarker::with_result(Ok(()));

        let outcome = mark_conversation_read(&marker, "me", " ").expect("must not fail");

        assert_eq!(outcome, MarkReadOutcome::Skipped);
    }

    #[test]
    fn marks_partner_conversation() {
        let marker = StubMarker::with_result(Ok(()));

        let outcome = mark_conversation_read(&marker, "me", "u2").expect("must succeed");

        assert_eq!(outcome, MarkReadOutcome::Marked);
        assert_eq!(marker.captured.borrow().as_slice(), &["u2".to_owned()]);
    }

    #[test]
    fn maps_unavailable_error() {
        let marker = StubMarker::with_result(Err(ReadMarkerError::Unavailable));

        let err = mark_conversation_read(&marker, "me", "u2").expect_err("must fail");

        assert_eq!(err, MarkReadError::TemporarilyUnavailable);
    }
}
