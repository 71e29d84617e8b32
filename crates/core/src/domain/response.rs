use serde::{Deserialize, Serialize};

use crate::domain::category::Category;

/// What a handler hands back to the orchestrator. Owned for the duration of
/// one query only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub raw_text: String,
    pub success: bool,
    pub error: Option<String>,
}

impl AgentResult {
    pub fn success(raw_text: impl Into<String>) -> Self {
        Self { raw_text: raw_text.into(), success: true, error: None }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self { raw_text: String::new(), success: false, error: Some(reason.into()) }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_deref().unwrap_or("handler reported failure without a reason"))
        }
    }
}

/// The only artifact returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedResponse {
    pub text: String,
    pub category: Category,
}

#[cfg(test)]
mod tests {
    use super::AgentResult;

    #[test]
    fn failure_reason_is_reported_only_for_failures() {
        assert_eq!(AgentResult::success("ok").failure_reason(), None);
        assert_eq!(AgentResult::failure("db down").failure_reason(), Some("db down"));

        let unexplained = AgentResult { raw_text: String::new(), success: false, error: None };
        assert!(unexplained.failure_reason().is_some());
    }
}
