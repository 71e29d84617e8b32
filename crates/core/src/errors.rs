use thiserror::Error;

use crate::domain::category::Category;
use crate::flows::PipelineTransitionError;
use crate::lookup::LookupError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    PipelineTransition(#[from] PipelineTransitionError),
    #[error("query text exceeds {limit} characters")]
    QueryTooLong { limit: usize },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("no handler registered for {}", format_categories(.missing))]
    RoutingMisconfiguration { missing: Vec<Category> },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<LookupError> for ApplicationError {
    fn from(value: LookupError) -> Self {
        Self::Persistence(value.to_string())
    }
}

fn format_categories(categories: &[Category]) -> String {
    categories.iter().map(Category::label).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::QueryTooLong { limit }) => Self::BadRequest {
                message: format!("query text exceeds {limit} characters"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(DomainError::PipelineTransition(_))
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            error @ ApplicationError::RoutingMisconfiguration { .. } => Self::Internal {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
