//! Core domain for the telecom support router.
//!
//! Holds the types every other crate agrees on: queries and categories, the
//! pipeline state machine the orchestrator walks through, audit events,
//! configuration, the error taxonomy, and the collaborator traits handlers use
//! to reach account, network and knowledge data.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod lookup;

pub use domain::category::Category;
pub use domain::conversation::{ConversationState, ConversationTurn};
pub use domain::query::{CustomerId, Query, QueryId, Role, SessionId};
pub use domain::response::{AgentResult, SanitizedResponse};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{PipelineEngine, PipelineEvent, PipelineState, TransitionOutcome};
pub use lookup::{AccountLookup, KnowledgeSearch, LookupError, NetworkStatusLookup};
