//! Query routing for the telecom support assistant.
//!
//! A query moves through a fixed pipeline owned by [`Orchestrator`]:
//!
//! 1. **Classification** (`classifier`): keyword rules, then an optional
//!    model call, pick one [`telassist_core::Category`].
//! 2. **Routing** (`registry`): the category resolves to exactly one handler.
//! 3. **Handling** (`handlers`): billing, network, service, knowledge and
//!    fallback strategies read account, incident and documentation data.
//! 4. **Sanitizing** (`sanitizer`): model and markdown artifacts are
//!    stripped and the text is capped before anything reaches the customer.
//!
//! The model is only ever a phrasing aid. Every handler can answer from the
//! records alone, and any handler failure ends in the configured fallback
//! message rather than an error.

pub mod audit;
pub mod classifier;
pub mod handlers;
pub mod llm;
pub mod orchestrator;
pub mod registry;
pub mod sanitizer;
pub mod session;

pub use classifier::{Classification, ClassificationMethod, Classifier};
pub use handlers::{Handler, HandlerContext, SupportServices};
pub use llm::{ChatCompletionsClient, LlmClient};
pub use orchestrator::{Orchestrator, OrchestratorSettings, QueryOutcome};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder, RouteDecision};
pub use sanitizer::ResponseSanitizer;
pub use session::SessionStore;
