use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use telassist_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use telassist_core::config::{AppConfig, RouterConfig};
use telassist_core::flows::{PipelineContext, QueryPipeline};
use telassist_core::{
    AgentResult, ApplicationError, Category, ConversationState, DomainError, PipelineEngine,
    PipelineEvent, PipelineState, Query, QueryId, Role, SanitizedResponse, SessionId,
    TransitionOutcome,
};
use tracing::{debug, info, warn};

use crate::audit::TracingAuditSink;
use crate::classifier::{Classification, ClassificationMethod, Classifier};
use crate::handlers::{HandlerContext, SupportServices};
use crate::llm::{ChatCompletionsClient, LlmClient};
use crate::registry::{HandlerRegistry, RouteDecision};
use crate::sanitizer::ResponseSanitizer;
use crate::session::SessionStore;

/// Prior turns shown to handlers that build model prompts.
const PROMPT_TURNS: usize = 6;

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub fallback_message: String,
    pub handler_timeout: Duration,
    pub history_limit: usize,
    pub max_query_chars: usize,
    pub max_sessions: usize,
    /// `None` keeps idle sessions until they are ended or evicted for space.
    pub session_idle: Option<Duration>,
}

impl OrchestratorSettings {
    pub fn from_config(router: &RouterConfig) -> Self {
        Self {
            fallback_message: router.fallback_message.clone(),
            handler_timeout: Duration::from_secs(router.handler_timeout_secs),
            history_limit: router.history_limit,
            max_query_chars: router.max_query_chars,
            max_sessions: router.max_sessions,
            session_idle: (router.session_idle_secs > 0)
                .then(|| Duration::from_secs(router.session_idle_secs)),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Everything observable about one pass through the pipeline.
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    pub query_id: QueryId,
    pub session_id: SessionId,
    pub response: SanitizedResponse,
    /// `None` when the query was rejected before classification.
    pub classification: Classification,
    pub handler: Option<&'static str>,
    pub final_state: PipelineState,
    pub trace: Vec<TransitionOutcome>,
    /// Why the fallback message was substituted, if it was.
    pub failure: Option<String>,
}

impl QueryOutcome {
    /// States in the order the query passed through them, starting at `Received`.
    pub fn visited(&self) -> Vec<PipelineState> {
        let mut states = vec![PipelineState::Received];
        states.extend(self.trace.iter().map(|step| step.to));
        states
    }

    pub fn used_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Drives every query through classify → route → handle → sanitize →
/// deliver, and owns the per-session histories.
///
/// `submit` never fails: handler errors, panics, timeouts and rejected
/// transitions all end in the configured fallback message.
pub struct Orchestrator {
    classifier: Classifier,
    registry: HandlerRegistry,
    sanitizer: ResponseSanitizer,
    engine: PipelineEngine<QueryPipeline>,
    sessions: SessionStore,
    audit: Arc<dyn AuditSink>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        classifier: Classifier,
        registry: HandlerRegistry,
        sanitizer: ResponseSanitizer,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            classifier,
            registry,
            sanitizer,
            engine: PipelineEngine::default(),
            sessions: SessionStore::new(settings.max_sessions, settings.session_idle),
            audit: Arc::new(TracingAuditSink),
            settings,
        }
    }

    /// Production wiring: builds the model client when one is configured and
    /// registers the standard handler for every category.
    pub fn from_config(
        config: &AppConfig,
        services: SupportServices,
    ) -> Result<Self, ApplicationError> {
        let model = ChatCompletionsClient::from_config(&config.llm)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?
            .map(|client| Arc::new(client) as Arc<dyn LlmClient>);
        Self::assemble(config, services, model)
    }

    pub fn assemble(
        config: &AppConfig,
        services: SupportServices,
        model: Option<Arc<dyn LlmClient>>,
    ) -> Result<Self, ApplicationError> {
        let classifier = match &model {
            Some(model) if config.router.model_classification => {
                Classifier::with_model(model.clone())
            }
            _ => Classifier::keyword_only(),
        };
        let registry = HandlerRegistry::for_support(&services, &config.router, model)?;

        Ok(Self::new(
            classifier,
            registry,
            ResponseSanitizer::from_config(&config.router),
            OrchestratorSettings::from_config(&config.router),
        ))
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Boundary check for callers that want to reject oversized input
    /// before submitting it.
    pub fn validate_text(&self, text: &str) -> Result<(), DomainError> {
        if text.chars().count() > self.settings.max_query_chars {
            return Err(DomainError::QueryTooLong { limit: self.settings.max_query_chars });
        }
        Ok(())
    }

    pub async fn submit_query(
        &self,
        text: impl Into<String>,
        session_id: SessionId,
        role: Role,
    ) -> SanitizedResponse {
        self.submit(Query::new(text, session_id, role)).await.response
    }

    pub async fn submit(&self, query: Query) -> QueryOutcome {
        let started = Instant::now();
        let audit = AuditContext::new(
            Some(query.id.clone()),
            Some(query.session_id.clone()),
            query.id.0.clone(),
            query.role.as_str(),
        );
        self.audit.emit(
            audit
                .event("query.received", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("chars", query.text.chars().count().to_string()),
        );

        let mut conversation = self.sessions.lock(&query.session_id).await;
        let mut run = PipelineRun::new(&self.engine, self.audit.as_ref(), &audit);

        let oversized = self.validate_text(&query.text).is_err();
        let classification = if oversized {
            Classification::new(Category::Fallback, ClassificationMethod::Oversized)
        } else {
            self.classifier.classify(&query.text).await
        };
        self.audit.emit(
            audit
                .event("query.classified", AuditCategory::Classification, AuditOutcome::Success)
                .with_metadata("category", classification.category.as_str())
                .with_metadata("method", classification.method.as_str())
                .with_metadata("matched", matched_labels(&classification)),
        );

        let answer = if oversized {
            Err(Failure::unrouted(format!(
                "query text exceeds {} characters",
                self.settings.max_query_chars
            )))
        } else {
            self.answer(&query, &classification, &conversation, &audit, &mut run).await
        };

        let (response, handler, failure) = match answer {
            Ok((response, handler)) => (response, Some(handler), None),
            Err(failure) => {
                warn!(
                    event_name = "orchestrator.fallback.substituted",
                    correlation_id = %query.id,
                    session_id = %query.session_id,
                    reason = %failure.reason,
                    "substituting fallback response"
                );
                run.ensure_errored();
                run.substitute_fallback();
                let response =
                    SanitizedResponse { text: self.fallback_text(), category: Category::Fallback };
                (response, failure.handler, Some(failure.reason))
            }
        };

        let delivered = run
            .advance(PipelineEvent::ResponseSanitized)
            .and_then(|()| run.advance(PipelineEvent::ResponseDelivered));
        match delivered {
            Ok(()) => conversation.record(
                query.clone(),
                response.clone(),
                self.settings.history_limit,
            ),
            Err(reason) => warn!(
                event_name = "orchestrator.delivery.rejected",
                correlation_id = %query.id,
                reason = %reason,
                "response not recorded in conversation history"
            ),
        }
        drop(conversation);

        info!(
            event_name = "orchestrator.query.completed",
            correlation_id = %query.id,
            session_id = %query.session_id,
            category = response.category.as_str(),
            handler = handler.unwrap_or("none"),
            final_state = run.state.as_str(),
            fallback = failure.is_some(),
            latency_ms = started.elapsed().as_millis() as u64,
            "query answered"
        );

        QueryOutcome {
            query_id: query.id,
            session_id: query.session_id,
            response,
            classification,
            handler,
            final_state: run.state,
            trace: run.trace,
            failure,
        }
    }

    /// Copy of a session's history, oldest turn first.
    pub async fn history(&self, session_id: &SessionId) -> Option<ConversationState> {
        self.sessions.snapshot(session_id).await
    }

    /// Forgets a session. Returns whether it existed.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        let existed = self.sessions.end(session_id);
        self.audit.emit(
            AuditContext::new(None, Some(session_id.clone()), session_id.0.clone(), "system")
                .event("session.ended", AuditCategory::Session, AuditOutcome::Success)
                .with_metadata("existed", existed.to_string()),
        );
        existed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    async fn answer(
        &self,
        query: &Query,
        classification: &Classification,
        conversation: &ConversationState,
        audit: &AuditContext,
        run: &mut PipelineRun<'_>,
    ) -> Result<(SanitizedResponse, &'static str), Failure> {
        run.advance(PipelineEvent::QueryClassified).map_err(Failure::unrouted)?;
        let route = self.registry.resolve(classification.category);
        let handler = route.handler_name();
        run.advance(PipelineEvent::HandlerResolved).map_err(Failure::unrouted)?;

        let result =
            self.invoke(&route, query, &HandlerContext::new(conversation, PROMPT_TURNS)).await;
        if !result.success {
            let reason = result.failure_reason().unwrap_or("handler failed").to_string();
            self.audit.emit(
                audit
                    .event("handler.failed", AuditCategory::Handler, AuditOutcome::Failed)
                    .with_metadata("handler", handler)
                    .with_metadata("reason", reason.clone()),
            );
            run.advance(PipelineEvent::HandlerFailed)
                .map_err(|reason| Failure::routed(handler, reason))?;
            return Err(Failure::routed(handler, reason));
        }

        self.audit.emit(
            audit
                .event("handler.completed", AuditCategory::Handler, AuditOutcome::Success)
                .with_metadata("handler", handler),
        );
        run.advance(PipelineEvent::HandlerSucceeded)
            .map_err(|reason| Failure::routed(handler, reason))?;

        let text = self.sanitizer.sanitize(&result.raw_text);
        debug!(
            event_name = "orchestrator.response.sanitized",
            correlation_id = %query.id,
            raw_chars = result.raw_text.chars().count(),
            sanitized_chars = text.chars().count(),
            "handler output sanitized"
        );
        if text.is_empty() {
            return Err(Failure::routed(handler, "handler response was empty after sanitizing"));
        }

        Ok((SanitizedResponse { text, category: route.category }, handler))
    }

    /// Runs the handler with a deadline, turning panics and timeouts into
    /// ordinary failures.
    async fn invoke(
        &self,
        route: &RouteDecision,
        query: &Query,
        context: &HandlerContext<'_>,
    ) -> AgentResult {
        let call = AssertUnwindSafe(route.handler.handle(query, context)).catch_unwind();
        match tokio::time::timeout(self.settings.handler_timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => AgentResult::failure(format!(
                "{} handler panicked: {}",
                route.handler_name(),
                panic_message(&*payload)
            )),
            Err(_) => AgentResult::failure(format!(
                "{} handler timed out after {} ms",
                route.handler_name(),
                self.settings.handler_timeout.as_millis()
            )),
        }
    }

    fn fallback_text(&self) -> String {
        let text = self.sanitizer.sanitize(&self.settings.fallback_message);
        if text.is_empty() {
            self.settings.fallback_message.clone()
        } else {
            text
        }
    }
}

struct Failure {
    handler: Option<&'static str>,
    reason: String,
}

impl Failure {
    fn unrouted(reason: impl Into<String>) -> Self {
        Self { handler: None, reason: reason.into() }
    }

    fn routed(handler: &'static str, reason: impl Into<String>) -> Self {
        Self { handler: Some(handler), reason: reason.into() }
    }
}

/// State of one query's walk through the pipeline, with every accepted
/// transition kept for the outcome trace.
struct PipelineRun<'a> {
    engine: &'a PipelineEngine<QueryPipeline>,
    sink: &'a dyn AuditSink,
    audit: &'a AuditContext,
    state: PipelineState,
    context: PipelineContext,
    trace: Vec<TransitionOutcome>,
}

impl<'a> PipelineRun<'a> {
    fn new(
        engine: &'a PipelineEngine<QueryPipeline>,
        sink: &'a dyn AuditSink,
        audit: &'a AuditContext,
    ) -> Self {
        Self {
            engine,
            sink,
            audit,
            state: engine.initial_state(),
            context: PipelineContext::default(),
            trace: Vec::new(),
        }
    }

    fn advance(&mut self, event: PipelineEvent) -> Result<(), String> {
        let outcome = self
            .engine
            .apply_with_audit(&self.state, &event, &self.context, self.sink, self.audit)
            .map_err(|error| error.to_string())?;
        self.state = outcome.to;
        self.trace.push(outcome);
        Ok(())
    }

    fn ensure_errored(&mut self) {
        if self.state == PipelineState::Errored {
            return;
        }
        if let Err(reason) = self.advance(PipelineEvent::PipelineFaulted) {
            warn!(
                event_name = "orchestrator.fault.rejected",
                correlation_id = %self.audit.correlation_id,
                state = self.state.as_str(),
                reason = %reason,
                "pipeline could not enter errored state"
            );
        }
    }

    fn substitute_fallback(&mut self) {
        self.context.fallback_substituted = true;
    }
}

fn matched_labels(classification: &Classification) -> String {
    classification.matched.iter().map(Category::label).collect::<Vec<_>>().join(",")
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use telassist_core::audit::InMemoryAuditSink;
    use telassist_core::config::AppConfig;
    use telassist_core::{Category, DomainError, PipelineState, Query, Role, SessionId};

    use super::{Orchestrator, OrchestratorSettings};
    use crate::classifier::{ClassificationMethod, Classifier};
    use crate::handlers::testing::{seeded_accounts, seeded_knowledge, seeded_network, services};
    use crate::registry::HandlerRegistry;
    use crate::sanitizer::ResponseSanitizer;

    fn orchestrator() -> Orchestrator {
        Orchestrator::assemble(
            &AppConfig::default(),
            services(seeded_accounts(), seeded_network(), seeded_knowledge()),
            None,
        )
        .expect("standard registry builds")
    }

    #[test]
    fn validate_text_enforces_the_query_limit() {
        let config = AppConfig::default();
        let services = services(seeded_accounts(), seeded_network(), seeded_knowledge());
        let registry = HandlerRegistry::for_support(&services, &config.router, None)
            .expect("standard registry builds");
        let orchestrator = Orchestrator::new(
            Classifier::keyword_only(),
            registry,
            ResponseSanitizer::new(200),
            OrchestratorSettings { max_query_chars: 5, ..OrchestratorSettings::default() },
        );

        assert!(orchestrator.validate_text("hello").is_ok());
        assert_eq!(
            orchestrator.validate_text("hello!"),
            Err(DomainError::QueryTooLong { limit: 5 })
        );
    }

    #[tokio::test]
    async fn oversized_query_is_answered_with_fallback() {
        let orchestrator = orchestrator();
        let text = "bill ".repeat(2_000);

        let outcome = orchestrator
            .submit(Query::new(text, SessionId::new("long"), Role::Customer))
            .await;

        assert_eq!(outcome.classification.category, Category::Fallback);
        assert_eq!(outcome.classification.method, ClassificationMethod::Oversized);
        assert_eq!(outcome.response.category, Category::Fallback);
        assert_eq!(outcome.final_state, PipelineState::Delivered);
        assert!(outcome.failure.is_some_and(|reason| reason.contains("exceeds")));
    }

    #[tokio::test]
    async fn history_and_end_session_track_the_store() {
        let sink = InMemoryAuditSink::default();
        let orchestrator = orchestrator().with_audit(Arc::new(sink.clone()));
        let session = SessionId::new("s-9");

        orchestrator.submit_query("What is VoLTE?", session.clone(), Role::Customer).await;
        assert_eq!(orchestrator.history(&session).await.map(|state| state.len()), Some(1));
        assert_eq!(orchestrator.active_sessions(), 1);

        assert!(orchestrator.end_session(&session));
        assert!(orchestrator.history(&session).await.is_none());
        assert!(sink.events().iter().any(|event| event.event_type == "session.ended"));
    }

    #[tokio::test]
    async fn configured_session_cap_bounds_the_store() {
        let mut config = AppConfig::default();
        config.router.max_sessions = 2;
        let orchestrator = Orchestrator::assemble(
            &config,
            services(seeded_accounts(), seeded_network(), seeded_knowledge()),
            None,
        )
        .expect("standard registry builds");

        for index in 0..5 {
            let session = SessionId::new(format!("visitor-{index}"));
            orchestrator.submit_query("What is VoLTE?", session, Role::Customer).await;
        }

        assert_eq!(orchestrator.active_sessions(), 2);
        assert!(orchestrator.history(&SessionId::new("visitor-4")).await.is_some());
    }
}
