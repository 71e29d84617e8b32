use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::query::{QueryId, SessionId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Ingress,
    Pipeline,
    Classification,
    Handler,
    Session,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub query_id: Option<QueryId>,
    pub session_id: Option<SessionId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        query_id: Option<QueryId>,
        session_id: Option<SessionId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { query_id, session_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(
            self.query_id.clone(),
            self.session_id.clone(),
            self.correlation_id.clone(),
            event_type,
            category,
            self.actor.clone(),
            outcome,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub query_id: Option<QueryId>,
    pub session_id: Option<SessionId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        query_id: Option<QueryId>,
        session_id: Option<SessionId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            query_id,
            session_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_for(&self, query_id: &QueryId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.query_id.as_ref() == Some(query_id))
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{
        AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    };
    use crate::domain::query::{QueryId, SessionId};

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                Some(QueryId("q-0042".to_owned())),
                Some(SessionId::new("session-1")),
                "q-0042",
                "pipeline.transition_applied",
                AuditCategory::Pipeline,
                "customer",
                AuditOutcome::Success,
            )
            .with_metadata("from", "received")
            .with_metadata("to", "classified"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "q-0042");
        assert_eq!(events[0].session_id.as_ref().map(|id| id.0.as_str()), Some("session-1"));
        assert!(events[0].metadata.contains_key("from"));
    }

    #[test]
    fn events_for_filters_by_query() {
        let sink = InMemoryAuditSink::default();
        let first = AuditContext::new(Some(QueryId("a".to_owned())), None, "a", "admin");
        let second = AuditContext::new(Some(QueryId("b".to_owned())), None, "b", "admin");
        sink.emit(first.event("query.received", AuditCategory::Ingress, AuditOutcome::Success));
        sink.emit(second.event("query.received", AuditCategory::Ingress, AuditOutcome::Success));
        sink.emit(first.event("handler.failed", AuditCategory::Handler, AuditOutcome::Failed));

        assert_eq!(sink.events_for(&QueryId("a".to_owned())).len(), 2);
        assert_eq!(sink.events_for(&QueryId("b".to_owned())).len(), 1);
    }
}
