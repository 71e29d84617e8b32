use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    PipelineAction, PipelineContext, PipelineEvent, PipelineState, TransitionOutcome,
};

pub trait PipelineDefinition {
    fn name(&self) -> &'static str;
    fn initial_state(&self) -> PipelineState;
    fn transition(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError>;
}

/// The single-query routing pipeline.
#[derive(Clone, Debug, Default)]
pub struct QueryPipeline;

impl PipelineDefinition for QueryPipeline {
    fn name(&self) -> &'static str {
        "query_routing"
    }

    fn initial_state(&self) -> PipelineState {
        PipelineState::Received
    }

    fn transition(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError> {
        transition_query(current, event, context)
    }
}

#[derive(Clone, Debug)]
pub struct PipelineEngine<F> {
    pipeline: F,
}

impl<F> PipelineEngine<F>
where
    F: PipelineDefinition,
{
    pub fn new(pipeline: F) -> Self {
        Self { pipeline }
    }

    pub fn name(&self) -> &'static str {
        self.pipeline.name()
    }

    pub fn initial_state(&self) -> PipelineState {
        self.pipeline.initial_state()
    }

    pub fn apply(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError> {
        self.pipeline.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    audit
                        .event(
                            "pipeline.transition_applied",
                            AuditCategory::Pipeline,
                            AuditOutcome::Success,
                        )
                        .with_metadata("pipeline", self.name())
                        .with_metadata("from", outcome.from.as_str())
                        .with_metadata("to", outcome.to.as_str())
                        .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event(
                            "pipeline.transition_rejected",
                            AuditCategory::Pipeline,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("pipeline", self.name())
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for PipelineEngine<QueryPipeline> {
    fn default() -> Self {
        Self::new(QueryPipeline)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineTransitionError {
    #[error("fallback text must be substituted before sanitizing from {state:?}")]
    FallbackNotSubstituted { state: PipelineState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PipelineState, event: PipelineEvent },
}

fn transition_query(
    current: &PipelineState,
    event: &PipelineEvent,
    context: &PipelineContext,
) -> Result<TransitionOutcome, PipelineTransitionError> {
    use PipelineAction::{
        DeliverResponse, InvokeHandler, RecordConversationTurn, ResolveHandler,
        SanitizeHandlerOutput, SubstituteFallback,
    };
    use PipelineEvent::{
        HandlerFailed, HandlerResolved, HandlerSucceeded, PipelineFaulted, QueryClassified,
        ResponseDelivered, ResponseSanitized,
    };
    use PipelineState::{Classified, Delivered, Errored, Handled, Received, Routed, Sanitized};

    let (to, actions) = match (current, event) {
        (Received, QueryClassified) => (Classified, vec![ResolveHandler]),
        (Classified, HandlerResolved) => (Routed, vec![InvokeHandler]),
        (Routed, HandlerSucceeded) => (Handled, vec![SanitizeHandlerOutput]),
        (Routed, HandlerFailed) => (Errored, vec![SubstituteFallback]),
        (Handled, ResponseSanitized) => (Sanitized, vec![DeliverResponse]),
        (Errored, ResponseSanitized) => {
            if !context.fallback_substituted {
                return Err(PipelineTransitionError::FallbackNotSubstituted { state: *current });
            }
            (Sanitized, vec![DeliverResponse])
        }
        (Sanitized, ResponseDelivered) => (Delivered, vec![RecordConversationTurn]),
        (Errored, PipelineFaulted) | (Delivered, _) => {
            return Err(PipelineTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
        (_, PipelineFaulted) => (Errored, vec![SubstituteFallback]),
        _ => {
            return Err(PipelineTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
