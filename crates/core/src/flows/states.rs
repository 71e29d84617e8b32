use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Received,
    Classified,
    Routed,
    Handled,
    Errored,
    Sanitized,
    Delivered,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Routed => "routed",
            Self::Handled => "handled",
            Self::Errored => "errored",
            Self::Sanitized => "sanitized",
            Self::Delivered => "delivered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    QueryClassified,
    HandlerResolved,
    HandlerSucceeded,
    HandlerFailed,
    PipelineFaulted,
    ResponseSanitized,
    ResponseDelivered,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineContext {
    pub fallback_substituted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineAction {
    ResolveHandler,
    InvokeHandler,
    SanitizeHandlerOutput,
    SubstituteFallback,
    DeliverResponse,
    RecordConversationTurn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PipelineState,
    pub to: PipelineState,
    pub event: PipelineEvent,
    pub actions: Vec<PipelineAction>,
}
