pub mod engine;
pub mod states;

pub use engine::{PipelineDefinition, PipelineEngine, PipelineTransitionError, QueryPipeline};
pub use states::{
    PipelineAction, PipelineContext, PipelineEvent, PipelineState, TransitionOutcome,
};
