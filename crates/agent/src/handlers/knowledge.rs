use std::sync::Arc;

use async_trait::async_trait;
use telassist_core::lookup::KnowledgeSearch;
use telassist_core::{AgentResult, Query};
use tracing::debug;

use super::{phrase_with_model, prompt_with_context, render_passages, Handler, HandlerContext};
use crate::llm::LlmClient;

const NOTHING_FOUND: &str = "I couldn't find anything in our documentation about that. \
Could you rephrase your question, or ask about billing, network issues, or service plans?";

const INSTRUCTIONS: &str = "Answer the customer's question using only the documentation \
excerpts below. Name the document you relied on. If the excerpts do not answer the question, \
say so.";

pub struct KnowledgeHandler {
    knowledge: Arc<dyn KnowledgeSearch>,
    model: Option<Arc<dyn LlmClient>>,
    passage_limit: usize,
}

impl KnowledgeHandler {
    pub fn new(knowledge: Arc<dyn KnowledgeSearch>, passage_limit: usize) -> Self {
        Self { knowledge, model: None, passage_limit }
    }

    pub fn with_model(mut self, model: Arc<dyn LlmClient>) -> Self {
        self.model = Some(model);
        self
    }
}

#[async_trait]
impl Handler for KnowledgeHandler {
    fn name(&self) -> &'static str {
        "knowledge"
    }

    async fn handle(&self, query: &Query, context: &HandlerContext<'_>) -> AgentResult {
        let passages = match self.knowledge.search(&query.text, self.passage_limit).await {
            Ok(passages) => passages,
            Err(error) => return AgentResult::failure(format!("knowledge search failed: {error}")),
        };
        debug!(
            event_name = "handler.knowledge.searched",
            correlation_id = %query.id,
            passages = passages.len(),
            top_score = passages.first().map(|passage| passage.score).unwrap_or_default(),
            "knowledge search completed"
        );

        if passages.is_empty() {
            return AgentResult::success(NOTHING_FOUND);
        }

        let facts = format!("Here's what I found in our documentation:\n\n{}", render_passages(&passages));
        let prompt = prompt_with_context(INSTRUCTIONS, &facts, context, &query.text);
        AgentResult::success(
            phrase_with_model(self.model.as_ref(), self.name(), prompt, facts).await,
        )
    }
}
