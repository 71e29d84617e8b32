use std::sync::Arc;

use async_trait::async_trait;
use telassist_core::config::RouterConfig;
use telassist_core::{AgentResult, Query};
use tracing::warn;

use super::{Handler, HandlerContext};
use crate::classifier::is_small_talk;
use crate::llm::LlmClient;

const JOKE_TOPICS: [&str; 7] = ["plan", "billing", "network", "signal", "service", "phone", "data"];

const SAFE_JOKES: [&str; 4] = [
    "Why don't secrets last in telecom? Because they always get leaked through the network!",
    "Why did the mobile plan go to therapy? It had too many unresolved issues!",
    "Why was the cell tower so calm? It had great reception!",
    "Why did the customer bring a ladder to the network test? To get better coverage!",
];

/// Catch-all for blank, unrecognized and small-talk queries. Never fails.
#[derive(Clone)]
pub struct FallbackHandler {
    empty_input_message: String,
    unrecognized_message: String,
    model: Option<Arc<dyn LlmClient>>,
}

impl FallbackHandler {
    pub fn new(
        empty_input_message: impl Into<String>,
        unrecognized_message: impl Into<String>,
    ) -> Self {
        Self {
            empty_input_message: empty_input_message.into(),
            unrecognized_message: unrecognized_message.into(),
            model: None,
        }
    }

    pub fn from_config(router: &RouterConfig) -> Self {
        Self::new(router.empty_input_message.clone(), router.unrecognized_message.clone())
    }

    pub fn with_model(mut self, model: Arc<dyn LlmClient>) -> Self {
        self.model = Some(model);
        self
    }

    async fn joke(&self, query: &Query) -> String {
        let topic = joke_topic(&query.text);
        let Some(model) = &self.model else {
            return safe_joke(topic, &query.text).to_string();
        };

        let prompt = format!(
            "You are a friendly assistant. Provide one concise, family-friendly joke \
             (1-2 sentences) related to telecom. If a topic is given, work it in naturally. \
             Reply with the joke only.\n\nTopic: {}\n\nJoke:",
            topic.unwrap_or("")
        );
        match model.complete(&prompt).await {
            Ok(joke) if !joke.trim().is_empty() => joke.trim().to_string(),
            Ok(_) => safe_joke(topic, &query.text).to_string(),
            Err(error) => {
                warn!(
                    event_name = "handler.model.failed",
                    handler = "fallback",
                    error = %error,
                    "model joke failed, using a stock joke"
                );
                safe_joke(topic, &query.text).to_string()
            }
        }
    }
}

impl Default for FallbackHandler {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

#[async_trait]
impl Handler for FallbackHandler {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn handle(&self, query: &Query, _context: &HandlerContext<'_>) -> AgentResult {
        if query.is_blank() {
            AgentResult::success(self.empty_input_message.clone())
        } else if is_small_talk(&query.text) {
            AgentResult::success(self.joke(query).await)
        } else {
            AgentResult::success(self.unrecognized_message.clone())
        }
    }
}

fn joke_topic(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    JOKE_TOPICS.iter().copied().find(|topic| lowered.contains(topic))
}

/// A stock joke mentioning `topic` when one does, otherwise one picked from
/// the text so the same request always gets the same joke.
fn safe_joke(topic: Option<&str>, text: &str) -> &'static str {
    topic
        .and_then(|topic| SAFE_JOKES.iter().copied().find(|joke| joke.to_lowercase().contains(topic)))
        .unwrap_or_else(|| SAFE_JOKES[text.chars().count() % SAFE_JOKES.len()])
}
