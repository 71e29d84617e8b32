//! Chat-completions client used for classification fallbacks and answer
//! phrasing.
//!
//! Speaks the OpenAI-compatible `/chat/completions` wire format, which Ollama
//! also serves, so one client covers both configured providers.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use telassist_core::config::LlmConfig;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a concise, friendly telecom customer-support assistant. \
Answer only from the facts you are given and say so when they are not enough.";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, Duration::from_secs(30))
    }

    fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Builds a client for the configured provider, or `None` when the model
    /// is disabled.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>> {
        let Some(base_url) = config.effective_base_url().filter(|_| config.is_enabled()) else {
            return Ok(None);
        };

        let mut client = Self::with_timeout(
            base_url,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_max_retries(config.max_retries);
        client.api_key = config.api_key.clone();
        Ok(Some(client))
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    /// Retries transient statuses up to `max_retries` times with a fixed delay.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: 0.2,
        };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(
                    event_name = "llm.request.retry",
                    attempt,
                    model = %self.model,
                    "retrying completion request after transient error"
                );
                tokio::time::sleep(self.retry_delay).await;
            }

            let mut builder = self.client.post(self.endpoint()).json(&request);
            if let Some(api_key) = &self.api_key {
                builder = builder.bearer_auth(api_key.expose_secret());
            }
            let response = builder.send().await.context("completion request failed")?;

            let status = response.status();
            debug!(event_name = "llm.response.received", status = %status, attempt, "completion response received");

            if status.is_success() {
                let body: ChatResponse =
                    response.json().await.context("failed to parse completion response")?;
                let content = body
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .map(|content| content.trim().to_string())
                    .filter(|content| !content.is_empty())
                    .ok_or_else(|| anyhow!("completion response contained no text"))?;
                return Ok(content);
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(
                    event_name = "llm.response.transient_error",
                    status = %status,
                    body = %body,
                    "transient error, will retry"
                );
                continue;
            }

            return Err(anyhow!("completion API returned {status}: {body}"));
        }

        Err(anyhow!("completion request failed after {} retries", self.max_retries))
    }
}

fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 529)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use telassist_core::config::{AppConfig, LlmProvider};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ChatCompletionsClient, LlmClient};

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        })
    }

    fn client(server: &MockServer) -> ChatCompletionsClient {
        ChatCompletionsClient::new(server.uri(), "test-model")
            .expect("client")
            .with_retry_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn complete_returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  BILLING \n")))
            .mount(&server)
            .await;

        let client = client(&server).with_api_key(SecretString::from("test-key".to_string()));
        let text = client.complete("classify this").await.expect("completion");

        assert_eq!(text, "BILLING");
    }

    #[tokio::test]
    async fn complete_retries_on_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("after retry")))
            .mount(&server)
            .await;

        let text = client(&server).complete("hello").await.expect("completion after retry");
        assert_eq!(text, "after retry");
    }

    #[tokio::test]
    async fn complete_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let error = client(&server)
            .with_max_retries(1)
            .complete("hello")
            .await
            .expect_err("persistent 503 should fail");

        assert!(error.to_string().contains("503"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let error = client(&server).complete("hello").await.expect_err("401 should fail");
        assert!(error.to_string().contains("401"));
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&server)
            .await;

        assert!(client(&server).complete("hello").await.is_err());
    }

    #[test]
    fn disabled_provider_builds_no_client() {
        let config = AppConfig::default();
        assert!(ChatCompletionsClient::from_config(&config.llm).expect("config").is_none());

        let mut ollama = config.llm.clone();
        ollama.provider = LlmProvider::Ollama;
        ollama.model = "llama3".to_string();
        let client = ChatCompletionsClient::from_config(&ollama)
            .expect("config")
            .expect("ollama client");
        assert_eq!(client.model(), "llama3");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
