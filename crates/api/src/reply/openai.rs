//! OpenAI-compatible reply generator
//!
//! Talks to any `/chat/completions` endpoint. Transient failures (timeouts,
//! connection errors, 429 and 5xx) are retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use livechat_shared::{CustomerInfo, Message, MessageSender};

use super::{GeneratedReply, ReplyError, ReplyGenerator, ReplyMeta, ReplyRequest};
use crate::config::ReplyConfig;

/// Maximum number of retry attempts for transient failures
const MAX_RETRIES: usize = 3;

/// Maximum backoff duration between retries
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Reply generator backed by a chat-completions API
#[derive(Clone)]
pub struct OpenAiReplyGenerator {
    client: Client,
    config: ReplyConfig,
    max_retries: usize,
}

impl OpenAiReplyGenerator {
    pub fn new(config: ReplyConfig) -> Result<Self, ReplyError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            max_retries: MAX_RETRIES,
        })
    }

    /// Override the retry budget
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Per-attempt HTTP timeout. The reply budget is split across the first
    /// attempt and every retry so a retry can still finish inside it.
    fn attempt_timeout(&self) -> Duration {
        let attempts = u32::try_from(self.max_retries)
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        self.config.timeout / attempts
    }

    fn system_prompt(&self, customer_info: &CustomerInfo) -> String {
        let mut prompt = self.config.system_prompt.clone();
        if let Some(name) = customer_info.name.as_deref().filter(|n| !n.trim().is_empty()) {
            prompt.push_str(&format!("\n\nCustomer's name is {name}."));
        }
        prompt
    }

    fn build_messages(&self, request: &ReplyRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: self.system_prompt(&request.customer_info),
        });
        messages.extend(request.history.iter().map(history_entry));
        messages.push(ChatMessage {
            role: "user",
            content: request.message.clone(),
        });
        messages
    }

    async fn complete_once(
        &self,
        request: &ReplyRequest,
        api_key: &str,
    ) -> Result<GeneratedReply, ReplyError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: self.build_messages(request),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_url))
            .bearer_auth(api_key)
            .timeout(self.attempt_timeout())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ReplyError::EmptyReply)?;

        Ok(GeneratedReply {
            text,
            render_delay: None,
            meta: ReplyMeta {
                model: Some(completion.model.unwrap_or_else(|| self.config.model.clone())),
                tokens_used: completion.usage.map(|u| u.total_tokens),
            },
        })
    }
}

fn history_entry(message: &Message) -> ChatMessage {
    ChatMessage {
        role: match message.sender {
            MessageSender::Customer => "user",
            MessageSender::Automated | MessageSender::Agent => "assistant",
        },
        content: message.content.clone(),
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    async fn generate(&self, request: ReplyRequest) -> Result<GeneratedReply, ReplyError> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let api_key = self.config.api_key.as_deref().ok_or(ReplyError::NotConfigured)?;

        // 100ms, 200ms, 400ms ... with jitter
        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(50)
            .max_delay(RETRY_MAX_DELAY)
            .map(jitter)
            .take(self.max_retries);

        Retry::spawn(retry_strategy, || async {
            let result = self.complete_once(&request, api_key).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(error = %e, "Transient reply generation error - will retry");
                    Err(result) // Return error to trigger retry
                }
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        "Permanent reply generation error - will not retry"
                    );
                    Ok(result) // Return error wrapped in Ok to stop retrying
                }
            }
        })
        .await
        .unwrap_or_else(|e| e) // Extract the inner result
    }
}
