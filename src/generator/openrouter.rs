// OpenRouter chat-completion client.
//
// One POST per generation: persona as the system message, the topic or
// reply prompt as the user message. The response goes through Completion
// so every failure is a typed GenerationError, never a panic.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::response::Completion;
use super::{fit_post, ContentGenerator, GenerationError};
use crate::topics::prompts::{self, Persona, BRUH};
use crate::topics::Topic;
use crate::transport::Mention;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3-opus";

/// OpenRouter asks callers to identify themselves.
const REFERER: &str = "https://github.com/bruh-bot";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TOKENS: u32 = 100;
const TEMPERATURE: f32 = 0.9;

pub struct LlmGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    persona: &'static Persona,
}

impl LlmGenerator {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            persona: &BRUH,
        })
    }

    async fn complete(&self, user_prompt: &str) -> Result<String, GenerationError> {
        let system = self.persona.system_prompt();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        debug!(model = %self.model, "Requesting completion");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;

        match Completion::parse(&body) {
            Completion::Text(text) => {
                let fitted = fit_post(&text);
                if fitted.len() != text.len() {
                    info!(
                        original_chars = text.chars().count(),
                        "Completion over budget, truncated"
                    );
                }
                Ok(fitted)
            }
            Completion::ApiError(message) => {
                warn!(%message, "Model endpoint returned an error object");
                Err(GenerationError::Api(message))
            }
            Completion::Malformed(why) => Err(GenerationError::Malformed(why)),
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    async fn generate(&self, topic: &Topic) -> Result<String, GenerationError> {
        self.complete(&prompts::topic_prompt(topic)).await
    }

    async fn generate_reply(
        &self,
        mention: &Mention,
        context: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.complete(&prompts::reply_prompt(&mention.text, context))
            .await
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}
