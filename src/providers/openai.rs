//! OpenAI Chat Completions API provider for insight generation

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{parse_retry_delay, truncate_body};
use crate::error::GenerationError;
use crate::generate::{GenMessage, GenerationOptions, TextGenerator};
use crate::types::REQUEST_TIMEOUT_SECS;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const PROVIDER: &str = "OpenAI";

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    /// Newer OpenAI models use max_completion_tokens instead of max_tokens
    max_completion_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Parse OpenAI API error response
fn parse_error(status: u16, body: &str, model: &str) -> GenerationError {
    let body_lower = body.to_lowercase();

    match status {
        429 => {
            // OpenAI uses 429 for both rate limit and quota
            if body_lower.contains("quota")
                || body_lower.contains("billing")
                || body_lower.contains("exceeded")
            {
                GenerationError::quota_exceeded(PROVIDER, model)
            } else {
                let retry_after = parse_retry_delay(body);
                GenerationError::rate_limit(PROVIDER, model, retry_after)
            }
        }
        401 => GenerationError::invalid_api_key(PROVIDER, model),
        403 => {
            if body_lower.contains("permission") || body_lower.contains("access") {
                GenerationError::invalid_api_key(PROVIDER, model)
            } else {
                GenerationError::other(PROVIDER, model, "Access denied")
            }
        }
        404 => GenerationError::model_not_found(PROVIDER, model),
        500..=599 => GenerationError::server_error(PROVIDER, model, &format!("HTTP {}", status)),
        _ => GenerationError::other(
            PROVIDER,
            model,
            &format!("HTTP {}: {}", status, truncate_body(body)),
        ),
    }
}

/// OpenAI-backed text generator.
pub struct OpenAiGenerator {
    model: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(api_key: &str, model: &str) -> Result<Self, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| GenerationError::invalid_api_key(PROVIDER, model))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Client with timeout and connection pooling
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| GenerationError::network_error(PROVIDER, model, &e.to_string()))?;

        Ok(Self {
            model: model.to_string(),
            client,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(
        &self,
        messages: &[GenMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let request_body = ChatCompletionRequest {
            model: self.model.clone(),
            max_completion_tokens: options.max_tokens,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(API_URL)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GenerationError::network_error(PROVIDER, &self.model, &e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &body, &self.model));
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::other(PROVIDER, &self.model, &e.to_string()))?;

        data.choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| GenerationError::other(PROVIDER, &self.model, "Empty response"))
    }
}
