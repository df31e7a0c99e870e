//! Anthropic Claude API provider for insight generation

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{parse_retry_delay, truncate_body};
use crate::error::GenerationError;
use crate::generate::{GenMessage, GenerationOptions, TextGenerator};
use crate::types::REQUEST_TIMEOUT_SECS;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const PROVIDER: &str = "Claude";

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

/// Parse Claude API error response
fn parse_error(status: u16, body: &str, model: &str) -> GenerationError {
    let body_lower = body.to_lowercase();

    match status {
        429 => {
            if body_lower.contains("quota") || body_lower.contains("credit") {
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

/// Claude-backed text generator.
pub struct ClaudeGenerator {
    model: String,
    client: reqwest::Client,
}

impl ClaudeGenerator {
    pub fn new(api_key: &str, model: &str) -> Result<Self, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|_| GenerationError::invalid_api_key(PROVIDER, model))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
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
impl TextGenerator for ClaudeGenerator {
    async fn complete(
        &self,
        messages: &[GenMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        // Claude takes system instructions as a top-level parameter
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let chat: Vec<Message> = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| Message {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        let request_body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens,
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            messages: chat,
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

        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::other(PROVIDER, &self.model, &e.to_string()))?;

        data.content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or_else(|| GenerationError::other(PROVIDER, &self.model, "Empty response"))
    }
}
