//! Text-generation collaborator interface.
//!
//! The pipeline treats generation as an external call: messages in, raw
//! text out. Providers enforce their own timeout; the pipeline adds no
//! retry and propagates failures unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::types::MAX_TOKENS_INSIGHTS;

/// A single generation message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenMessage {
    pub role: String,
    pub content: String,
}

impl GenMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call generation options
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: MAX_TOKENS_INSIGHTS,
        }
    }
}

/// External text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one completion over the given messages and return the raw text.
    async fn complete(
        &self,
        messages: &[GenMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;
}
