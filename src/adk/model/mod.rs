// SPDX-License-Identifier: MIT

//! Model module - the model/evaluation port
//!
//! Stage handlers never talk to a provider directly; they go through the
//! [`Model`] trait. The only bundled implementation is
//! [openai], which speaks the OpenAI chat-completions protocol and
//! therefore also covers compatible endpoints (Cerebras, Ollama, ...).

pub mod openai;

use crate::adk::error::{ModelError, Result};
use crate::stageflow::config::ModelSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// Ask the provider for a JSON object response
    #[serde(default)]
    pub json_output: bool,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, thinking excluded
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Reasoning content from thinking models
    Thinking(String),
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content>;
}

/// Build the configured model provider
pub fn from_settings(settings: &ModelSettings) -> Result<Arc<dyn Model>> {
    match settings.provider.to_lowercase().as_str() {
        "openai" | "openai-compatible" | "cerebras" | "ollama" => {
            log::info!(
                "Using provider: {} with model: {}",
                settings.provider,
                settings.model_name
            );
            Ok(Arc::new(openai::OpenAIModel::from_settings(settings)?))
        }
        other => Err(ModelError::UnsupportedProvider(other.to_string()).into()),
    }
}
