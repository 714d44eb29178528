// SPDX-License-Identifier: MIT

//! OpenAI Model - chat-completions implementation
//!
//! Works against api.openai.com and any endpoint that mirrors its
//! `/chat/completions` contract.

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::{ModelError, Result, StageflowError};
use crate::stageflow::config::ModelSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// OpenAI-compatible chat model
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
    default_config: GenerationConfig,
}

impl OpenAIModel {
    /// Create a model from config.
    ///
    /// The key is read from the environment variable named by
    /// `settings.api_key_env`.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let api_key = env::var(&settings.api_key_env)
            .map_err(|_| ModelError::ApiKeyMissing(settings.api_key_env.clone()))?;
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name: settings.model_name.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_config: GenerationConfig {
                temperature: settings.temperature,
                ..GenerationConfig::default()
            },
        })
    }

    /// Convert internal Content to OpenAI message format
    fn content_to_openai_message(content: &Content) -> serde_json::Value {
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };
        json!({
            "role": role,
            "content": content.text()
        })
    }

    fn build_body(&self, history: &[Content], config: &GenerationConfig) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = history
            .iter()
            .map(Self::content_to_openai_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        let temperature = config.temperature.or(self.default_config.temperature);
        if let Some(temp) = temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = config.max_output_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = config.top_p {
            body["top_p"] = json!(top_p);
        }
        if config.json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &serde_json::Value) -> Result<Content> {
        let message = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .map(|choice| &choice["message"])
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".to_string()))?;

        let mut parts = Vec::new();
        if let Some(reasoning) = message["reasoning"].as_str() {
            if !reasoning.is_empty() {
                parts.push(Part::Thinking(reasoning.to_string()));
            }
        }
        if let Some(content) = message["content"].as_str() {
            parts.push(Part::Text(content.to_string()));
        }

        if !parts.iter().any(|p| matches!(p, Part::Text(_))) {
            return Err(ModelError::InvalidResponse("message has no text content".to_string()).into());
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, config.unwrap_or(&self.default_config));

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(StageflowError::api("openai", format!("{}: {}", status, text)));
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_openai_response(&resp_json)
    }
}
