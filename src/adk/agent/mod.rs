// SPDX-License-Identifier: MIT

//! Agent module - named units of model work used by stage handlers
//!
//! - `LLMAgent` - instruction + model, optionally in JSON mode
//! - [`run_structured`] - run any agent and decode its answer into a type

mod llm;

pub use llm::LLMAgent;

use crate::adk::error::{ModelError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Core agent trait for all agent types
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent name
    fn name(&self) -> &str;

    /// Run the agent with the given input
    async fn run(&self, input: String) -> Result<String>;
}

/// Run an agent and decode its answer as JSON into `T`
pub async fn run_structured<T: DeserializeOwned>(agent: &dyn Agent, input: String) -> Result<T> {
    let raw = agent.run(input).await?;
    parse_structured(&raw).map_err(|e| {
        log::warn!("Agent {} returned unparseable output: {}", agent.name(), e);
        e
    })
}

/// Body of model text, without a surrounding ```<lang> or bare ``` fence
pub fn strip_fence<'a>(raw: &'a str, lang: &str) -> &'a str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```")
        .map(|s| s.strip_prefix(lang).unwrap_or(s))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim()
}

/// Decode model text as JSON, tolerating a surrounding ```json fence
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(strip_fence(raw, "json"))
        .map_err(|e| ModelError::InvalidResponse(format!("expected JSON output: {}", e)).into())
}
