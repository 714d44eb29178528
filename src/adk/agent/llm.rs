// SPDX-License-Identifier: MIT

//! LLM Agent - one system instruction, one user turn, one answer

use super::Agent;
use crate::adk::error::Result;
use crate::adk::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

/// Single-turn LLM agent
pub struct LLMAgent {
    pub name: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl LLMAgent {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        model: Arc<dyn Model>,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            model,
            config: GenerationConfig::default(),
        }
    }

    /// Ask the provider for a JSON object answer
    pub fn with_json_output(mut self) -> Self {
        self.config.json_output = true;
        self
    }
}

#[async_trait]
impl Agent for LLMAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: String) -> Result<String> {
        let history = vec![Content::system(self.instruction.clone()), Content::user(input)];

        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;
        let text = response.text();

        log::info!(
            "Agent {} returning text response (length: {}, preview: '{}')",
            self.name,
            text.len(),
            text.chars().take(100).collect::<String>()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::Part;
    use std::sync::Mutex;

    /// Records the history and config it was called with
    struct RecordingModel {
        seen: Mutex<Option<(Vec<Content>, GenerationConfig)>>,
    }

    #[async_trait]
    impl Model for RecordingModel {
        async fn generate_content(
            &self,
            history: &[Content],
            config: Option<&GenerationConfig>,
        ) -> Result<Content> {
            *self.seen.lock().unwrap() = Some((history.to_vec(), config.cloned().unwrap_or_default()));
            Ok(Content {
                role: "model".to_string(),
                parts: vec![Part::Text("answer".to_string())],
            })
        }
    }

    #[tokio::test]
    async fn test_llm_agent_sends_instruction_and_input() {
        let model = Arc::new(RecordingModel {
            seen: Mutex::new(None),
        });
        let agent = LLMAgent::new("planner", "You plan things.", model.clone()).with_json_output();

        let out = agent.run("topic".to_string()).await.unwrap();
        assert_eq!(out, "answer");

        let (history, config) = model.seen.lock().unwrap().clone().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "system");
        assert_eq!(history[0].text(), "You plan things.");
        assert_eq!(history[1].text(), "topic");
        assert!(config.json_output);
    }
}
