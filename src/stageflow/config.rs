// SPDX-License-Identifier: MIT

//! Configuration - YAML file loading and defaults
//!
//! Every field has a default, so a missing file or a partial file both
//! produce a usable [`StageflowConfig`].

use crate::adk::error::Result;
use crate::stageflow::workflow::graph::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct StageflowConfig {
    pub model: ModelSettings,
    pub research: ResearchSettings,
    pub security: SecuritySettings,
    pub storage: StorageSettings,
    pub retry: RetrySettings,
    pub engine: EngineSettings,
}

/// Model provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ModelSettings {
    /// "openai" or any OpenAI-compatible alias
    pub provider: String,
    pub model_name: String,
    /// Override for OpenAI-compatible endpoints
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature: Option<f32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: None,
        }
    }
}

/// Research pipeline knobs
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResearchSettings {
    /// How many candidate queries the planner generates
    pub num_queries: usize,
    /// How many scored queries survive selection
    pub top_k: usize,
    /// Search hits kept per query
    pub results_per_query: usize,
    /// Search hits requested per query
    pub max_results: usize,
    pub search_depth: String,
    /// Pause between sequential search requests
    pub search_delay_ms: u64,
    pub extract_timeout_secs: u64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            num_queries: 10,
            top_k: 5,
            results_per_query: 1,
            max_results: 5,
            search_depth: "basic".to_string(),
            search_delay_ms: 1000,
            extract_timeout_secs: 90,
        }
    }
}

impl ResearchSettings {
    pub fn search_delay(&self) -> Duration {
        Duration::from_millis(self.search_delay_ms)
    }
}

/// URL security pipeline knobs
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SecuritySettings {
    pub num_checks: usize,
    /// Search hits handed to the checkers as evidence for each check
    pub evidence_results: usize,
    /// Verified sender address for emailed reports
    pub email_from: Option<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            num_checks: 3,
            evidence_results: 3,
            email_from: None,
        }
    }
}

/// Where checkpoints and reports are written
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub checkpoint_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from(".output/checkpoints"),
            reports_dir: PathBuf::from(".output/reports"),
        }
    }
}

/// Engine-wide default retry policy for stage handlers
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EngineSettings {
    /// Stage invocation limit per start/resume call
    pub max_steps: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { max_steps: 100 }
    }
}

/// Loads configuration from YAML files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<StageflowConfig> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<StageflowConfig> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("Loading config from {}", path.display());
            Self::load(path)
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Ok(StageflowConfig::default())
        }
    }

    /// Parse configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<StageflowConfig> {
        let config: StageflowConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }
}
