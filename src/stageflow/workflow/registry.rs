// SPDX-License-Identifier: MIT

//! Named agents available to stage handlers

use crate::adk::agent::Agent;
use crate::adk::error::{Result, StageflowError, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Arc<dyn Agent>>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register under the agent's own name, replacing any previous one
    pub async fn register(&self, agent: Arc<dyn Agent>) {
        let mut agents = self.agents.write().await;
        agents.insert(agent.name().to_string(), agent);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        let agents = self.agents.read().await;
        agents.get(name).cloned()
    }

    /// Look up an agent a stage cannot run without
    pub async fn require(&self, name: &str) -> Result<Arc<dyn Agent>> {
        self.get(name)
            .await
            .ok_or_else(|| StageflowError::from(WorkflowError::UnknownAgent(name.to_string())))
    }

    /// Resolve every name up front so a fan-out never starts half-wired
    pub async fn require_all(&self, names: &[&str]) -> Result<Vec<Arc<dyn Agent>>> {
        let agents = self.agents.read().await;
        names
            .iter()
            .map(|name| {
                agents
                    .get(*name)
                    .cloned()
                    .ok_or_else(|| StageflowError::from(WorkflowError::UnknownAgent(name.to_string())))
            })
            .collect()
    }

    pub async fn names(&self) -> Vec<String> {
        let agents = self.agents.read().await;
        let mut names: Vec<String> = agents.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
