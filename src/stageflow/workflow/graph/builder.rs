// SPDX-License-Identifier: MIT

//! Stage graph construction and validation
//!
//! Wiring mistakes (unknown targets, two outgoing edges, a stage with no
//! way out) are reported by [`StageGraphBuilder::build`], never at run time.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Edge, RetryPolicy, Router, StageHandler, StageNode, Target, END, START};
use crate::adk::error::{Result, StageflowError, WorkflowError};
use crate::stageflow::workflow::state::{StateSchema, WorkflowState};

/// Mutable graph definition; consumed by `build`
pub struct StageGraphBuilder {
    name: String,
    stages: Vec<StageNode>,
    edges: Vec<(String, Edge)>,
    entry: Option<String>,
    schema: StateSchema,
}

impl StageGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            edges: Vec::new(),
            entry: None,
            schema: StateSchema::default(),
        }
    }

    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn add_stage(self, name: impl Into<String>, handler: Arc<dyn StageHandler>) -> Self {
        self.push_stage(name.into(), handler, false, None)
    }

    /// Add a stage whose handler may suspend the instance
    pub fn add_interrupt_stage(
        self,
        name: impl Into<String>,
        handler: Arc<dyn StageHandler>,
    ) -> Self {
        self.push_stage(name.into(), handler, true, None)
    }

    /// Add a stage with its own retry policy
    pub fn add_stage_with_retry(
        self,
        name: impl Into<String>,
        handler: Arc<dyn StageHandler>,
        retry: RetryPolicy,
    ) -> Self {
        self.push_stage(name.into(), handler, false, Some(retry))
    }

    fn push_stage(
        mut self,
        name: String,
        handler: Arc<dyn StageHandler>,
        interrupt: bool,
        retry: Option<RetryPolicy>,
    ) -> Self {
        self.stages.push(StageNode {
            name,
            handler,
            interrupt,
            retry,
        });
        self
    }

    /// Unconditional edge; `to` may be [`END`]
    pub fn add_edge(mut self, from: impl Into<String>, to: &str) -> Self {
        self.edges.push((from.into(), Edge::Direct(Target::parse(to))));
        self
    }

    /// Conditional edge: `router` picks a key, `routes` maps keys to stages or [`END`]
    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        router: F,
        routes: &[(&str, &str)],
    ) -> Self
    where
        F: Fn(&WorkflowState) -> String + Send + Sync + 'static,
    {
        let router: Router = Arc::new(router);
        let routes = routes
            .iter()
            .map(|(key, to)| (key.to_string(), Target::parse(to)))
            .collect();
        self.edges
            .push((from.into(), Edge::Conditional { router, routes }));
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate and freeze the graph
    pub fn build(self) -> std::result::Result<StageGraph, WorkflowError> {
        let mut stages: HashMap<String, StageNode> = HashMap::new();
        let mut order = Vec::with_capacity(self.stages.len());
        for node in self.stages {
            if node.name == START || node.name == END {
                return Err(WorkflowError::ReservedName(node.name));
            }
            if stages.contains_key(&node.name) {
                return Err(WorkflowError::DuplicateStage(node.name));
            }
            order.push(node.name.clone());
            stages.insert(node.name.clone(), node);
        }

        let mut edges: HashMap<String, Edge> = HashMap::new();
        for (from, edge) in self.edges {
            if !stages.contains_key(&from) {
                return Err(WorkflowError::UnknownStage(from));
            }
            if edges.contains_key(&from) {
                return Err(WorkflowError::ConflictingEdges(from));
            }
            if let Edge::Conditional { routes, .. } = &edge {
                if routes.is_empty() {
                    return Err(WorkflowError::EmptyRoutes(from));
                }
            }
            for target in edge.targets() {
                if let Target::Stage(name) = target {
                    if !stages.contains_key(name) {
                        return Err(WorkflowError::UnknownStage(name.clone()));
                    }
                }
            }
            edges.insert(from, edge);
        }

        if let Some(missing) = order.iter().find(|name| !edges.contains_key(*name)) {
            return Err(WorkflowError::NoOutgoingEdge(missing.clone()));
        }

        let entry = self
            .entry
            .ok_or_else(|| WorkflowError::MissingEntry(self.name.clone()))?;
        if !stages.contains_key(&entry) {
            return Err(WorkflowError::UnknownStage(entry));
        }

        log::info!(
            "Built stage graph '{}' with {} stages (entry: {})",
            self.name,
            order.len(),
            entry
        );

        Ok(StageGraph {
            name: self.name,
            stages,
            edges,
            order,
            entry,
            schema: self.schema,
        })
    }
}

/// Validated, immutable stage graph
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageNode>,
    edges: HashMap<String, Edge>,
    /// Declaration order, for deterministic rendering
    order: Vec<String>,
    entry: String,
    schema: StateSchema,
}

impl StageGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// START's successor
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn stage(&self, name: &str) -> Option<&StageNode> {
        self.stages.get(name)
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Evaluate the outgoing edge of `from` against `state`
    pub fn next(&self, from: &str, state: &WorkflowState) -> Result<Target> {
        let edge = self
            .edges
            .get(from)
            .ok_or_else(|| WorkflowError::UnknownStage(from.to_string()))?;

        match edge {
            Edge::Direct(target) => Ok(target.clone()),
            Edge::Conditional { router, routes } => {
                let key = router(state);
                log::debug!("Stage {} routed with key '{}'", from, key);
                routes
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| StageflowError::UnknownRoute {
                        stage: from.to_string(),
                        key,
                    })
            }
        }
    }

    /// Render the graph as a Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["flowchart TD".to_string()];
        lines.push(format!("    {}([start]) --> {}", START, self.entry));

        let mut reaches_end = false;
        for name in &self.order {
            if self.stages[name].interrupt {
                lines.push(format!("    {}{{{{{}}}}}", name, name));
            }
            match &self.edges[name] {
                Edge::Direct(target) => {
                    lines.push(format!("    {} --> {}", name, target.name()));
                    reaches_end |= *target == Target::End;
                }
                Edge::Conditional { routes, .. } => {
                    let mut keys: Vec<_> = routes.keys().collect();
                    keys.sort();
                    for key in keys {
                        let target = &routes[key];
                        lines.push(format!("    {} -- {} --> {}", name, key, target.name()));
                        reaches_end |= *target == Target::End;
                    }
                }
            }
        }
        if reaches_end {
            lines.push(format!("    {}([end])", END));
        }
        lines.join("\n")
    }
}
