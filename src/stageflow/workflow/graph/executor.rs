// SPDX-License-Identifier: MIT

//! Stage graph executor
//!
//! The engine drives exactly one stage at a time: invoke the handler under
//! its retry policy, merge the partial update, evaluate the outgoing edge,
//! advance. A handler interrupt on an interrupt point becomes a checkpoint
//! and an [`EngineRun::Suspended`] return; nothing blocks waiting for the
//! decision.

use serde_json::Value;

use super::builder::StageGraph;
use super::types::{RetryPolicy, StageContext, StageNode, StageOutput, Target};
use crate::adk::error::{Result, StageflowError, WorkflowError};
use crate::stageflow::workflow::state::WorkflowState;
use crate::stageflow::workflow::suspension::{Checkpoint, SuspensionManager};

/// State field a resume decision is injected under
pub const DECISION_FIELD: &str = "decision";

/// Stage invocations allowed per run unless configured otherwise
pub const DEFAULT_MAX_STEPS: usize = 100;

/// How a walk of the graph ended
#[derive(Debug, Clone, PartialEq)]
pub enum EngineRun {
    /// Reached END
    Completed(WorkflowState),
    /// Stopped at an interrupt point; the checkpoint is already persisted
    Suspended(Checkpoint),
}

/// Walks a [`StageGraph`] from its entry or from a checkpoint
#[derive(Clone)]
pub struct ExecutionEngine {
    suspension: SuspensionManager,
    retry: RetryPolicy,
    max_steps: usize,
}

impl ExecutionEngine {
    pub fn new(suspension: SuspensionManager) -> Self {
        Self {
            suspension,
            retry: RetryPolicy::none(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Engine-wide retry policy for stages without their own
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn suspension(&self) -> &SuspensionManager {
        &self.suspension
    }

    /// Run from the graph's entry stage
    pub async fn run(
        &self,
        graph: &StageGraph,
        instance_id: &str,
        state: WorkflowState,
    ) -> Result<EngineRun> {
        log::info!(
            "Starting workflow '{}' for instance {} at stage {}",
            graph.name(),
            instance_id,
            graph.entry()
        );
        self.walk(graph, instance_id, graph.entry().to_string(), state, false)
            .await
    }

    /// Re-enter the interrupted stage with `decision` injected into state
    ///
    /// The checkpoint is not touched here; the driver decides when to
    /// consume it.
    pub async fn resume_from(
        &self,
        graph: &StageGraph,
        checkpoint: Checkpoint,
        decision: Value,
    ) -> Result<EngineRun> {
        if checkpoint.workflow != graph.name() {
            return Err(WorkflowError::WorkflowMismatch {
                expected: graph.name().to_string(),
                found: checkpoint.workflow,
            }
            .into());
        }

        log::info!(
            "Resuming instance {} at stage {} with decision {}",
            checkpoint.instance_id,
            checkpoint.stage,
            decision
        );
        let mut state = checkpoint.state;
        state.update(DECISION_FIELD, decision);
        self.walk(graph, &checkpoint.instance_id, checkpoint.stage, state, true)
            .await
    }

    async fn walk(
        &self,
        graph: &StageGraph,
        instance_id: &str,
        start: String,
        mut state: WorkflowState,
        mut resumed: bool,
    ) -> Result<EngineRun> {
        let mut current = start;
        let mut steps = 0usize;

        loop {
            if steps >= self.max_steps {
                log::error!(
                    "Instance {} exceeded {} stage invocations at stage {}",
                    instance_id,
                    self.max_steps,
                    current
                );
                return Err(StageflowError::StepLimitExceeded {
                    limit: self.max_steps,
                });
            }
            steps += 1;

            let node = graph
                .stage(&current)
                .ok_or_else(|| WorkflowError::UnknownStage(current.clone()))?;

            match self.invoke(node, instance_id, &state, resumed).await? {
                StageOutput::Update(update) => {
                    log::debug!(
                        "Stage {} wrote [{}]",
                        node.name,
                        update.keys().collect::<Vec<_>>().join(", ")
                    );
                    state.merge(update);
                }
                StageOutput::Interrupt(request) => {
                    if !node.interrupt {
                        return Err(WorkflowError::UnexpectedInterrupt(node.name.clone()).into());
                    }
                    // A stale decision must not answer the new interrupt
                    state.remove(DECISION_FIELD);
                    let checkpoint = self
                        .suspension
                        .request_interrupt(instance_id, graph.name(), &node.name, &state, request)
                        .await?;
                    return Ok(EngineRun::Suspended(checkpoint));
                }
            }

            let next = graph.next(&current, &state)?;
            if resumed {
                state.remove(DECISION_FIELD);
                resumed = false;
            }

            match next {
                Target::End => {
                    log::info!(
                        "Workflow '{}' completed for instance {} after {} stages",
                        graph.name(),
                        instance_id,
                        steps
                    );
                    return Ok(EngineRun::Completed(state));
                }
                Target::Stage(name) => {
                    log::debug!("Stage {} -> {}", current, name);
                    current = name;
                }
            }
        }
    }

    /// Invoke a handler, retrying transient failures per the stage's policy
    async fn invoke(
        &self,
        node: &StageNode,
        instance_id: &str,
        state: &WorkflowState,
        resumed: bool,
    ) -> Result<StageOutput> {
        let policy = node.retry.as_ref().unwrap_or(&self.retry);
        let mut attempt = 1u32;

        loop {
            let ctx = StageContext {
                instance_id: instance_id.to_string(),
                stage: node.name.clone(),
                attempt,
                resumed,
            };
            log::info!(
                "Executing stage {} (attempt {}/{})",
                node.name,
                attempt,
                policy.max_attempts
            );

            match node.handler.run(&ctx, state).await {
                Ok(output) => {
                    log::info!("Stage {} finished", node.name);
                    return Ok(output);
                }
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    log::warn!(
                        "Stage {} failed on attempt {}: {}; retrying in {:?}",
                        node.name,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("Stage {} failed: {}", node.name, e);
                    return Err(e);
                }
            }
        }
    }
}
