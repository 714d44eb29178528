// SPDX-License-Identifier: MIT

//! Workflow driver
//!
//! [`WorkflowRunner`] owns one graph and applies the instance lifecycle
//! rules on top of the engine:
//! - `start` refuses an instance that is still suspended
//! - a successful `resume` consumes the checkpoint (or replaces it when the
//!   run suspends again); a failed one leaves it for another attempt
//! - `discard` abandons a suspended instance
//!
//! Each call holds the instance's claim for its whole run, so overlapping
//! calls on one instance id take turns.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adk::error::{Result, StageflowError};
use crate::stageflow::workflow::graph::{EngineRun, ExecutionEngine, StageGraph};
use crate::stageflow::workflow::state::WorkflowState;
use crate::stageflow::workflow::suspension::{Checkpoint, SuspensionManager};

pub use crate::stageflow::workflow::graph::executor::DECISION_FIELD;

/// What a `start` or `resume` call hands back to its caller
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(WorkflowState),
    Suspended {
        instance_id: String,
        stage: String,
        prompt: String,
        data: Value,
    },
}

impl RunOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended { .. })
    }

    /// JSON view used by the CLI and HTTP surfaces
    pub fn to_json(&self) -> Value {
        match self {
            RunOutcome::Completed(state) => json!({
                "status": "completed",
                "state": state.to_json(),
            }),
            RunOutcome::Suspended {
                instance_id,
                stage,
                prompt,
                data,
            } => json!({
                "status": "suspended",
                "instance_id": instance_id,
                "stage": stage,
                "prompt": prompt,
                "data": data,
            }),
        }
    }
}

impl From<EngineRun> for RunOutcome {
    fn from(run: EngineRun) -> Self {
        match run {
            EngineRun::Completed(state) => RunOutcome::Completed(state),
            EngineRun::Suspended(checkpoint) => RunOutcome::Suspended {
                instance_id: checkpoint.instance_id,
                stage: checkpoint.stage,
                prompt: checkpoint.interrupt.prompt,
                data: checkpoint.interrupt.data,
            },
        }
    }
}

/// Start/resume driver for a single graph
pub struct WorkflowRunner {
    graph: StageGraph,
    engine: ExecutionEngine,
}

impl WorkflowRunner {
    pub fn new(graph: StageGraph, engine: ExecutionEngine) -> Self {
        Self { graph, engine }
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    fn suspension(&self) -> &SuspensionManager {
        self.engine.suspension()
    }

    /// Run a new instance seeded with `seed`
    pub async fn start(&self, instance_id: &str, seed: Map<String, Value>) -> Result<RunOutcome> {
        let _claim = self.suspension().claim(instance_id).await;
        if let Some(checkpoint) = self.suspension().pending(instance_id).await? {
            return Err(StageflowError::PendingCheckpoint {
                instance_id: instance_id.to_string(),
                stage: checkpoint.stage,
            });
        }

        let state = WorkflowState::seeded(self.graph.schema(), seed);
        let run = self.engine.run(&self.graph, instance_id, state).await?;
        Ok(run.into())
    }

    /// Continue a suspended instance with an external decision
    pub async fn resume(&self, instance_id: &str, decision: Value) -> Result<RunOutcome> {
        let _claim = self.suspension().claim(instance_id).await;
        let checkpoint = self.suspension().load_for_resume(instance_id).await?;
        let run = self
            .engine
            .resume_from(&self.graph, checkpoint, decision)
            .await?;

        // A re-suspension has already overwritten the checkpoint
        if let EngineRun::Completed(_) = run {
            self.suspension().consume(instance_id).await?;
        }
        Ok(run.into())
    }

    pub async fn pending(&self, instance_id: &str) -> Result<Option<Checkpoint>> {
        self.suspension().pending(instance_id).await
    }

    pub async fn discard(&self, instance_id: &str) -> Result<Checkpoint> {
        self.suspension().discard(instance_id).await
    }
}

/// Runners keyed by graph name, sharing one checkpoint store
///
/// Lets a caller resume an instance knowing only its id.
#[derive(Clone)]
pub struct RunnerSet {
    runners: BTreeMap<String, Arc<WorkflowRunner>>,
    suspension: SuspensionManager,
}

impl RunnerSet {
    pub fn new(suspension: SuspensionManager) -> Self {
        Self {
            runners: BTreeMap::new(),
            suspension,
        }
    }

    pub fn insert(&mut self, runner: WorkflowRunner) {
        let name = runner.graph().name().to_string();
        self.runners.insert(name, Arc::new(runner));
    }

    pub fn get(&self, workflow: &str) -> Result<Arc<WorkflowRunner>> {
        self.runners
            .get(workflow)
            .cloned()
            .ok_or_else(|| StageflowError::config(format!("Unknown workflow '{}'", workflow)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.runners.keys().map(String::as_str)
    }

    pub async fn pending(&self, instance_id: &str) -> Result<Option<Checkpoint>> {
        self.suspension.pending(instance_id).await
    }

    /// Resume with whichever graph produced the instance's checkpoint
    pub async fn resume(&self, instance_id: &str, decision: Value) -> Result<RunOutcome> {
        let checkpoint = self.suspension.load_for_resume(instance_id).await?;
        self.get(&checkpoint.workflow)?
            .resume(instance_id, decision)
            .await
    }

    pub async fn discard(&self, instance_id: &str) -> Result<Checkpoint> {
        self.suspension.discard(instance_id).await
    }
}
