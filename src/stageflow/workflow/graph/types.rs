// SPDX-License-Identifier: MIT

//! Stage graph type definitions
//!
//! Stages are named nodes with an async handler; edges are either a fixed
//! target or a router whose key selects the target.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::Result;
use crate::stageflow::workflow::state::{StateUpdate, WorkflowState};

/// Reserved name for the virtual node before the entry stage
pub const START: &str = "__start__";
/// Reserved name for the terminal node
pub const END: &str = "__end__";

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Stage(String),
    End,
}

impl Target {
    pub fn parse(name: &str) -> Self {
        if name == END {
            Target::End
        } else {
            Target::Stage(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Target::Stage(s) => s,
            Target::End => END,
        }
    }
}

/// Routing function evaluated against state after a stage completes
pub type Router = Arc<dyn Fn(&WorkflowState) -> String + Send + Sync>;

/// Outgoing edge of a stage
#[derive(Clone)]
pub enum Edge {
    /// Always go to the target
    Direct(Target),
    /// Evaluate the router and follow the matching route
    Conditional {
        router: Router,
        routes: HashMap<String, Target>,
    },
}

impl Edge {
    /// All targets this edge can lead to
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Edge::Direct(t) => vec![t],
            Edge::Conditional { routes, .. } => routes.values().collect(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(t) => f.debug_tuple("Direct").field(t).finish(),
            Edge::Conditional { routes, .. } => f
                .debug_struct("Conditional")
                .field("routes", routes)
                .finish_non_exhaustive(),
        }
    }
}

/// What a handler asks the suspension manager to show the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub prompt: String,
    pub data: Value,
}

/// Result of one handler invocation
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// Partial state to merge
    Update(StateUpdate),
    /// Pause the instance pending an external decision
    Interrupt(InterruptRequest),
}

impl StageOutput {
    pub fn update(update: StateUpdate) -> Self {
        StageOutput::Update(update)
    }

    /// A stage that writes nothing
    pub fn unchanged() -> Self {
        StageOutput::Update(StateUpdate::new())
    }

    pub fn interrupt(prompt: impl Into<String>, data: Value) -> Self {
        StageOutput::Interrupt(InterruptRequest {
            prompt: prompt.into(),
            data,
        })
    }
}

/// Per-invocation facts a handler may need
#[derive(Debug, Clone)]
pub struct StageContext {
    pub instance_id: String,
    pub stage: String,
    /// 1-based attempt number under the stage's retry policy
    pub attempt: u32,
    /// True when this invocation re-enters a suspended stage
    pub resumed: bool,
}

/// The work a stage performs
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(&self, ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput>;
}

/// Adapter turning an async closure into a [`StageHandler`]
pub struct FnStage<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> StageHandler for FnStage<F>
where
    F: Fn(StageContext, WorkflowState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StageOutput>> + Send + 'static,
{
    async fn run(&self, ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        (self.f)(ctx.clone(), state.clone()).await
    }
}

/// Wrap an async closure as a stage handler
pub fn stage_fn<F, Fut>(f: F) -> Arc<dyn StageHandler>
where
    F: Fn(StageContext, WorkflowState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StageOutput>> + Send + 'static,
{
    Arc::new(FnStage { f })
}

/// Retry policy applied by the engine around a stage handler
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay before the attempt following `failed_attempt` (1-based)
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// A node in the stage graph
#[derive(Clone)]
pub struct StageNode {
    pub name: String,
    pub handler: Arc<dyn StageHandler>,
    /// Whether the handler may suspend the instance here
    pub interrupt: bool,
    /// Overrides the engine-wide retry policy
    pub retry: Option<RetryPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        assert_eq!(Target::parse(END), Target::End);
        assert_eq!(Target::parse("search"), Target::Stage("search".to_string()));
        assert_eq!(Target::End.name(), END);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(30), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_policy_minimum_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_stage_fn_receives_state() {
        let handler = stage_fn(|_ctx, state| async move {
            let topic = state.get_str("topic").unwrap_or_default().to_uppercase();
            Ok(StageOutput::update(StateUpdate::new().set("shout", topic)))
        });

        let mut state = WorkflowState::empty();
        state.update("topic", serde_json::json!("rust"));
        let ctx = StageContext {
            instance_id: "t".to_string(),
            stage: "a".to_string(),
            attempt: 1,
            resumed: false,
        };

        let out = handler.run(&ctx, &state).await.unwrap();
        assert_eq!(
            out,
            StageOutput::update(StateUpdate::new().set("shout", "RUST"))
        );
    }
}
