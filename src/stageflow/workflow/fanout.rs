// SPDX-License-Identifier: MIT

//! Concurrent fan-out with partial-failure aggregation
//!
//! Two disciplines:
//! - [`FanOutExecutor::run_all`]: one task per item, outputs in completion
//!   order, a failed or panicked item is dropped and the batch carries on
//! - [`run_pair`]: two attempts at the same check awaited together, then
//!   an adjudication step; any failure yields `None`

use serde::Serialize;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::adk::error::Result;

/// Aggregated outcome of a fan-out batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanOutResult<T> {
    /// Successful outputs in completion order
    pub outputs: Vec<T>,
    pub attempted: usize,
    /// Items that finished, successfully or not
    pub completed: usize,
    pub succeeded: usize,
}

/// Emitted after each item finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub succeeded: bool,
}

/// Runs independent sub-tasks concurrently
#[derive(Debug, Clone, Default)]
pub struct FanOutExecutor {
    progress: Option<mpsc::UnboundedSender<Progress>>,
}

impl FanOutExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a [`Progress`] event per finished item
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<Progress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Spawn `work(item)` for every item and collect as they complete
    pub async fn run_all<I, T, F, Fut>(&self, items: Vec<I>, work: F) -> FanOutResult<T>
    where
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let attempted = items.len();
        let mut tasks = JoinSet::new();
        for item in items {
            tasks.spawn(work(item));
        }

        let mut outputs = Vec::with_capacity(attempted);
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            let succeeded = match joined {
                Ok(Ok(output)) => {
                    outputs.push(output);
                    true
                }
                Ok(Err(e)) => {
                    log::warn!("Sub-task failed, dropping it: {}", e);
                    false
                }
                Err(e) => {
                    log::warn!("Sub-task did not finish, dropping it: {}", e);
                    false
                }
            };
            log::info!("{}/{} sub-tasks completed", completed, attempted);

            if let Some(sender) = &self.progress {
                // A dropped receiver only means nobody is watching
                let _ = sender.send(Progress {
                    completed,
                    total: attempted,
                    succeeded,
                });
            }
        }

        FanOutResult {
            succeeded: outputs.len(),
            outputs,
            attempted,
            completed,
        }
    }
}

/// Await two attempts together, then let `adjudicate` pick the result
///
/// Returns `None` when either attempt or the adjudication fails.
pub async fn run_pair<T, A, B, J, JFut>(first: A, second: B, adjudicate: J) -> Option<T>
where
    A: Future<Output = Result<T>>,
    B: Future<Output = Result<T>>,
    J: FnOnce(T, T) -> JFut,
    JFut: Future<Output = Result<T>>,
{
    let (a, b) = match tokio::try_join!(first, second) {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("Paired sub-task failed: {}", e);
            return None;
        }
    };

    match adjudicate(a, b).await {
        Ok(winner) => Some(winner),
        Err(e) => {
            log::warn!("Adjudication failed: {}", e);
            None
        }
    }
}
