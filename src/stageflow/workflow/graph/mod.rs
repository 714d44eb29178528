// SPDX-License-Identifier: MIT

//! Stage graph model and execution
//!
//! This module provides the graph builder, the validated immutable
//! [`StageGraph`], and the [`ExecutionEngine`] that walks it.

mod builder;
pub mod executor;
pub mod types;

pub use builder::{StageGraph, StageGraphBuilder};
pub use executor::{EngineRun, ExecutionEngine};
pub use types::{
    stage_fn, Edge, InterruptRequest, RetryPolicy, Router, StageContext, StageHandler, StageNode,
    StageOutput, Target, END, START,
};
