// SPDX-License-Identifier: MIT

//! stageflow-rs - a stage-graph workflow engine for multi-step agent pipelines
//!
//! - [`adk`] - errors, the model port and agents
//! - [`stageflow`] - the workflow engine, its ports, and the bundled pipelines

pub mod adk;
pub mod stageflow;
