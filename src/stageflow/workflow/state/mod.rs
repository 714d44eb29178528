// SPDX-License-Identifier: MIT

//! State management for stage graphs
//!
//! This module provides:
//! - `StateSchema` - per-field reducers and defaults
//! - `WorkflowState` - the value bag threaded through the graph
//! - `StateUpdate` - the partial update a stage hands back

mod schema;
mod store;

pub use schema::{ReducerType, StateFieldDef, StateSchema};
pub use store::{StateUpdate, WorkflowState};
