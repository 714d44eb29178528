// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Per-field merge rules for a graph's state
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateFieldDef {
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Value seeded before the first stage runs
    pub default: Option<Value>,
}

/// Reducer types for merging values into state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow merge objects
    Merge,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field with a reducer
    pub fn field(mut self, name: impl Into<String>, reducer: ReducerType) -> Self {
        self.fields.entry(name.into()).or_default().reducer = reducer;
        self
    }

    /// Declare a field default
    pub fn default_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.entry(name.into()).or_default().default = Some(value);
        self
    }
}
