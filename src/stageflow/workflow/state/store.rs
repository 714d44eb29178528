// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use super::schema::{ReducerType, StateSchema};
use crate::adk::error::{Result, StageflowError};

/// Runtime workflow state with reducer support
///
/// Serializable so a suspended instance can be checkpointed and restored
/// with its reducers intact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Current state values
    fields: BTreeMap<String, Value>,
    /// Reducers for each declared field
    #[serde(default)]
    reducers: HashMap<String, ReducerType>,
}

/// Partial state returned by a stage handler, applied in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    entries: Vec<(String, Value)>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Set a field from any serializable value
    pub fn set_serialized<T: Serialize>(self, key: impl Into<String>, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(key, value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl WorkflowState {
    /// Create a new WorkflowState from a schema, seeding declared defaults
    pub fn new(schema: &StateSchema) -> Self {
        let mut fields = BTreeMap::new();
        let mut reducers = HashMap::new();

        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                fields.insert(name.clone(), default.clone());
            }
            reducers.insert(name.clone(), def.reducer);
        }

        Self { fields, reducers }
    }

    /// Create an empty WorkflowState
    pub fn empty() -> Self {
        Self::default()
    }

    /// Schema defaults overlaid with caller-supplied seed fields
    pub fn seeded(schema: &StateSchema, seed: Map<String, Value>) -> Self {
        let mut state = Self::new(schema);
        for (key, value) in seed {
            state.fields.insert(key, value);
        }
        state
    }

    /// Update a field using the appropriate reducer
    pub fn update(&mut self, key: &str, value: Value) {
        let reducer = self
            .reducers
            .get(key)
            .copied()
            .unwrap_or(ReducerType::Overwrite);

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let arr = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if let Value::Array(a) = arr {
                    match value {
                        Value::Array(new_items) => a.extend(new_items),
                        other => a.push(other),
                    }
                }
            }
            ReducerType::Max | ReducerType::Min => {
                let current = self.fields.get(key).and_then(|v| v.as_f64());
                if let Some(new) = value.as_f64() {
                    let replace = match current {
                        None => true,
                        Some(cur) if reducer == ReducerType::Max => new > cur,
                        Some(cur) => new < cur,
                    };
                    if replace {
                        self.fields.insert(key.to_string(), value);
                    }
                }
            }
            ReducerType::Merge => {
                let current = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                if let (Value::Object(current_obj), Value::Object(new_obj)) = (current, value) {
                    for (k, v) in new_obj {
                        current_obj.insert(k, v);
                    }
                }
            }
        }
    }

    /// Fold a stage's partial update into the state
    pub fn merge(&mut self, update: StateUpdate) {
        for (key, value) in update.entries {
            self.update(&key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Read a field a predecessor stage must have written
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| StageflowError::missing_field(key))?;
        serde_json::from_value(value.clone()).map_err(|e| StageflowError::InvalidField {
            field: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_with(name: &str, reducer: ReducerType) -> StateSchema {
        StateSchema::new().field(name, reducer)
    }

    #[test]
    fn test_empty_state() {
        let state = WorkflowState::empty();
        assert!(state.get("anything").is_none());
    }

    #[test]
    fn test_seed_overrides_defaults() {
        let schema = StateSchema::new()
            .default_value("num_queries", json!(5))
            .default_value("topic", json!("unset"));
        let mut seed = Map::new();
        seed.insert("topic".to_string(), json!("rust async"));

        let state = WorkflowState::seeded(&schema, seed);
        assert_eq!(state.get("num_queries"), Some(&json!(5)));
        assert_eq!(state.get_str("topic"), Some("rust async"));
    }

    #[test]
    fn test_merge_applies_updates_in_order() {
        let mut state = WorkflowState::empty();
        state.update("keep", json!("untouched"));

        state.merge(StateUpdate::new().set("value", "first").set("value", "second"));

        assert_eq!(state.get_str("value"), Some("second"));
        assert_eq!(state.get_str("keep"), Some("untouched"));
    }

    #[test]
    fn test_append_reducer() {
        let mut state = WorkflowState::new(&schema_with("items", ReducerType::Append));

        state.update("items", json!("item1"));
        state.update("items", json!(["item2", "item3"]));
        assert_eq!(state.get("items"), Some(&json!(["item1", "item2", "item3"])));
    }

    #[test]
    fn test_max_and_min_reducers() {
        let schema = StateSchema::new()
            .field("best", ReducerType::Max)
            .field("cheapest", ReducerType::Min);
        let mut state = WorkflowState::new(&schema);

        for v in [5.0, 3.0, 8.0] {
            state.update("best", json!(v));
            state.update("cheapest", json!(v));
        }
        assert_eq!(state.get("best"), Some(&json!(8.0)));
        assert_eq!(state.get("cheapest"), Some(&json!(3.0)));
    }

    #[test]
    fn test_merge_reducer() {
        let mut state = WorkflowState::new(&schema_with("meta", ReducerType::Merge));

        state.update("meta", json!({"a": 1}));
        state.update("meta", json!({"b": 2}));
        state.update("meta", json!({"a": 10}));
        assert_eq!(state.get("meta"), Some(&json!({"a": 10, "b": 2})));
    }

    #[test]
    fn test_require_reports_missing_and_invalid() {
        let mut state = WorkflowState::empty();
        state.update("count", json!("three"));

        match state.require::<u32>("absent") {
            Err(StageflowError::MissingField { field }) => assert_eq!(field, "absent"),
            other => panic!("expected MissingField, got {:?}", other),
        }
        match state.require::<u32>("count") {
            Err(StageflowError::InvalidField { field, .. }) => assert_eq!(field, "count"),
            other => panic!("expected InvalidField, got {:?}", other),
        }
    }

    #[test]
    fn test_state_serialization_keeps_reducers() {
        let mut state = WorkflowState::new(&schema_with("items", ReducerType::Append));
        state.update("items", json!("a"));

        let json = serde_json::to_string(&state).unwrap();
        let mut restored: WorkflowState = serde_json::from_str(&json).unwrap();
        restored.update("items", json!("b"));

        assert_eq!(restored.get("items"), Some(&json!(["a", "b"])));
    }
}
