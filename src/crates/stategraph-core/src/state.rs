//! State schema and reducers
//!
//! State is a JSON object. Every field is declared once on a [`StateSchema`]
//! together with its merge policy:
//!
//! | Policy | Reducer | Behaviour |
//! |--------|---------|-----------|
//! | [`FieldPolicy::Overwrite`] | [`OverwriteReducer`] | last writer wins |
//! | [`FieldPolicy::Append`] | [`AppendReducer`] | values concatenated in insertion order |
//!
//! Nodes return a *partial state*: an object holding a subset of the declared
//! fields, or `null` for "nothing to write". [`StateSchema::merge`] folds a
//! partial into the current state. Fields the schema does not declare are
//! rejected, never dropped.
//!
//! ```rust
//! use stategraph_core::state::StateSchema;
//! use serde_json::json;
//!
//! let schema = StateSchema::new()
//!     .field("status")
//!     .append_field("messages")
//!     .with_default("cycles", json!(0));
//!
//! let state = schema.initial_state(&json!({"messages": ["hi"]})).unwrap();
//! assert_eq!(state, json!({"messages": ["hi"], "cycles": 0}));
//!
//! let state = schema
//!     .merge(&state, &json!({"messages": ["there"], "status": "done"}))
//!     .unwrap();
//! assert_eq!(state["messages"], json!(["hi", "there"]));
//! assert_eq!(state["status"], "done");
//!
//! assert!(schema.merge(&state, &json!({"unknown": 1})).is_err());
//! ```

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while validating or merging state
#[derive(Debug, Error)]
pub enum StateError {
    /// State or partial state is not a JSON object
    #[error("Invalid state: expected an object, got {0}")]
    NotAnObject(String),

    /// A partial state names a field the schema does not declare
    #[error("Unknown state field '{0}'")]
    UnknownField(String),

    /// A node wrote a field it did not declare as one of its outputs
    #[error("Node '{node}' wrote undeclared field '{field}'")]
    UndeclaredWrite { node: String, field: String },

    /// Reducer encountered incompatible values
    #[error("Reducer '{reducer}' failed on field '{field}': {error}")]
    Reducer {
        reducer: String,
        field: String,
        error: String,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// How concurrent or successive writes to one field combine
pub trait Reducer: Send + Sync {
    /// Fold `update` into `current` (which is `null` when the field is unset).
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String>;

    fn name(&self) -> &str;
}

/// Replaces the current value with the update
#[derive(Debug, Clone, Copy)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> std::result::Result<Value, String> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Concatenates the update onto the current sequence
///
/// - Array + Array: concatenation
/// - Array + scalar: the scalar is pushed as one element
/// - Null current: treated as an empty sequence
/// - Null update: nothing is appended
#[derive(Debug, Clone, Copy)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        let mut result = match current {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => return Err(format!("current value is not a sequence: {}", other)),
        };

        match update {
            Value::Array(items) => result.extend(items.iter().cloned()),
            Value::Null => {}
            single => result.push(single.clone()),
        }
        Ok(Value::Array(result))
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Merge policy of a declared field, fixed when the schema is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    Overwrite,
    Append,
}

impl FieldPolicy {
    pub fn reducer(&self) -> &'static dyn Reducer {
        match self {
            FieldPolicy::Overwrite => &OverwriteReducer,
            FieldPolicy::Append => &AppendReducer,
        }
    }
}

#[derive(Debug, Clone)]
struct FieldSpec {
    policy: FieldPolicy,
    default: Option<Value>,
}

/// Declared fields of a graph's state with their merge policies and defaults
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an overwrite field.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.declare(name.into(), FieldPolicy::Overwrite)
    }

    /// Declare an append field. Fresh state starts it as an empty sequence.
    pub fn append_field(self, name: impl Into<String>) -> Self {
        self.declare(name.into(), FieldPolicy::Append)
    }

    /// Set the value a field takes in fresh state. Declares the field as an
    /// overwrite field if it is not declared yet.
    pub fn with_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields
            .entry(name.into())
            .or_insert(FieldSpec {
                policy: FieldPolicy::Overwrite,
                default: None,
            })
            .default = Some(value);
        self
    }

    fn declare(mut self, name: String, policy: FieldPolicy) -> Self {
        let spec = self.fields.entry(name).or_insert(FieldSpec {
            policy,
            default: None,
        });
        spec.policy = policy;
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn policy(&self, name: &str) -> Option<FieldPolicy> {
        self.fields.get(name).map(|spec| spec.policy)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that `partial` is `null` or an object of declared fields.
    pub fn check_partial(&self, partial: &Value) -> Result<()> {
        match partial {
            Value::Null => Ok(()),
            Value::Object(map) => {
                for key in map.keys() {
                    if !self.fields.contains_key(key) {
                        return Err(StateError::UnknownField(key.clone()));
                    }
                }
                Ok(())
            }
            other => Err(StateError::NotAnObject(type_name(other).to_string())),
        }
    }

    /// Fold a partial state into `state`, field by field.
    ///
    /// Overwrite fields take the partial's value when present and keep the
    /// old one otherwise. Append fields concatenate the partial's sequence
    /// onto the old one; an absent field appends nothing.
    pub fn merge(&self, state: &Value, partial: &Value) -> Result<Value> {
        self.check_partial(partial)?;

        let mut merged = match state {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => return Err(StateError::NotAnObject(type_name(other).to_string())),
        };

        if let Value::Object(updates) = partial {
            for (key, update) in updates {
                let Some(spec) = self.fields.get(key) else {
                    return Err(StateError::UnknownField(key.clone()));
                };
                let reducer = spec.policy.reducer();
                let current = merged.get(key).unwrap_or(&Value::Null);
                let value = reducer
                    .reduce(current, update)
                    .map_err(|error| StateError::Reducer {
                        reducer: reducer.name().to_string(),
                        field: key.clone(),
                        error,
                    })?;
                merged.insert(key.clone(), value);
            }
        }

        Ok(Value::Object(merged))
    }

    /// Fresh state for a new run: defaults first, then `input` merged on top.
    pub fn initial_state(&self, input: &Value) -> Result<Value> {
        let mut base = Map::new();
        for (name, spec) in &self.fields {
            match (&spec.default, spec.policy) {
                (Some(default), _) => {
                    base.insert(name.clone(), default.clone());
                }
                (None, FieldPolicy::Append) => {
                    base.insert(name.clone(), Value::Array(Vec::new()));
                }
                (None, FieldPolicy::Overwrite) => {}
            }
        }
        self.merge(&Value::Object(base), input)
    }

    /// Keep only the fields of `state` this schema declares.
    pub fn project(&self, state: &Value) -> Value {
        let map = match state {
            Value::Object(map) => map
                .iter()
                .filter(|(key, _)| self.fields.contains_key(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            _ => Map::new(),
        };
        Value::Object(map)
    }
}

/// Keep only `fields` of `state`.
pub(crate) fn select_fields(state: &Value, fields: &[String]) -> Value {
    let mut selected = Map::new();
    for field in fields {
        if let Some(value) = state.get(field) {
            selected.insert(field.clone(), value.clone());
        }
    }
    Value::Object(selected)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
