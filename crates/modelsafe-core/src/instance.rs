//! Model instances.
//!
//! Provides `Instance`, a value of some [`ModelClass`] whose members are held
//! in a map keyed by property name.

use std::collections::BTreeMap;

use crate::model::ModelClass;
use crate::value::Value;

/// A value of a model class.
///
/// Recognized attribute and association keys are either populated or absent.
/// Unrecognized keys may be stored as well; every lifecycle operation
/// ignores them.
///
/// # Example
///
/// ```
/// use modelsafe_core::{Instance, Registry, Value};
///
/// let registry = Registry::new();
/// let user = registry.register_class("User");
///
/// let mut instance = Instance::new(user);
/// instance.set("name", "Alice");
///
/// assert_eq!(instance.get("name").and_then(Value::as_str), Some("Alice"));
/// assert!(!instance.has("email"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// The instance's model class.
    class: ModelClass,
    /// Current values by property key.
    values: BTreeMap<String, Value>,
}

impl Instance {
    /// Create an empty instance of a class.
    pub fn new(class: ModelClass) -> Self {
        Self {
            class,
            values: BTreeMap::new(),
        }
    }

    /// Create an instance with initial values.
    pub fn with_values(class: ModelClass, values: BTreeMap<String, Value>) -> Self {
        Self { class, values }
    }

    /// The model class of this instance.
    pub fn class(&self) -> &ModelClass {
        &self.class
    }

    /// Set a property value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a property value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a mutable reference to a property value.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    /// Remove a value, returning it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Check if a property has a value stored (null counts as stored).
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Check if a property is absent or null.
    pub fn is_absent(&self, key: &str) -> bool {
        self.values.get(key).is_none_or(Value::is_null)
    }

    /// Deep-merge a value onto a property; see [`Value::merge`].
    pub fn merge(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.values.get_mut(&key) {
            Some(existing) => existing.merge(value),
            None => {
                self.values.insert(key, value);
            }
        }
    }

    /// Property keys currently stored.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// All stored values.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Consume the instance, returning its values.
    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }

    /// Borrow a related single-valued association.
    pub fn related(&self, key: &str) -> Option<&Instance> {
        self.get(key).and_then(Value::as_instance)
    }

    /// Iterate a related collection-valued association.
    ///
    /// Elements that are not model instances are skipped.
    pub fn related_many(&self, key: &str) -> impl Iterator<Item = &Instance> {
        self.get(key)
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_instance)
    }
}
