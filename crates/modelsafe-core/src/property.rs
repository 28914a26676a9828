//! Model properties: the named members of a model.

use std::collections::BTreeMap;
use std::fmt;

use crate::association::Association;
use crate::attribute::Attribute;
use crate::error::{Error, Result};

/// A named member of a model: an attribute or an association.
pub trait Property {
    /// The property's path (its key on the model).
    fn path(&self) -> &str;
}

/// Either kind of model property.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelProperty {
    Attribute(Attribute),
    Association(Association),
}

impl ModelProperty {
    /// Is this an attribute?
    pub const fn is_attribute(&self) -> bool {
        matches!(self, ModelProperty::Attribute(_))
    }

    /// Is this an association?
    pub const fn is_association(&self) -> bool {
        matches!(self, ModelProperty::Association(_))
    }
}

impl Property for ModelProperty {
    fn path(&self) -> &str {
        match self {
            ModelProperty::Attribute(a) => a.path(),
            ModelProperty::Association(a) => a.path(),
        }
    }
}

impl fmt::Display for ModelProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// All properties of a model, keyed by path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    model: String,
    entries: BTreeMap<String, ModelProperty>,
}

impl Properties {
    pub(crate) fn new(model: impl Into<String>, entries: BTreeMap<String, ModelProperty>) -> Self {
        Self {
            model: model.into(),
            entries,
        }
    }

    /// Look up a property.
    pub fn get(&self, key: &str) -> Option<&ModelProperty> {
        self.entries.get(key)
    }

    /// Look up a property that must exist.
    pub fn property(&self, key: &str) -> Result<ModelProperty> {
        self.entries.get(key).cloned().ok_or_else(|| {
            Error::declaration(format!("{} has no property named '{}'", self.model, key))
        })
    }

    /// Check whether a property exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Property keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate all properties.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelProperty)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the model has no properties.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
