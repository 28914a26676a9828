//! A safe: a collection of declared models keyed by model name.
//!
//! Code that receives models from elsewhere can check a safe to confirm a
//! model was declared before interacting with its properties.

use std::collections::BTreeMap;
use std::sync::Arc;

use modelsafe_core::{Error, ModelClass, Properties, Registry, Result};

/// Models defined for interaction, keyed by model name.
#[derive(Debug, Clone)]
pub struct Safe {
    /// Where model names and properties are read from.
    registry: Arc<Registry>,
    models: BTreeMap<String, ModelClass>,
}

impl Default for Safe {
    fn default() -> Self {
        Self::new(Arc::clone(Registry::global()))
    }
}

impl Safe {
    /// Create an empty safe reading metadata from `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            models: BTreeMap::new(),
        }
    }

    /// The registry this safe reads from.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Whether a model with this class's name has been defined.
    pub fn is_defined(&self, class: &ModelClass) -> bool {
        self.registry
            .get_model_options(class)
            .name
            .is_some_and(|name| self.models.contains_key(&name))
    }

    /// Define a model on the safe.
    ///
    /// The class must have a declared model name. Defining a name twice keeps
    /// the first class.
    pub fn define(&mut self, class: &ModelClass) -> Result<&mut Self> {
        let Some(name) = self.registry.get_model_options(class).name else {
            return Err(Error::declaration(format!(
                "{} must be declared with a model name to be defined on a safe",
                class.type_name()
            )));
        };

        if !self.models.contains_key(&name) {
            tracing::debug!(model = %name, "Defining model on safe");
            self.models.insert(name, class.clone());
        }
        Ok(self)
    }

    /// Map over a defined model's properties.
    pub fn interact<U, F>(&self, class: &ModelClass, map: F) -> Result<U>
    where
        F: FnOnce(&Properties) -> U,
    {
        if !self.is_defined(class) {
            return Err(Error::declaration(format!(
                "{} must be defined on the safe before interacting with it",
                class.type_name()
            )));
        }
        Ok(map(&self.registry.get_properties(class)))
    }

    /// The defined models, keyed by model name.
    pub fn models(&self) -> &BTreeMap<String, ModelClass> {
        &self.models
    }

    /// Look up a defined model by name.
    pub fn model(&self, name: &str) -> Option<&ModelClass> {
        self.models.get(name)
    }
}
