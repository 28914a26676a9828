//! The metadata registry.
//!
//! [`Registry`] is a side-table holding everything declared about each model
//! class: model options, attributes, associations and validation rules.
//! Writers merge into what is already there; readers walk the class's
//! inheritance chain root-first so subclass declarations override per key.
//!
//! All reads and writes are synchronous and short, so a `RwLock` is enough.
//! No lock is ever held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::association::{Association, AssociationOptions, ModelAssociations};
use crate::attribute::{Attribute, AttributeOptions, ModelAttributes};
use crate::error::{Error, ResolutionError, Result};
use crate::model::{ClassId, ModelClass, ModelOptions};
use crate::property::{ModelProperty, Properties};
use crate::validate::{ModelValidation, ValidationRule};

/// Everything declared directly on one class.
#[derive(Debug, Default)]
struct ClassMetadata {
    parent: Option<ModelClass>,
    options: Option<ModelOptions>,
    attributes: ModelAttributes,
    associations: ModelAssociations,
    validations: BTreeMap<String, Vec<ValidationRule>>,
    model_validations: Vec<ModelValidation>,
}

/// Side-table of model metadata keyed by class identity.
#[derive(Debug, Default)]
pub struct Registry {
    classes: RwLock<HashMap<ClassId, ClassMetadata>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Arc<Registry> {
        static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Registry::new()))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ClassId, ClassMetadata>> {
        self.classes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ClassId, ClassMetadata>> {
        self.classes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new, empty model class.
    pub fn register_class(&self, type_name: &str) -> ModelClass {
        let class = ModelClass::new(type_name);
        self.write().insert(class.id(), ClassMetadata::default());
        tracing::trace!(model = %type_name, "Registered model class");
        class
    }

    /// Register a class inheriting everything declared on `parent`.
    pub fn register_subclass(&self, parent: &ModelClass, type_name: &str) -> Result<ModelClass> {
        let mut classes = self.write();
        if !classes.contains_key(&parent.id()) {
            return Err(unknown_class(parent));
        }

        let class = ModelClass::new(type_name);
        classes.insert(
            class.id(),
            ClassMetadata {
                parent: Some(parent.clone()),
                ..ClassMetadata::default()
            },
        );
        tracing::trace!(model = %type_name, parent = %parent, "Registered model subclass");
        Ok(class)
    }

    /// Whether the class belongs to this registry.
    pub fn contains(&self, class: &ModelClass) -> bool {
        self.read().contains_key(&class.id())
    }

    fn update<F>(&self, class: &ModelClass, f: F) -> Result<()>
    where
        F: FnOnce(&mut ClassMetadata),
    {
        let mut classes = self.write();
        let metadata = classes
            .get_mut(&class.id())
            .ok_or_else(|| unknown_class(class))?;
        f(metadata);
        Ok(())
    }

    /// Collect a class's inheritance chain, root first.
    fn chain<'a>(
        classes: &'a HashMap<ClassId, ClassMetadata>,
        class: &ModelClass,
    ) -> Vec<&'a ClassMetadata> {
        let mut chain = Vec::new();
        let mut next = Some(class.id());
        while let Some(id) = next {
            match classes.get(&id) {
                Some(metadata) => {
                    next = metadata.parent.as_ref().map(ModelClass::id);
                    chain.push(metadata);
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Merge model options into the class's options.
    pub fn define_model_options(&self, class: &ModelClass, options: ModelOptions) -> Result<()> {
        tracing::debug!(model = %class, name = ?options.name, "Defining model options");
        self.update(class, |metadata| {
            metadata
                .options
                .get_or_insert_with(ModelOptions::default)
                .merge(options);
        })
    }

    /// Merge options into the attribute `key`.
    pub fn define_attribute(
        &self,
        class: &ModelClass,
        key: &str,
        options: AttributeOptions,
    ) -> Result<()> {
        tracing::debug!(
            model = %class,
            key = %key,
            attr_type = ?options.attr_type.as_ref().map(|t| t.kind()),
            "Defining attribute"
        );
        self.update(class, |metadata| {
            metadata
                .attributes
                .entry(key.to_string())
                .or_default()
                .merge(options);
        })
    }

    /// Merge options into the association `key`.
    pub fn define_association(
        &self,
        class: &ModelClass,
        key: &str,
        options: AssociationOptions,
    ) -> Result<()> {
        tracing::debug!(
            model = %class,
            key = %key,
            kind = ?options.kind,
            "Defining association"
        );
        self.update(class, |metadata| {
            metadata
                .associations
                .entry(key.to_string())
                .or_default()
                .merge(options);
        })
    }

    /// Append a validation rule to the attribute `key`.
    pub fn define_attribute_validation(
        &self,
        class: &ModelClass,
        key: &str,
        rule: ValidationRule,
    ) -> Result<()> {
        tracing::debug!(model = %class, key = %key, rule = %rule.name(), "Defining attribute validation");
        self.update(class, |metadata| {
            metadata
                .validations
                .entry(key.to_string())
                .or_default()
                .push(rule);
        })
    }

    /// Append a model-level validation.
    pub fn define_model_validation(&self, class: &ModelClass, rule: ModelValidation) -> Result<()> {
        tracing::debug!(model = %class, "Defining model validation");
        self.update(class, |metadata| metadata.model_validations.push(rule))
    }

    /// Model options, merged along the inheritance chain. Empty if none were
    /// declared.
    pub fn get_model_options(&self, class: &ModelClass) -> ModelOptions {
        let classes = self.read();
        let mut options = ModelOptions::default();
        for metadata in Self::chain(&classes, class) {
            if let Some(declared) = &metadata.options {
                options.merge(declared.clone());
            }
        }
        options
    }

    /// Whether model options were declared anywhere on the chain.
    pub fn has_model_options(&self, class: &ModelClass) -> bool {
        let classes = self.read();
        Self::chain(&classes, class)
            .iter()
            .any(|metadata| metadata.options.is_some())
    }

    /// The model name: the declared name, or the type name.
    pub fn model_name(&self, class: &ModelClass) -> String {
        self.get_model_options(class)
            .name
            .unwrap_or_else(|| class.type_name().to_string())
    }

    /// Declared attributes. Entries that never received a type are omitted.
    pub fn get_attributes(&self, class: &ModelClass) -> ModelAttributes {
        let classes = self.read();
        let mut attributes = ModelAttributes::new();
        for metadata in Self::chain(&classes, class) {
            for (key, options) in &metadata.attributes {
                attributes
                    .entry(key.clone())
                    .or_default()
                    .merge(options.clone());
            }
        }
        attributes.retain(|_, options| options.attr_type.is_some());
        attributes
    }

    /// Declared associations. Entries that never received a kind are omitted.
    pub fn get_associations(&self, class: &ModelClass) -> ModelAssociations {
        let classes = self.read();
        let mut associations = ModelAssociations::new();
        for metadata in Self::chain(&classes, class) {
            for (key, options) in &metadata.associations {
                associations
                    .entry(key.clone())
                    .or_default()
                    .merge(options.clone());
            }
        }
        associations.retain(|_, options| options.kind.is_some());
        associations
    }

    /// Rules attached to the attribute `key`, parent rules first.
    pub fn get_attribute_validations(&self, class: &ModelClass, key: &str) -> Vec<ValidationRule> {
        let classes = self.read();
        Self::chain(&classes, class)
            .into_iter()
            .filter_map(|metadata| metadata.validations.get(key))
            .flatten()
            .cloned()
            .collect()
    }

    /// Rules for every attribute that has any.
    pub fn get_all_attribute_validations(
        &self,
        class: &ModelClass,
    ) -> BTreeMap<String, Vec<ValidationRule>> {
        let classes = self.read();
        let mut validations: BTreeMap<String, Vec<ValidationRule>> = BTreeMap::new();
        for metadata in Self::chain(&classes, class) {
            for (key, rules) in &metadata.validations {
                validations
                    .entry(key.clone())
                    .or_default()
                    .extend(rules.iter().cloned());
            }
        }
        validations
    }

    /// Model-level validations, parent rules first.
    pub fn get_model_validations(&self, class: &ModelClass) -> Vec<ModelValidation> {
        let classes = self.read();
        Self::chain(&classes, class)
            .into_iter()
            .flat_map(|metadata| metadata.model_validations.iter().cloned())
            .collect()
    }

    /// Attributes and associations as [`Properties`].
    ///
    /// A key declared as both resolves to the association.
    pub fn get_properties(&self, class: &ModelClass) -> Properties {
        let mut entries = BTreeMap::new();
        for (key, options) in self.get_attributes(class) {
            if let Some(attr_type) = options.attr_type {
                let property = ModelProperty::Attribute(Attribute::new(key.clone(), attr_type));
                entries.insert(key, property);
            }
        }
        for (key, options) in self.get_associations(class) {
            if let Some(kind) = options.kind {
                let property = ModelProperty::Association(Association::new(key.clone(), kind));
                entries.insert(key, property);
            }
        }
        Properties::new(self.model_name(class), entries)
    }

    /// Resolve the target of an association being followed.
    pub(crate) fn resolve_target(
        &self,
        class: &ModelClass,
        key: &str,
        options: &AssociationOptions,
    ) -> Result<ModelClass> {
        match options.target.as_ref().and_then(|t| t.resolve()) {
            Some(target) => Ok(target),
            None => {
                tracing::warn!(
                    model = %class,
                    key = %key,
                    lazy = options.target.as_ref().is_some_and(|t| t.is_lazy_load()),
                    "Association target could not be resolved"
                );
                Err(Error::Resolution(ResolutionError {
                    model: class.type_name().to_string(),
                    key: key.to_string(),
                }))
            }
        }
    }
}

fn unknown_class(class: &ModelClass) -> Error {
    Error::declaration(format!(
        "{} is not registered in this registry",
        class.type_name()
    ))
}
