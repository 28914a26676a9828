//! Model classes and their declaration.
//!
//! A [`ModelClass`] is a type identity. Everything known about it lives in a
//! [`Registry`]; declarations are made once, with [`Registry::declare`],
//! before any instance is serialized or validated.
//!
//! # Example
//!
//! ```
//! use modelsafe_core::{AttributeOptions, AssociationOptions, Registry, HAS_MANY, INTEGER, STRING};
//!
//! let registry = Registry::new();
//!
//! let comment = registry
//!     .declare("Comment", |m| {
//!         m.attribute("id", AttributeOptions::new(INTEGER).primary());
//!         m.attribute("message", AttributeOptions::new(STRING));
//!     })
//!     .unwrap();
//!
//! let user = registry
//!     .declare("User", |m| {
//!         m.attribute("name", AttributeOptions::new(STRING));
//!         m.association("comments", AssociationOptions::new(HAS_MANY).target(&comment));
//!     })
//!     .unwrap();
//!
//! assert_eq!(registry.get_model_options(&user).name.as_deref(), Some("user"));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use crate::association::{AssociationKind, AssociationOptions, AssociationTarget};
use crate::attribute::AttributeOptions;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::metadata::Registry;
use crate::property::{ModelProperty, Properties, Property};
use crate::validate::{ModelValidation, ValidationRule};
use crate::value::Value;

/// Process-wide source of class identities, so handles from different
/// registries never collide.
static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a model class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    pub(crate) fn next() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// A handle to a model class.
///
/// Cheap to clone. Equality and hashing are by identity; two classes with
/// the same type name are still different classes.
#[derive(Clone)]
pub struct ModelClass {
    id: ClassId,
    type_name: Arc<str>,
}

impl ModelClass {
    pub(crate) fn new(type_name: &str) -> Self {
        Self {
            id: ClassId::next(),
            type_name: Arc::from(type_name),
        }
    }

    /// The class identity.
    pub const fn id(&self) -> ClassId {
        self.id
    }

    /// The declared type name, e.g. `"User"`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl PartialEq for ModelClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModelClass {}

impl Hash for ModelClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelClass({}#{})", self.type_name, self.id.0)
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name)
    }
}

/// Options declared for a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// The model name. Defaults to the camelCased type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ModelOptions {
    /// Options with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Merge later options on top of these.
    pub fn merge(&mut self, other: ModelOptions) {
        if other.name.is_some() {
            self.name = other.name;
        }
    }
}

/// Guess a model name from a type name.
///
/// The name is split on case changes and underscores, then joined in
/// camelCase. A trailing run of digits stays attached to its word.
///
/// ```
/// use modelsafe_core::guess_model_name;
///
/// assert_eq!(guess_model_name("ANiceModelName"), "aNiceModelName");
/// assert_eq!(guess_model_name("thisISA_WEIRD_ModelName"), "thisIsaWeirdModelName");
/// assert_eq!(guess_model_name("This_Is_Even_Weirder123"), "thisIsEvenWeirder123");
/// ```
pub fn guess_model_name(type_name: &str) -> String {
    type_name.to_case(Case::Camel)
}

/// A recorded declaration, applied in order by [`Registry::declare`].
enum Declaration {
    Attribute(String, AttributeOptions),
    Association(String, AssociationOptions),
    Validation(String, ValidationRule),
    ModelValidation(ModelValidation),
}

/// Collects the declarations for one model class.
#[derive(Default)]
pub struct ModelBuilder {
    options: ModelOptions,
    declarations: Vec<Declaration>,
}

impl ModelBuilder {
    /// Override the guessed model name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.options.name = Some(name.into());
        self
    }

    /// Declare (or extend) an attribute.
    pub fn attribute(&mut self, key: impl Into<String>, options: AttributeOptions) -> &mut Self {
        self.declarations
            .push(Declaration::Attribute(key.into(), options));
        self
    }

    /// Declare (or extend) an association.
    pub fn association(
        &mut self,
        key: impl Into<String>,
        options: AssociationOptions,
    ) -> &mut Self {
        self.declarations
            .push(Declaration::Association(key.into(), options));
        self
    }

    /// Attach a validation rule to an attribute. Rules run in the order they
    /// are attached.
    pub fn validate(&mut self, key: impl Into<String>, rule: ValidationRule) -> &mut Self {
        self.declarations
            .push(Declaration::Validation(key.into(), rule));
        self
    }

    /// Attach a model-level validation.
    pub fn validate_model(&mut self, rule: ModelValidation) -> &mut Self {
        self.declarations.push(Declaration::ModelValidation(rule));
        self
    }
}

/// Options for [`Registry::construct`].
#[derive(Debug, Clone, Copy)]
pub struct ConstructOptions {
    /// Assign declared default values before applying data.
    pub defaults: bool,
}

impl Default for ConstructOptions {
    fn default() -> Self {
        Self { defaults: true }
    }
}

impl ConstructOptions {
    /// Enable or disable default values.
    pub fn defaults(mut self, value: bool) -> Self {
        self.defaults = value;
        self
    }
}

impl Registry {
    /// Register and declare a model class in one step.
    ///
    /// The model name is guessed from `type_name` unless the builder sets
    /// one explicitly.
    pub fn declare<F>(&self, type_name: &str, build: F) -> Result<ModelClass>
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let class = self.register_class(type_name);
        self.apply_declarations(&class, build)?;
        Ok(class)
    }

    /// Register and declare a subclass. The subclass sees all of the parent's
    /// metadata; its own declarations override per key.
    pub fn declare_subclass<F>(
        &self,
        parent: &ModelClass,
        type_name: &str,
        build: F,
    ) -> Result<ModelClass>
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let class = self.register_subclass(parent, type_name)?;
        self.apply_declarations(&class, build)?;
        Ok(class)
    }

    fn apply_declarations<F>(&self, class: &ModelClass, build: F) -> Result<()>
    where
        F: FnOnce(&mut ModelBuilder),
    {
        let mut builder = ModelBuilder::default();
        build(&mut builder);

        let mut options = ModelOptions::named(guess_model_name(class.type_name()));
        options.merge(builder.options);
        self.define_model_options(class, options)?;

        for declaration in builder.declarations {
            match declaration {
                Declaration::Attribute(key, options) => {
                    self.define_attribute(class, &key, options)?;
                }
                Declaration::Association(key, options) => {
                    self.define_association(class, &key, options)?;
                }
                Declaration::Validation(key, rule) => {
                    self.define_attribute_validation(class, &key, rule)?;
                }
                Declaration::ModelValidation(rule) => {
                    self.define_model_validation(class, rule)?;
                }
            }
        }
        Ok(())
    }

    /// Construct a new instance.
    ///
    /// When `options.defaults` is set, every declared default is assigned
    /// first. `data` (an object; anything else counts as no data) is then
    /// deep-merged on top, so caller data always wins.
    pub fn construct(
        &self,
        class: &ModelClass,
        data: impl Into<Value>,
        options: ConstructOptions,
    ) -> Instance {
        let mut instance = Instance::new(class.clone());

        if options.defaults {
            for (key, attribute) in self.get_attributes(class) {
                if let Some(default) = &attribute.default_value {
                    instance.set(key, default.resolve());
                }
            }
        }

        if let Value::Object(data) = data.into() {
            for (key, value) in data {
                instance.merge(key, value);
            }
        }

        instance
    }

    /// Construct an instance holding only its default values.
    pub fn new_instance(&self, class: &ModelClass) -> Instance {
        self.construct(class, Value::Null, ConstructOptions::default())
    }

    /// Bind (or re-bind) an association's target after declaration.
    ///
    /// `map` receives the class's properties and returns the property the
    /// association lives under, plus the new target. Without an explicit
    /// `kind`, the previously declared kind is kept; a property that was
    /// never declared as an association needs an explicit `kind`.
    pub fn associate<F>(
        &self,
        class: &ModelClass,
        map: F,
        kind: Option<AssociationKind>,
    ) -> Result<()>
    where
        F: FnOnce(&Properties) -> Result<(ModelProperty, AssociationTarget)>,
    {
        let properties = self.get_properties(class);
        let (property, target) = map(&properties)?;
        let key = property.path().to_string();

        let previous = self
            .get_associations(class)
            .get(&key)
            .and_then(AssociationOptions::kind);
        let kind = kind.or(previous).ok_or_else(|| {
            Error::declaration(format!(
                "{}.{} is not an association; an association kind is required",
                class.type_name(),
                key
            ))
        })?;

        tracing::debug!(
            model = %class.type_name(),
            key = %key,
            kind = %kind,
            lazy = target.is_lazy_load(),
            "Re-associating"
        );

        self.define_association(
            class,
            &key,
            AssociationOptions {
                kind: Some(kind),
                read_only: None,
                target: Some(target),
            },
        )
    }
}
