//! Association metadata for ModelSafe Rust.
//!
//! Associations relate one model class to another. The target is either a
//! direct class handle or a deferred resolver, which lets mutually
//! referencing models be declared in any order and bound later with
//! `Registry::associate`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::ModelClass;
use crate::property::Property;

/// The type of association between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// One-to-one: a `User` has one `Profile`.
    HasOne,
    /// One-to-many: a `User` has many `Comment`s.
    HasMany,
    /// Many-to-one: many `Comment`s belong to one `User`.
    BelongsTo,
    /// Many-to-many: `User`s belong to many `Group`s.
    BelongsToMany,
}

/// `AssociationKind::HasOne`.
pub const HAS_ONE: AssociationKind = AssociationKind::HasOne;
/// `AssociationKind::HasMany`.
pub const HAS_MANY: AssociationKind = AssociationKind::HasMany;
/// `AssociationKind::BelongsTo`.
pub const BELONGS_TO: AssociationKind = AssociationKind::BelongsTo;
/// `AssociationKind::BelongsToMany`.
pub const BELONGS_TO_MANY: AssociationKind = AssociationKind::BelongsToMany;

impl AssociationKind {
    /// Whether the property holds a sequence of related instances.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, AssociationKind::HasMany | AssociationKind::BelongsToMany)
    }

    /// Name used in logs and messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AssociationKind::HasOne => "HAS_ONE",
            AssociationKind::HasMany => "HAS_MANY",
            AssociationKind::BelongsTo => "BELONGS_TO",
            AssociationKind::BelongsToMany => "BELONGS_TO_MANY",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolver for a deferred association target.
pub type TargetResolver = Arc<dyn Fn() -> Option<ModelClass> + Send + Sync>;

/// The model an association points at.
#[derive(Clone)]
pub enum AssociationTarget {
    /// A known model class.
    Direct(ModelClass),
    /// A resolver invoked whenever the association is followed.
    Deferred(TargetResolver),
}

impl AssociationTarget {
    /// A deferred target.
    pub fn deferred<F>(resolver: F) -> Self
    where
        F: Fn() -> Option<ModelClass> + Send + Sync + 'static,
    {
        AssociationTarget::Deferred(Arc::new(resolver))
    }

    /// Whether resolving requires invoking a resolver.
    pub const fn is_lazy_load(&self) -> bool {
        matches!(self, AssociationTarget::Deferred(_))
    }

    /// Resolve to a model class, if possible.
    pub fn resolve(&self) -> Option<ModelClass> {
        match self {
            AssociationTarget::Direct(class) => Some(class.clone()),
            AssociationTarget::Deferred(resolver) => resolver(),
        }
    }
}

impl From<ModelClass> for AssociationTarget {
    fn from(class: ModelClass) -> Self {
        AssociationTarget::Direct(class)
    }
}

impl From<&ModelClass> for AssociationTarget {
    fn from(class: &ModelClass) -> Self {
        AssociationTarget::Direct(class.clone())
    }
}

impl fmt::Debug for AssociationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationTarget::Direct(class) => f.debug_tuple("Direct").field(class).finish(),
            AssociationTarget::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Whether a target must be resolved lazily.
///
/// Targets are a tagged variant, so this never needs to run user code.
pub fn is_lazy_load(target: &AssociationTarget) -> bool {
    target.is_lazy_load()
}

/// Options declared for an association.
///
/// As with attributes, each field is optional so repeated declarations merge
/// field by field. The association's key is the entry it is stored under in
/// the model's association map, not a field here.
#[derive(Debug, Clone, Default)]
pub struct AssociationOptions {
    /// Kind of association. An entry without a kind is not an association.
    pub kind: Option<AssociationKind>,
    /// Whether the association is read-only.
    pub read_only: Option<bool>,
    /// The target model. May be left unset and bound later.
    pub target: Option<AssociationTarget>,
}

impl AssociationOptions {
    /// Options for an association of the given kind, without a target yet.
    #[must_use]
    pub fn new(kind: AssociationKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Set a direct target.
    #[must_use]
    pub fn target(mut self, target: impl Into<AssociationTarget>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set a deferred target.
    #[must_use]
    pub fn deferred<F>(mut self, resolver: F) -> Self
    where
        F: Fn() -> Option<ModelClass> + Send + Sync + 'static,
    {
        self.target = Some(AssociationTarget::deferred(resolver));
        self
    }

    /// Mark the association read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }

    /// The association kind, if declared.
    pub fn kind(&self) -> Option<AssociationKind> {
        self.kind
    }

    /// Whether the association is read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only.unwrap_or(false)
    }

    /// Whether the property holds a sequence.
    pub fn is_collection(&self) -> bool {
        self.kind.is_some_and(|k| k.is_collection())
    }

    /// Merge a later declaration on top of this one.
    pub fn merge(&mut self, other: AssociationOptions) {
        if other.kind.is_some() {
            self.kind = other.kind;
        }
        if other.read_only.is_some() {
            self.read_only = other.read_only;
        }
        if other.target.is_some() {
            self.target = other.target;
        }
    }
}

/// The associations declared on a model, keyed by property.
pub type ModelAssociations = BTreeMap<String, AssociationOptions>;

/// An association of a model, as handed to property mappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    name: String,
    kind: AssociationKind,
}

impl Association {
    /// Create an association property.
    pub fn new(name: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// The association kind.
    pub const fn kind(&self) -> AssociationKind {
        self.kind
    }
}

impl Property for Association {
    fn path(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
