//! Core types and engine for ModelSafe Rust.
//!
//! `modelsafe-core` is the **foundation layer** of the workspace. It lets a
//! developer declare typed attributes and associations on model classes, and
//! then moves instances of those classes between their in-memory form and
//! plain data.
//!
//! # Role In The Architecture
//!
//! - **Metadata registry**: [`Registry`] is an explicit side-table keyed by
//!   [`ModelClass`] identity and member name. Declarations are written once at
//!   startup and read by everything else.
//! - **Type model**: [`AttributeType`] and [`AssociationKind`] describe what a
//!   member holds; [`ValidationRule`] describes extra checks on attributes.
//! - **Lifecycle engine**: construction, recursive serialize/deserialize and
//!   full-instance validation with error aggregation.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync
//!   so every async lifecycle operation is cancel-correct and budget-aware.
//!
//! # Who Uses This Crate
//!
//! - The `modelsafe` facade re-exports everything here and adds the `Safe`
//!   model registry.
//! - Persistence integrations read metadata (`get_attributes`,
//!   `get_associations`, ...) to map models onto their storage, and call
//!   `serialize`/`deserialize`/`validate` at the boundary.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

/// Unwrap an `Outcome`, returning early from the enclosing async fn on
/// anything but `Ok`.
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            ::asupersync::Outcome::Ok(value) => value,
            ::asupersync::Outcome::Err(e) => return ::asupersync::Outcome::Err(e),
            ::asupersync::Outcome::Cancelled(r) => return ::asupersync::Outcome::Cancelled(r),
            ::asupersync::Outcome::Panicked(p) => return ::asupersync::Outcome::Panicked(p),
        }
    };
}

pub mod association;
pub mod attribute;
pub mod error;
pub mod instance;
pub mod metadata;
pub mod model;
pub mod property;
pub mod serialize;
pub mod validate;
pub mod value;

pub use association::{
    Association, AssociationKind, AssociationOptions, AssociationTarget, BELONGS_TO,
    BELONGS_TO_MANY, HAS_MANY, HAS_ONE, ModelAssociations, is_lazy_load,
};
pub use attribute::{
    ARRAY, Attribute, AttributeKind, AttributeOptions, AttributeType, AttributeTypeOptions,
    BIGINT, BLOB, BOOLEAN, CHAR, DATE, DATETIME, DECIMAL, DOUBLE, DefaultValue, ENUM, FLOAT,
    INTEGER, JSON, JSONB, ModelAttributes, OBJECT, REAL, STRING, TEXT, TIME,
};
pub use error::{
    CommonModelError, Error, FieldValidationError, ResolutionError, Result, RuleError,
    ValidationError, ValidationErrorKind,
};
pub use instance::Instance;
pub use metadata::Registry;
pub use model::{ConstructOptions, ModelBuilder, ModelClass, ModelOptions, guess_model_name};
pub use property::{ModelProperty, Properties, Property};
pub use serialize::{DeserializeOptions, SerializeOptions};
pub use validate::{
    ModelRule, ModelRuleFuture, ModelValidation, Rule, RuleFuture, ValidateOptions, ValidationOptions,
    ValidationRule, matches_pattern, validate_pattern,
};
pub use value::{Value, parse_timestamp};

/// Convert a synchronous result into an `Outcome` for use inside async
/// lifecycle operations.
pub(crate) fn outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(e) => Outcome::Err(e),
    }
}
