//! ModelSafe Rust: typed model declarations with recursive serialization and
//! aggregated validation.
//!
//! This is the facade crate. It re-exports everything from `modelsafe-core`
//! and adds [`Safe`], a collection of declared models keyed by name.
//!
//! # Example
//!
//! ```
//! use modelsafe::prelude::*;
//!
//! let registry = Registry::new();
//! let user = registry
//!     .declare("User", |m| {
//!         m.attribute("name", AttributeOptions::new(STRING));
//!         m.attribute("email", AttributeOptions::new(STRING).optional());
//!         m.validate("email", ValidationRule::email());
//!     })
//!     .unwrap();
//!
//! let mut instance = registry.new_instance(&user);
//! instance.set("name", "Alice");
//! assert_eq!(instance.get("name").and_then(Value::as_str), Some("Alice"));
//! ```

pub mod safe;

pub use modelsafe_core::*;
pub use safe::Safe;

/// Commonly used items.
pub mod prelude {
    pub use crate::safe::Safe;
    pub use modelsafe_core::{
        ARRAY, AssociationKind, AssociationOptions, AssociationTarget, AttributeOptions,
        AttributeType, BELONGS_TO, BELONGS_TO_MANY, BIGINT, BLOB, BOOLEAN, CHAR, CommonModelError,
        ConstructOptions, Cx, DATE, DATETIME, DECIMAL, DOUBLE, DeserializeOptions, ENUM, Error,
        FLOAT, FieldValidationError, HAS_MANY, HAS_ONE, INTEGER, Instance, JSON, JSONB,
        ModelClass, ModelProperty, ModelValidation, OBJECT, Outcome, Properties, Property, REAL,
        Registry, RuleError, STRING, SerializeOptions, TEXT, TIME, ValidateOptions,
        ValidationError, ValidationErrorKind, ValidationOptions, ValidationRule, Value,
    };
}
