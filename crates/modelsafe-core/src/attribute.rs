//! Attribute types and attribute options.
//!
//! Every built-in attribute type is a constant, except [`ENUM`] and
//! [`ARRAY`], which are factories because they carry parameters. Each type
//! knows how to check a value structurally; the failure is tagged
//! `attribute.<kind>` so errors can be grouped by kind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FieldValidationError, ValidationErrorKind};
use crate::property::Property;
use crate::validate::ValidationOptions;
use crate::value::Value;

/// The internal kind of an attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Char,
    Text,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Decimal,
    Boolean,
    Time,
    Date,
    DateTime,
    Object,
    Json,
    Jsonb,
    Blob,
    Enum,
    Array,
}

impl AttributeKind {
    /// The lowercase name used in error tags.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::String => "string",
            AttributeKind::Char => "char",
            AttributeKind::Text => "text",
            AttributeKind::Integer => "integer",
            AttributeKind::BigInt => "bigint",
            AttributeKind::Float => "float",
            AttributeKind::Real => "real",
            AttributeKind::Double => "double",
            AttributeKind::Decimal => "decimal",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Time => "time",
            AttributeKind::Date => "date",
            AttributeKind::DateTime => "datetime",
            AttributeKind::Object => "object",
            AttributeKind::Json => "json",
            AttributeKind::Jsonb => "jsonb",
            AttributeKind::Blob => "blob",
            AttributeKind::Enum => "enum",
            AttributeKind::Array => "array",
        }
    }

    /// Whether values of this kind are points in time.
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(
            self,
            AttributeKind::Time | AttributeKind::Date | AttributeKind::DateTime
        )
    }

    /// Whether this kind performs any structural validation.
    ///
    /// BIGINT, BLOB, JSON and JSONB are opaque.
    #[must_use]
    pub const fn has_validator(&self) -> bool {
        !matches!(
            self,
            AttributeKind::BigInt | AttributeKind::Blob | AttributeKind::Json | AttributeKind::Jsonb
        )
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of the composite attribute types.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeTypeOptions {
    /// The values an ENUM attribute may take.
    Enum { values: Vec<String> },
    /// The type an ARRAY attribute contains.
    Array { contained: Box<AttributeType> },
}

/// The type of an attribute, with any parameters it requires.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeType {
    kind: AttributeKind,
    options: Option<AttributeTypeOptions>,
}

/// A string attribute type.
pub const STRING: AttributeType = AttributeType::new(AttributeKind::String);

/// A single character attribute type.
pub const CHAR: AttributeType = AttributeType::new(AttributeKind::Char);

/// A text attribute type. Integrations usually give this larger storage
/// than a string.
pub const TEXT: AttributeType = AttributeType::new(AttributeKind::Text);

/// An integer attribute type.
pub const INTEGER: AttributeType = AttributeType::new(AttributeKind::Integer);

/// A big integer attribute type. Some integrations store it as text to
/// prevent precision loss, so it is not checked.
pub const BIGINT: AttributeType = AttributeType::new(AttributeKind::BigInt);

/// A float attribute type.
pub const FLOAT: AttributeType = AttributeType::new(AttributeKind::Float);

/// A real number attribute type.
pub const REAL: AttributeType = AttributeType::new(AttributeKind::Real);

/// A double attribute type.
pub const DOUBLE: AttributeType = AttributeType::new(AttributeKind::Double);

/// A decimal attribute type. Accepts numbers and numeric text.
pub const DECIMAL: AttributeType = AttributeType::new(AttributeKind::Decimal);

/// A boolean attribute type.
pub const BOOLEAN: AttributeType = AttributeType::new(AttributeKind::Boolean);

/// A time attribute type.
pub const TIME: AttributeType = AttributeType::new(AttributeKind::Time);

/// A date attribute type.
pub const DATE: AttributeType = AttributeType::new(AttributeKind::Date);

/// A date-time attribute type.
pub const DATETIME: AttributeType = AttributeType::new(AttributeKind::DateTime);

/// A plain structured mapping.
pub const OBJECT: AttributeType = AttributeType::new(AttributeKind::Object);

/// A JSON attribute type. Opaque here; integrations give it meaning.
pub const JSON: AttributeType = AttributeType::new(AttributeKind::Json);

/// A binary JSON attribute type. Opaque here.
pub const JSONB: AttributeType = AttributeType::new(AttributeKind::Jsonb);

/// A blob (binary) attribute type.
pub const BLOB: AttributeType = AttributeType::new(AttributeKind::Blob);

/// An enum attribute type: one of a fixed set of string values.
#[allow(non_snake_case)]
pub fn ENUM<I, S>(values: I) -> AttributeType
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    AttributeType::enumeration(values)
}

/// An array attribute type containing values of another attribute type.
#[allow(non_snake_case)]
pub fn ARRAY(contained: AttributeType) -> AttributeType {
    AttributeType::array(contained)
}

impl AttributeType {
    /// Create an unparametrized attribute type.
    #[must_use]
    pub const fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            options: None,
        }
    }

    /// Create an ENUM type.
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: AttributeKind::Enum,
            options: Some(AttributeTypeOptions::Enum {
                values: values.into_iter().map(Into::into).collect(),
            }),
        }
    }

    /// Create an ARRAY type. Arrays may contain arrays.
    pub fn array(contained: AttributeType) -> Self {
        Self {
            kind: AttributeKind::Array,
            options: Some(AttributeTypeOptions::Array {
                contained: Box::new(contained),
            }),
        }
    }

    /// The internal kind.
    pub const fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// The type parameters, if any.
    pub const fn options(&self) -> Option<&AttributeTypeOptions> {
        self.options.as_ref()
    }

    /// The allowed values of an ENUM type.
    pub fn enum_values(&self) -> Option<&[String]> {
        match &self.options {
            Some(AttributeTypeOptions::Enum { values }) => Some(values),
            _ => None,
        }
    }

    /// The contained type of an ARRAY type.
    pub fn contained(&self) -> Option<&AttributeType> {
        match &self.options {
            Some(AttributeTypeOptions::Array { contained }) => Some(contained),
            _ => None,
        }
    }

    /// Check a value against this type.
    ///
    /// ARRAY only checks that the value is a sequence; element types are the
    /// caller's concern.
    ///
    /// Type checks never wait on anything, so this is synchronous.
    /// `Registry::validate` calls it from inside the async validation pass,
    /// ahead of the attribute's rules.
    pub fn validate(&self, path: &str, value: &Value) -> Result<(), FieldValidationError> {
        let valid = match self.kind {
            AttributeKind::String | AttributeKind::Text => matches!(value, Value::Text(_)),
            AttributeKind::Char => value.as_str().is_some_and(|s| s.chars().count() == 1),
            AttributeKind::Integer => value.as_i64().is_some(),
            AttributeKind::Float | AttributeKind::Real | AttributeKind::Double => {
                value.as_f64().is_some()
            }
            AttributeKind::Decimal => match value {
                Value::Text(s) => s.trim().parse::<f64>().is_ok(),
                other => other.as_f64().is_some(),
            },
            AttributeKind::Boolean => matches!(value, Value::Bool(_)),
            AttributeKind::Time | AttributeKind::Date | AttributeKind::DateTime => {
                matches!(value, Value::Timestamp(_))
            }
            AttributeKind::Object => matches!(value, Value::Object(_)),
            AttributeKind::Enum => value
                .as_str()
                .is_some_and(|s| self.enum_values().unwrap_or_default().iter().any(|v| v == s)),
            AttributeKind::Array => matches!(value, Value::Array(_)),
            AttributeKind::BigInt
            | AttributeKind::Blob
            | AttributeKind::Json
            | AttributeKind::Jsonb => true,
        };

        if valid {
            return Ok(());
        }

        let message = match self.kind {
            AttributeKind::Char => format!("{} must be a single character", path),
            AttributeKind::Enum => format!(
                "{} must be one of [{}]",
                path,
                self.enum_values().unwrap_or_default().join(", ")
            ),
            AttributeKind::Object => format!("{} must be a plain object", path),
            kind if kind.is_temporal() => format!("{} must be a valid {}", path, kind),
            kind => format!("{} must be a valid {}, got {}", path, kind, value.type_name()),
        };
        Err(FieldValidationError::new(
            ValidationErrorKind::Type(self.kind),
            message,
        ))
    }
}

/// A default attribute value, either fixed or computed on construction.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value.
    Value(Value),
    /// A thunk evaluated each time a default is needed.
    Deferred(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Produce the default value.
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Deferred(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Options declared for an attribute.
///
/// Every field is optional so that repeated declarations for the same key
/// can be merged field by field: a later declaration only overrides what it
/// actually sets.
#[derive(Debug, Clone, Default)]
pub struct AttributeOptions {
    /// The attribute type. An entry without a type is not an attribute.
    pub attr_type: Option<AttributeType>,
    /// Whether the attribute may be absent. Required by default.
    pub optional: Option<bool>,
    /// Whether the attribute is a primary key.
    pub primary: Option<bool>,
    /// Whether the attribute is unique.
    pub unique: Option<bool>,
    /// Whether the attribute is read-only.
    pub read_only: Option<bool>,
    /// Value assigned on construction when defaults are enabled.
    pub default_value: Option<DefaultValue>,
    /// Message template used when a required value is missing.
    pub required_message: Option<String>,
    /// Options for the attribute type's own validation.
    pub validation_options: Option<ValidationOptions>,
}

impl AttributeOptions {
    /// Options for an attribute of the given type.
    pub fn new(attr_type: AttributeType) -> Self {
        Self {
            attr_type: Some(attr_type),
            ..Self::default()
        }
    }

    /// Mark the attribute optional.
    pub fn optional(mut self) -> Self {
        self.optional = Some(true);
        self
    }

    /// Mark the attribute required (the default).
    pub fn required(mut self) -> Self {
        self.optional = Some(false);
        self
    }

    /// Mark the attribute as a primary key.
    pub fn primary(mut self) -> Self {
        self.primary = Some(true);
        self
    }

    /// Mark the attribute unique.
    pub fn unique(mut self) -> Self {
        self.unique = Some(true);
        self
    }

    /// Mark the attribute read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }

    /// Set a fixed default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Set a default computed on every construction.
    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default_value = Some(DefaultValue::Deferred(Arc::new(f)));
        self
    }

    /// Set the message template used when the value is missing.
    ///
    /// See [`ValidationOptions`] for the template placeholders.
    pub fn required_message(mut self, template: impl Into<String>) -> Self {
        self.required_message = Some(template.into());
        self
    }

    /// Set options for the type validation.
    pub fn validation_options(mut self, options: ValidationOptions) -> Self {
        self.validation_options = Some(options);
        self
    }

    /// The attribute type, if declared.
    pub fn attr_type(&self) -> Option<&AttributeType> {
        self.attr_type.as_ref()
    }

    /// Whether the attribute may be absent.
    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Whether the attribute is a primary key.
    pub fn is_primary(&self) -> bool {
        self.primary.unwrap_or(false)
    }

    /// Whether the attribute is unique.
    pub fn is_unique(&self) -> bool {
        self.unique.unwrap_or(false)
    }

    /// Whether the attribute is read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only.unwrap_or(false)
    }

    /// Merge a later declaration on top of this one.
    ///
    /// Fields set in `other` override; fields it leaves unset persist.
    pub fn merge(&mut self, other: AttributeOptions) {
        if other.attr_type.is_some() {
            self.attr_type = other.attr_type;
        }
        if other.optional.is_some() {
            self.optional = other.optional;
        }
        if other.primary.is_some() {
            self.primary = other.primary;
        }
        if other.unique.is_some() {
            self.unique = other.unique;
        }
        if other.read_only.is_some() {
            self.read_only = other.read_only;
        }
        if other.default_value.is_some() {
            self.default_value = other.default_value;
        }
        if other.required_message.is_some() {
            self.required_message = other.required_message;
        }
        if other.validation_options.is_some() {
            self.validation_options = other.validation_options;
        }
    }
}

/// The attributes declared on a model, keyed by property.
pub type ModelAttributes = BTreeMap<String, AttributeOptions>;

/// An attribute of a model, as handed to property mappers.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    attr_type: AttributeType,
}

impl Attribute {
    /// Create an attribute property.
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }

    /// The attribute type.
    pub fn attr_type(&self) -> &AttributeType {
        &self.attr_type
    }
}

impl Property for Attribute {
    fn path(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
