//! Error types for ModelSafe Rust.
//!
//! Three families of failure exist:
//!
//! - **Declaration** errors are programmer mistakes made while declaring
//!   models (declaring against a class the registry has never seen, defining
//!   an unnamed model on a `Safe`, ...).
//! - **Resolution** errors abort a serialize/deserialize call when an
//!   association target cannot be resolved.
//! - **Validation** errors are expected, data-dependent failures. They are
//!   always aggregated into a single [`ValidationError`] per call.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::attribute::AttributeKind;
use crate::model::ModelClass;

/// Result type alias for synchronous ModelSafe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for all ModelSafe operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// A model was declared or looked up incorrectly.
    Declaration(String),
    /// An association target could not be resolved.
    Resolution(ResolutionError),
    /// One or more attributes failed validation.
    Validation(ValidationError),
}

impl Error {
    /// Create a declaration error.
    pub fn declaration(message: impl Into<String>) -> Self {
        Error::Declaration(message.into())
    }

    /// Is this a validation error?
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Borrow the validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Declaration(msg) => write!(f, "Declaration error: {}", msg),
            Error::Resolution(e) => write!(f, "{}", e),
            Error::Validation(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ResolutionError> for Error {
    fn from(e: ResolutionError) -> Self {
        Error::Resolution(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

/// An association was followed but its target model is not defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    /// Type name of the model that owns the association.
    pub model: String,
    /// The association's property key.
    pub key: String,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Association not defined: {}.{} has no resolvable target model",
            self.model, self.key
        )
    }
}

impl std::error::Error for ResolutionError {}

/// Stable classification of a single property error.
///
/// The tag (see [`ValidationErrorKind::tag`]) is what downstream error
/// aggregation groups on, so it must never change for a given failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A required attribute had no value (`attribute.required`).
    Required,
    /// The value did not match the attribute type (`attribute.<kind>`).
    Type(AttributeKind),
    /// A validation rule failed (`validation.<rule>`).
    Rule(Cow<'static, str>),
    /// A custom rule failed with an untagged error (`unknown`).
    Unknown,
}

impl ValidationErrorKind {
    /// Create a rule kind from a rule name.
    pub fn rule(name: impl Into<Cow<'static, str>>) -> Self {
        ValidationErrorKind::Rule(name.into())
    }

    /// The stable string tag for this kind.
    pub fn tag(&self) -> String {
        match self {
            ValidationErrorKind::Required => "attribute.required".to_string(),
            ValidationErrorKind::Type(kind) => format!("attribute.{}", kind.as_str()),
            ValidationErrorKind::Rule(name) => format!("validation.{}", name),
            ValidationErrorKind::Unknown => "unknown".to_string(),
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl Serialize for ValidationErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

/// A single tagged error recorded against one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValidationError {
    /// Stable classification of the error.
    #[serde(rename = "type")]
    pub kind: ValidationErrorKind,
    /// Human readable message.
    pub message: String,
}

impl FieldValidationError {
    /// Create a new property error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The stable string tag of this error.
    pub fn tag(&self) -> String {
        self.kind.tag()
    }
}

impl fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for FieldValidationError {}

/// The failure returned by a validation rule.
///
/// Rules either fail with an already-tagged [`FieldValidationError`], or with
/// any other error, which the validation engine normalizes into
/// [`ValidationErrorKind::Unknown`].
#[derive(Debug)]
pub enum RuleError {
    /// A tagged property error.
    Tagged(FieldValidationError),
    /// Any other error raised by a rule.
    Foreign(Box<dyn std::error::Error + Send + Sync>),
}

impl RuleError {
    /// Wrap an arbitrary error (or message) raised by a rule.
    pub fn foreign(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RuleError::Foreign(error.into())
    }

    /// Normalize into a tagged property error.
    pub fn into_field_error(self) -> FieldValidationError {
        match self {
            RuleError::Tagged(e) => e,
            RuleError::Foreign(e) => {
                FieldValidationError::new(ValidationErrorKind::Unknown, e.to_string())
            }
        }
    }
}

impl From<FieldValidationError> for RuleError {
    fn from(e: FieldValidationError) -> Self {
        RuleError::Tagged(e)
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::Tagged(e) => write!(f, "{}", e),
            RuleError::Foreign(e) => write!(f, "{}", e),
        }
    }
}

/// An error common to several properties, or to the whole model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonModelError {
    /// The properties involved. Empty means the whole model.
    pub props: Vec<String>,
    /// The error message.
    pub message: String,
}

impl CommonModelError {
    /// An error for the whole model.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            props: Vec::new(),
            message: message.into(),
        }
    }

    /// An error for a subset of properties.
    pub fn for_props<I, S>(props: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            props: props.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }
}

/// Aggregated validation failure for one model instance.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    /// The model class that failed validation.
    #[serde(skip)]
    pub model_class: ModelClass,
    /// The model name (from the model options, or the type name).
    pub model: String,
    /// Summary message.
    pub message: String,
    /// Errors keyed by property.
    pub errors: BTreeMap<String, Vec<FieldValidationError>>,
    /// Errors spanning several properties or the whole model.
    #[serde(rename = "commonErrors", skip_serializing_if = "Vec::is_empty")]
    pub common_errors: Vec<CommonModelError>,
}

impl ValidationError {
    /// Create a validation error for a model.
    pub fn new(
        model_class: ModelClass,
        model: impl Into<String>,
        errors: BTreeMap<String, Vec<FieldValidationError>>,
        common_errors: Vec<CommonModelError>,
    ) -> Self {
        let model = model.into();
        let count = errors.values().map(Vec::len).sum::<usize>() + common_errors.len();
        let message = format!(
            "{} failed validation with {} error{}",
            model,
            count,
            if count == 1 { "" } else { "s" }
        );
        Self {
            model_class,
            model,
            message,
            errors,
            common_errors,
        }
    }

    /// Errors recorded for a property.
    pub fn errors_for(&self, key: &str) -> &[FieldValidationError] {
        self.errors.get(key).map_or(&[], Vec::as_slice)
    }

    /// Whether a property has any errors.
    pub fn has_errors_for(&self, key: &str) -> bool {
        !self.errors_for(key).is_empty()
    }

    /// Total number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum::<usize>() + self.common_errors.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation error: {}", self.message)?;
        for (key, errors) in &self.errors {
            for e in errors {
                write!(f, "\n  {}: {}", key, e)?;
            }
        }
        for e in &self.common_errors {
            if e.props.is_empty() {
                write!(f, "\n  (model): {}", e.message)?;
            } else {
                write!(f, "\n  ({}): {}", e.props.join(", "), e.message)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
