//! Validation rules and the full-instance validation engine.
//!
//! Validation never stops at the first problem. Every declared attribute is
//! checked independently, and every rule on an attribute is attempted, so a
//! single call reports everything wrong with an instance in one
//! [`ValidationError`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use asupersync::{Cx, Outcome};
use regex::Regex;

use crate::attribute::AttributeOptions;
use crate::error::{
    CommonModelError, Error, FieldValidationError, RuleError, ValidationError, ValidationErrorKind,
};
use crate::instance::Instance;
use crate::metadata::Registry;
use crate::value::Value;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const URL_PATTERN: &str = r"^https?://[^\s/$.?#].[^\s]*$";
const UUID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";
const HEX_PATTERN: &str = r"^(?:0[xX])?[0-9a-fA-F]+$";
const ALPHA_PATTERN: &str = r"^[a-zA-Z]+$";
const ALPHANUMERIC_PATTERN: &str = r"^[a-zA-Z0-9]+$";
const BASE64_PATTERN: &str = r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$";

/// Thread-safe regex cache for compiled patterns.
///
/// Patterns are compiled lazily on first use and cached for the lifetime
/// of the program.
struct RegexCache {
    cache: RwLock<std::collections::HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(std::collections::HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        // Fast path: check if already cached
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        // Slow path: compile and cache
        let regex = Regex::new(pattern)?;
        {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.insert(pattern.to_string(), regex.clone());
        }
        Ok(regex)
    }
}

/// Global regex cache singleton.
fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Compiled patterns are cached. An invalid pattern is logged and treated as
/// a non-match.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Validate a regex pattern ahead of use.
///
/// Returns an error message if the pattern is invalid, None if valid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

/// Options passed to a validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Message template replacing the default error message.
    ///
    /// Placeholders: `{path}` (the attribute key), `{value}` (the value
    /// checked) and `{error}` (the message that would otherwise be used).
    pub message: Option<String>,
}

impl ValidationOptions {
    /// Options with a message template.
    pub fn message(template: impl Into<String>) -> Self {
        Self {
            message: Some(template.into()),
        }
    }
}

/// Render a message template.
pub(crate) fn render_message(template: &str, path: &str, value: &Value, error: &str) -> String {
    let value = match value {
        Value::Text(s) => s.clone(),
        other => other.to_json().to_string(),
    };
    template
        .replace("{path}", path)
        .replace("{value}", &value)
        .replace("{error}", error)
}

/// Future returned by [`Rule::check`].
pub type RuleFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RuleError>> + 'a>>;

/// A custom, possibly asynchronous, attribute rule.
///
/// Failures that are not already a tagged [`FieldValidationError`] are
/// recorded as `unknown`. A rule that performs I/O owns its own timeout and
/// cancellation policy; `cx` is provided for that.
pub trait Rule: Send + Sync {
    /// Rule name, used in logs.
    fn name(&self) -> &str;

    /// Check a value.
    fn check<'a>(&'a self, cx: &'a Cx, path: &'a str, value: &'a Value) -> RuleFuture<'a>;
}

/// A synchronous rule built from a closure.
struct FnRule<F> {
    name: String,
    f: F,
}

impl<F> Rule for FnRule<F>
where
    F: Fn(&str, &Value) -> Result<(), RuleError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check<'a>(&'a self, _cx: &'a Cx, path: &'a str, value: &'a Value) -> RuleFuture<'a> {
        Box::pin(std::future::ready((self.f)(path, value)))
    }
}

#[derive(Clone)]
enum RuleCheck {
    Email,
    Url,
    Uuid,
    Json,
    Hex,
    Alpha,
    Alphanumeric,
    Base64,
    Lowercase,
    Uppercase,
    Ip,
    Matches(String),
    Min(f64),
    Max(f64),
    GreaterThan(f64),
    LessThan(f64),
    MinLength(usize),
    MaxLength(usize),
    Length(usize, usize),
    Custom(Arc<dyn Rule>),
}

/// A validation rule attached to an attribute.
#[derive(Clone)]
pub struct ValidationRule {
    check: RuleCheck,
    options: ValidationOptions,
}

impl ValidationRule {
    fn new(check: RuleCheck) -> Self {
        Self {
            check,
            options: ValidationOptions::default(),
        }
    }

    /// Text must look like an email address.
    pub fn email() -> Self {
        Self::new(RuleCheck::Email)
    }

    /// Text must be an http(s) URL.
    pub fn url() -> Self {
        Self::new(RuleCheck::Url)
    }

    /// Text must be a UUID.
    pub fn uuid() -> Self {
        Self::new(RuleCheck::Uuid)
    }

    /// Text must parse as JSON.
    pub fn json() -> Self {
        Self::new(RuleCheck::Json)
    }

    /// Text must be hexadecimal, optionally `0x`-prefixed.
    pub fn hex() -> Self {
        Self::new(RuleCheck::Hex)
    }

    /// Text must contain only ASCII letters.
    pub fn alpha() -> Self {
        Self::new(RuleCheck::Alpha)
    }

    /// Text must contain only ASCII letters and digits.
    pub fn alphanumeric() -> Self {
        Self::new(RuleCheck::Alphanumeric)
    }

    /// Text must be padded base64.
    pub fn base64() -> Self {
        Self::new(RuleCheck::Base64)
    }

    /// Text must be entirely lowercase.
    pub fn lowercase() -> Self {
        Self::new(RuleCheck::Lowercase)
    }

    /// Text must be entirely uppercase.
    pub fn uppercase() -> Self {
        Self::new(RuleCheck::Uppercase)
    }

    /// Text must be an IPv4 or IPv6 address.
    pub fn ip() -> Self {
        Self::new(RuleCheck::Ip)
    }

    /// Text must match a regular expression.
    pub fn matches(pattern: impl Into<String>) -> Self {
        Self::new(RuleCheck::Matches(pattern.into()))
    }

    /// Number must be at least `min`.
    pub fn min(min: f64) -> Self {
        Self::new(RuleCheck::Min(min))
    }

    /// Number must be at most `max`.
    pub fn max(max: f64) -> Self {
        Self::new(RuleCheck::Max(max))
    }

    /// Number must be strictly greater than `bound`.
    pub fn greater_than(bound: f64) -> Self {
        Self::new(RuleCheck::GreaterThan(bound))
    }

    /// Number must be strictly less than `bound`.
    pub fn less_than(bound: f64) -> Self {
        Self::new(RuleCheck::LessThan(bound))
    }

    /// Text (in characters) or array must have at least `min` items.
    pub fn min_length(min: usize) -> Self {
        Self::new(RuleCheck::MinLength(min))
    }

    /// Text (in characters) or array must have at most `max` items.
    pub fn max_length(max: usize) -> Self {
        Self::new(RuleCheck::MaxLength(max))
    }

    /// Text (in characters) or array length must be within `min..=max`.
    pub fn length(min: usize, max: usize) -> Self {
        Self::new(RuleCheck::Length(min, max))
    }

    /// A synchronous custom rule.
    pub fn custom<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<(), RuleError> + Send + Sync + 'static,
    {
        Self::new(RuleCheck::Custom(Arc::new(FnRule {
            name: name.into(),
            f,
        })))
    }

    /// A custom rule implementing [`Rule`], possibly asynchronous.
    pub fn from_rule(rule: impl Rule + 'static) -> Self {
        Self::new(RuleCheck::Custom(Arc::new(rule)))
    }

    /// Replace the default error message with a template.
    pub fn with_message(mut self, template: impl Into<String>) -> Self {
        self.options.message = Some(template.into());
        self
    }

    /// The rule's options.
    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// The rule name.
    pub fn name(&self) -> &str {
        match &self.check {
            RuleCheck::Email => "email",
            RuleCheck::Url => "url",
            RuleCheck::Uuid => "uuid",
            RuleCheck::Json => "json",
            RuleCheck::Hex => "hex",
            RuleCheck::Alpha => "alpha",
            RuleCheck::Alphanumeric => "alphanumeric",
            RuleCheck::Base64 => "base64",
            RuleCheck::Lowercase => "lowercase",
            RuleCheck::Uppercase => "uppercase",
            RuleCheck::Ip => "ip",
            RuleCheck::Matches(_) => "matches",
            RuleCheck::Min(_) => "min",
            RuleCheck::Max(_) => "max",
            RuleCheck::GreaterThan(_) => "greater_than",
            RuleCheck::LessThan(_) => "less_than",
            RuleCheck::MinLength(_) => "min_length",
            RuleCheck::MaxLength(_) => "max_length",
            RuleCheck::Length(..) => "length",
            RuleCheck::Custom(rule) => rule.name(),
        }
    }

    /// Run the rule, normalizing any failure into a tagged property error.
    pub async fn run(&self, cx: &Cx, path: &str, value: &Value) -> Result<(), FieldValidationError> {
        let result = match &self.check {
            RuleCheck::Custom(rule) => rule.check(cx, path, value).await,
            check => check_builtin(check, path, value),
        };

        result.map_err(|e| {
            let mut error = e.into_field_error();
            if let Some(template) = &self.options.message {
                error.message = render_message(template, path, value, &error.message);
            }
            error
        })
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name())
            .field("options", &self.options)
            .finish()
    }
}

fn rule_error(name: &'static str, message: String) -> RuleError {
    RuleError::Tagged(FieldValidationError::new(
        ValidationErrorKind::rule(name),
        message,
    ))
}

fn check_text(
    name: &'static str,
    path: &str,
    value: &Value,
    what: &str,
    predicate: impl Fn(&str) -> bool,
) -> Result<(), RuleError> {
    match value.as_str() {
        Some(s) if predicate(s) => Ok(()),
        Some(_) => Err(rule_error(name, format!("{} must be {}", path, what))),
        None => Err(rule_error(
            name,
            format!("{} must be text to be checked as {}", path, what),
        )),
    }
}

fn check_number(
    name: &'static str,
    path: &str,
    value: &Value,
    what: String,
    predicate: impl Fn(f64) -> bool,
) -> Result<(), RuleError> {
    match value.as_f64() {
        Some(n) if predicate(n) => Ok(()),
        Some(_) => Err(rule_error(name, format!("{} must be {}", path, what))),
        None => Err(rule_error(name, format!("{} must be a number", path))),
    }
}

fn check_length(
    name: &'static str,
    path: &str,
    value: &Value,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(), RuleError> {
    let len = match value {
        Value::Text(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        _ => {
            return Err(rule_error(
                name,
                format!("{} must be text or an array to check its length", path),
            ));
        }
    };
    if let Some(min) = min.filter(|&min| len < min) {
        return Err(rule_error(
            name,
            format!("{} must have a length of at least {}", path, min),
        ));
    }
    if let Some(max) = max.filter(|&max| len > max) {
        return Err(rule_error(
            name,
            format!("{} must have a length of at most {}", path, max),
        ));
    }
    Ok(())
}

fn check_builtin(check: &RuleCheck, path: &str, value: &Value) -> Result<(), RuleError> {
    match check {
        RuleCheck::Email => check_text("email", path, value, "an email address", |s| {
            matches_pattern(s, EMAIL_PATTERN)
        }),
        RuleCheck::Url => check_text("url", path, value, "a URL", |s| {
            matches_pattern(s, URL_PATTERN)
        }),
        RuleCheck::Uuid => check_text("uuid", path, value, "a UUID", |s| {
            matches_pattern(s, UUID_PATTERN)
        }),
        RuleCheck::Json => check_text("json", path, value, "a JSON string", |s| {
            serde_json::from_str::<serde_json::Value>(s).is_ok()
        }),
        RuleCheck::Hex => check_text("hex", path, value, "hexadecimal", |s| {
            matches_pattern(s, HEX_PATTERN)
        }),
        RuleCheck::Alpha => check_text("alpha", path, value, "letters only", |s| {
            matches_pattern(s, ALPHA_PATTERN)
        }),
        RuleCheck::Alphanumeric => {
            check_text("alphanumeric", path, value, "letters and digits only", |s| {
                matches_pattern(s, ALPHANUMERIC_PATTERN)
            })
        }
        RuleCheck::Base64 => check_text("base64", path, value, "base64", |s| {
            !s.is_empty() && matches_pattern(s, BASE64_PATTERN)
        }),
        RuleCheck::Lowercase => check_text("lowercase", path, value, "lowercase", |s| {
            s == s.to_lowercase()
        }),
        RuleCheck::Uppercase => check_text("uppercase", path, value, "uppercase", |s| {
            s == s.to_uppercase()
        }),
        RuleCheck::Ip => check_text("ip", path, value, "an IP address", |s| {
            s.parse::<IpAddr>().is_ok()
        }),
        RuleCheck::Matches(pattern) => {
            check_text("matches", path, value, &format!("matching {}", pattern), |s| {
                matches_pattern(s, pattern)
            })
        }
        RuleCheck::Min(min) => check_number(
            "min",
            path,
            value,
            format!("at least {}", min),
            |n| n >= *min,
        ),
        RuleCheck::Max(max) => check_number(
            "max",
            path,
            value,
            format!("at most {}", max),
            |n| n <= *max,
        ),
        RuleCheck::GreaterThan(bound) => check_number(
            "greater_than",
            path,
            value,
            format!("greater than {}", bound),
            |n| n > *bound,
        ),
        RuleCheck::LessThan(bound) => check_number(
            "less_than",
            path,
            value,
            format!("less than {}", bound),
            |n| n < *bound,
        ),
        RuleCheck::MinLength(min) => check_length("min_length", path, value, Some(*min), None),
        RuleCheck::MaxLength(max) => check_length("max_length", path, value, None, Some(*max)),
        RuleCheck::Length(min, max) => check_length("length", path, value, Some(*min), Some(*max)),
        // Custom rules are awaited by `ValidationRule::run`.
        RuleCheck::Custom(_) => Ok(()),
    }
}

/// Future returned by [`ModelRule::check`].
pub type ModelRuleFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CommonModelError>> + 'a>>;

/// A rule that sees the whole instance. Failures become common errors.
pub trait ModelRule: Send + Sync {
    /// Check an instance.
    fn check<'a>(&'a self, cx: &'a Cx, instance: &'a Instance) -> ModelRuleFuture<'a>;
}

struct FnModelRule<F> {
    f: F,
}

impl<F> ModelRule for FnModelRule<F>
where
    F: Fn(&Instance) -> Result<(), CommonModelError> + Send + Sync,
{
    fn check<'a>(&'a self, _cx: &'a Cx, instance: &'a Instance) -> ModelRuleFuture<'a> {
        Box::pin(std::future::ready((self.f)(instance)))
    }
}

/// A model-level validation attached to a class.
#[derive(Clone)]
pub struct ModelValidation(Arc<dyn ModelRule>);

impl ModelValidation {
    /// Wrap a [`ModelRule`].
    pub fn new(rule: impl ModelRule + 'static) -> Self {
        Self(Arc::new(rule))
    }

    /// A synchronous model rule built from a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Instance) -> Result<(), CommonModelError> + Send + Sync + 'static,
    {
        Self(Arc::new(FnModelRule { f }))
    }

    async fn run(&self, cx: &Cx, instance: &Instance) -> Result<(), CommonModelError> {
        self.0.check(cx, instance).await
    }
}

impl fmt::Debug for ModelValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModelValidation(..)")
    }
}

/// Options for [`Registry::validate`].
#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    /// Enforce required attributes. When false, absent values are skipped.
    pub required: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self { required: true }
    }
}

impl ValidateOptions {
    /// Enable or disable required checks.
    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }
}

/// Check one attribute, collecting every error.
async fn validate_attribute(
    cx: &Cx,
    key: &str,
    attribute: &AttributeOptions,
    value: Option<&Value>,
    rules: &[ValidationRule],
    options: ValidateOptions,
) -> Vec<FieldValidationError> {
    let mut errors = Vec::new();
    let raw = value.unwrap_or(&Value::Null);
    let mut checked = Cow::Borrowed(raw);

    if raw.is_null() {
        if attribute.is_optional() || !options.required {
            return errors;
        }

        let default_message = format!("{} is required", key);
        let message = match &attribute.required_message {
            Some(template) => render_message(template, key, raw, &default_message),
            None => default_message,
        };
        errors.push(FieldValidationError::new(
            ValidationErrorKind::Required,
            message,
        ));

        if let Some(default) = &attribute.default_value {
            checked = Cow::Owned(default.resolve());
        }
    }

    if let Some(attr_type) = attribute.attr_type() {
        if let Err(mut error) = attr_type.validate(key, &checked) {
            if let Some(template) = attribute
                .validation_options
                .as_ref()
                .and_then(|o| o.message.as_deref())
            {
                error.message = render_message(template, key, &checked, &error.message);
            }
            errors.push(error);
        }
    }

    for rule in rules {
        if let Err(error) = rule.run(cx, key, raw).await {
            errors.push(error);
        }
    }

    errors
}

impl Registry {
    /// Validate an instance against its class's declarations.
    ///
    /// Every declared attribute is checked (required, type, then each rule in
    /// declaration order), followed by the model-level rules. All failures
    /// are aggregated into one [`Error::Validation`].
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, instance, options),
        fields(model = %instance.class().type_name())
    )]
    pub async fn validate(
        &self,
        cx: &Cx,
        instance: &Instance,
        options: ValidateOptions,
    ) -> Outcome<(), Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        let class = instance.class();
        let attributes = self.get_attributes(class);
        let model_rules = self.get_model_validations(class);

        let mut errors = BTreeMap::new();
        for (key, attribute) in &attributes {
            let rules = self.get_attribute_validations(class, key);
            let field_errors =
                validate_attribute(cx, key, attribute, instance.get(key), &rules, options).await;
            if !field_errors.is_empty() {
                errors.insert(key.clone(), field_errors);
            }
        }

        let mut common_errors = Vec::new();
        for rule in &model_rules {
            if let Err(error) = rule.run(cx, instance).await {
                common_errors.push(error);
            }
        }

        if errors.is_empty() && common_errors.is_empty() {
            return Outcome::Ok(());
        }

        let model = self.model_name(class);
        let error = ValidationError::new(class.clone(), model, errors, common_errors);

        tracing::debug!(
            properties = error.errors.len(),
            errors = error.len(),
            "Instance failed validation"
        );

        Outcome::Err(Error::Validation(error))
    }
}
