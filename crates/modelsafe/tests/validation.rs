//! Full-instance validation: aggregation, required handling, rules and
//! message templates.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use asupersync::runtime::RuntimeBuilder;
use modelsafe::prelude::*;
use modelsafe::{Rule, RuleFuture};
use serde_json::json;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

/// Run validation, returning the aggregated error if it failed.
fn validation_error(registry: &Registry, instance: &Instance, options: ValidateOptions) -> Option<ValidationError> {
    let cx = Cx::for_testing();
    match block_on(registry.validate(&cx, instance, options)) {
        Outcome::Ok(()) => None,
        Outcome::Err(Error::Validation(e)) => Some(e),
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn validated1(registry: &Registry) -> ModelClass {
    registry
        .declare("Validated1Model", |m| {
            m.attribute(
                "name",
                AttributeOptions::new(STRING).required().default_value(49.23),
            );
            m.attribute("secondName", AttributeOptions::new(STRING).optional());
        })
        .unwrap()
}

#[test]
fn invalid_default_is_a_type_error() {
    let registry = Registry::new();
    let class = validated1(&registry);

    let err = validation_error(&registry, &registry.new_instance(&class), ValidateOptions::default())
        .expect("default 49.23 is not a string");
    assert_eq!(err.model, "validated1Model");
    assert_eq!(err.errors_for("name")[0].tag(), "attribute.string");
    assert!(!err.has_errors_for("secondName"));
}

#[test]
fn null_required_value_is_reported_first() {
    let registry = Registry::new();
    let class = validated1(&registry);
    let instance = registry.construct(&class, json!({"name": null}), ConstructOptions::default());

    let err = validation_error(&registry, &instance, ValidateOptions::default())
        .expect("name is required");
    let errors = err.errors_for("name");
    assert_eq!(errors[0].tag(), "attribute.required");
    // The default stands in for the missing value during the type check.
    assert_eq!(errors[1].tag(), "attribute.string");
}

#[test]
fn valid_values_pass() {
    let registry = Registry::new();
    let class = validated1(&registry);
    let instance = registry.construct(&class, json!({"name": "blah"}), ConstructOptions::default());

    assert!(validation_error(&registry, &instance, ValidateOptions::default()).is_none());
}

#[test]
fn required_and_optional() {
    let registry = Registry::new();
    let strict = registry
        .declare("Strict", |m| {
            m.attribute("title", AttributeOptions::new(TEXT));
        })
        .unwrap();
    let relaxed = registry
        .declare("Relaxed", |m| {
            m.attribute("title", AttributeOptions::new(TEXT).optional());
        })
        .unwrap();

    let err = validation_error(&registry, &registry.new_instance(&strict), ValidateOptions::default())
        .expect("title is required");
    assert_eq!(err.errors_for("title").len(), 2);
    assert_eq!(err.errors_for("title")[0].kind, ValidationErrorKind::Required);

    assert!(
        validation_error(&registry, &registry.new_instance(&relaxed), ValidateOptions::default())
            .is_none()
    );
    assert!(
        validation_error(
            &registry,
            &registry.new_instance(&strict),
            ValidateOptions::default().required(false)
        )
        .is_none()
    );
}

#[test]
fn errors_aggregate_across_attributes() {
    let registry = Registry::new();
    let class = registry
        .declare("Pair", |m| {
            m.attribute("count", AttributeOptions::new(INTEGER));
            m.attribute("initial", AttributeOptions::new(CHAR));
            m.attribute("fine", AttributeOptions::new(BOOLEAN));
        })
        .unwrap();
    let instance = registry.construct(
        &class,
        json!({"count": "many", "initial": "AB", "fine": true}),
        ConstructOptions::default(),
    );

    let err = validation_error(&registry, &instance, ValidateOptions::default())
        .expect("two attributes are invalid");
    assert_eq!(err.errors.len(), 2);
    assert_eq!(err.errors_for("count")[0].tag(), "attribute.integer");
    assert_eq!(err.errors_for("initial")[0].tag(), "attribute.char");
    assert_eq!(err.len(), 2);
}

#[test]
fn every_rule_runs_in_order() {
    let registry = Registry::new();
    let class = registry
        .declare("Account", |m| {
            m.attribute("handle", AttributeOptions::new(STRING));
            m.validate("handle", ValidationRule::alpha());
            m.validate("handle", ValidationRule::lowercase());
            m.validate("handle", ValidationRule::max_length(3));
        })
        .unwrap();
    let instance = registry.construct(&class, json!({"handle": "Bob_99"}), ConstructOptions::default());

    let err = validation_error(&registry, &instance, ValidateOptions::default())
        .expect("handle breaks every rule");
    let tags: Vec<String> = err.errors_for("handle").iter().map(|e| e.tag()).collect();
    assert_eq!(
        tags,
        vec!["validation.alpha", "validation.lowercase", "validation.max_length"]
    );
}

#[test]
fn foreign_rule_errors_become_unknown() {
    let registry = Registry::new();
    let class = registry
        .declare("Widget", |m| {
            m.attribute("code", AttributeOptions::new(STRING));
            m.validate(
                "code",
                ValidationRule::custom("reserved", |_, value| {
                    if value.as_str() == Some("root") {
                        Err(RuleError::foreign("code is reserved"))
                    } else {
                        Ok(())
                    }
                }),
            );
        })
        .unwrap();
    let instance = registry.construct(&class, json!({"code": "root"}), ConstructOptions::default());

    let err = validation_error(&registry, &instance, ValidateOptions::default())
        .expect("root is reserved");
    let error = &err.errors_for("code")[0];
    assert_eq!(error.kind, ValidationErrorKind::Unknown);
    assert_eq!(error.message, "code is reserved");
}

struct CountingRule {
    calls: Arc<AtomicUsize>,
}

impl Rule for CountingRule {
    fn name(&self) -> &str {
        "counting"
    }

    fn check<'a>(&'a self, _cx: &'a Cx, path: &'a str, value: &'a Value) -> RuleFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match value.as_i64() {
                Some(n) if n % 2 == 0 => Ok(()),
                _ => Err(RuleError::from(FieldValidationError::new(
                    ValidationErrorKind::rule("even"),
                    format!("{path} must be even"),
                ))),
            }
        })
    }
}

#[test]
fn async_rules_are_awaited() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let rule = ValidationRule::from_rule(CountingRule {
        calls: Arc::clone(&calls),
    });
    let class = registry
        .declare("Counter", |m| {
            m.attribute("n", AttributeOptions::new(INTEGER));
            m.validate("n", rule);
        })
        .unwrap();

    let odd = registry.construct(&class, json!({"n": 3}), ConstructOptions::default());
    let err = validation_error(&registry, &odd, ValidateOptions::default()).expect("3 is odd");
    assert_eq!(err.errors_for("n")[0].tag(), "validation.even");
    assert_eq!(err.errors_for("n")[0].message, "n must be even");

    let even = registry.construct(&class, json!({"n": 4}), ConstructOptions::default());
    assert!(validation_error(&registry, &even, ValidateOptions::default()).is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn message_templates_replace_defaults() {
    let registry = Registry::new();
    let class = registry
        .declare("Contact", |m| {
            m.attribute(
                "email",
                AttributeOptions::new(STRING)
                    .required_message("Please provide {path}")
                    .validation_options(ValidationOptions::message("{path} must be text, got {value}")),
            );
            m.validate(
                "email",
                ValidationRule::email().with_message("{value} is not an email ({error})"),
            );
        })
        .unwrap();

    let missing = registry.new_instance(&class);
    let err = validation_error(&registry, &missing, ValidateOptions::default()).expect("missing");
    assert_eq!(err.errors_for("email")[0].message, "Please provide email");

    let number = registry.construct(&class, json!({"email": 5}), ConstructOptions::default());
    let err = validation_error(&registry, &number, ValidateOptions::default()).expect("not text");
    assert_eq!(err.errors_for("email")[0].message, "email must be text, got 5");

    let bad = registry.construct(&class, json!({"email": "nope"}), ConstructOptions::default());
    let err = validation_error(&registry, &bad, ValidateOptions::default()).expect("not an email");
    assert_eq!(
        err.errors_for("email")[0].message,
        "nope is not an email (email must be an email address)"
    );
}

#[test]
fn model_rules_produce_common_errors() {
    let registry = Registry::new();
    let class = registry
        .declare("Range", |m| {
            m.attribute("low", AttributeOptions::new(INTEGER));
            m.attribute("high", AttributeOptions::new(INTEGER));
            m.validate_model(ModelValidation::from_fn(|instance| {
                let low = instance.get("low").and_then(Value::as_i64);
                let high = instance.get("high").and_then(Value::as_i64);
                match (low, high) {
                    (Some(low), Some(high)) if low > high => Err(CommonModelError::for_props(
                        ["low", "high"],
                        "low must not exceed high",
                    )),
                    _ => Ok(()),
                }
            }));
        })
        .unwrap();

    let instance = registry.construct(&class, json!({"low": 9, "high": 1}), ConstructOptions::default());
    let err = validation_error(&registry, &instance, ValidateOptions::default())
        .expect("range is inverted");
    assert!(err.errors.is_empty());
    assert_eq!(err.common_errors.len(), 1);
    assert_eq!(err.common_errors[0].props, vec!["low", "high"]);

    let shape = serde_json::to_value(&err).unwrap();
    assert_eq!(shape["model"], json!("range"));
    assert_eq!(
        shape["commonErrors"],
        json!([{"props": ["low", "high"], "message": "low must not exceed high"}])
    );
}

#[test]
fn error_shape_uses_stable_tags() {
    let registry = Registry::new();
    let class = validated1(&registry);

    let err = validation_error(&registry, &registry.new_instance(&class), ValidateOptions::default())
        .expect("invalid default");
    let shape = serde_json::to_value(&err).unwrap();
    assert_eq!(shape["errors"]["name"][0]["type"], json!("attribute.string"));
    assert!(shape.get("commonErrors").is_none());
}

#[test]
fn deserialize_discards_invalid_instances() {
    let registry = Registry::new();
    let class = validated1(&registry);
    let cx = Cx::for_testing();

    match block_on(registry.deserialize(&cx, &class, &json!({"name": 12}), DeserializeOptions::default())) {
        Outcome::Err(Error::Validation(e)) => {
            assert_eq!(e.errors_for("name")[0].tag(), "attribute.string");
        }
        _ => panic!("expected a validation error"),
    }

    match block_on(registry.deserialize(
        &cx,
        &class,
        &json!({"name": 12}),
        DeserializeOptions::default().validate(false),
    )) {
        Outcome::Ok(instance) => assert_eq!(instance.get("name"), Some(&Value::Int(12))),
        _ => panic!("validation was disabled"),
    }
}

#[test]
fn subclass_validates_inherited_attributes() {
    let registry = Registry::new();
    let base = registry
        .declare("Base", |m| {
            m.attribute("id", AttributeOptions::new(INTEGER));
        })
        .unwrap();
    let child = registry
        .declare_subclass(&base, "Child", |m| {
            m.attribute("label", AttributeOptions::new(STRING).optional());
        })
        .unwrap();

    let instance = registry.construct(&child, json!({"id": "x"}), ConstructOptions::default());
    let err = validation_error(&registry, &instance, ValidateOptions::default())
        .expect("inherited id is checked");
    assert_eq!(err.model, "child");
    assert_eq!(err.errors_for("id")[0].tag(), "attribute.integer");
}
