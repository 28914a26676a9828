//! Recursive serialization and deserialization of model instances.
//!
//! Serialization projects an instance onto its declared attributes and,
//! depth permitting, follows its associations. Deserialization goes the
//! other way, building real instances for associated models, and validates
//! the result unless told otherwise.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use asupersync::{Cx, Outcome};
use serde_json::{Map, Value as JsonValue};

use crate::association::AssociationOptions;
use crate::attribute::{AttributeKind, AttributeType};
use crate::error::Error;
use crate::instance::Instance;
use crate::metadata::Registry;
use crate::model::ModelClass;
use crate::outcome;
use crate::validate::ValidateOptions;
use crate::value::{Value, parse_timestamp};

type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Rebuild bytes from the number array a BLOB serializes to.
fn byte_array(value: &Value) -> Option<Vec<u8>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_i64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

/// Options for [`Registry::serialize`].
#[derive(Debug, Clone, Copy)]
pub struct SerializeOptions {
    /// Follow associations.
    pub associations: bool,
    /// How many association levels below this one to follow. Associations
    /// are followed while the remaining depth is non-negative.
    pub depth: i32,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            associations: true,
            depth: 1,
        }
    }
}

impl SerializeOptions {
    /// Enable or disable association handling.
    pub fn associations(mut self, value: bool) -> Self {
        self.associations = value;
        self
    }

    /// Set the association depth.
    pub fn depth(mut self, depth: i32) -> Self {
        self.depth = depth;
        self
    }
}

/// Options for [`Registry::deserialize`].
#[derive(Debug, Clone, Copy)]
pub struct DeserializeOptions {
    /// Validate each built instance.
    pub validate: bool,
    /// Follow associations.
    pub associations: bool,
    /// How many association levels below this one to follow.
    pub depth: i32,
}

impl Default for DeserializeOptions {
    fn default() -> Self {
        Self {
            validate: true,
            associations: true,
            depth: 1,
        }
    }
}

impl DeserializeOptions {
    /// Enable or disable validation.
    pub fn validate(mut self, value: bool) -> Self {
        self.validate = value;
        self
    }

    /// Enable or disable association handling.
    pub fn associations(mut self, value: bool) -> Self {
        self.associations = value;
        self
    }

    /// Set the association depth.
    pub fn depth(mut self, depth: i32) -> Self {
        self.depth = depth;
        self
    }
}

impl Registry {
    /// Serialize an instance into plain data.
    ///
    /// Only declared attributes are kept. Associations holding a value are
    /// serialized with their target's metadata; a collection association
    /// whose value is not a sequence becomes `[]`. Fails with a resolution
    /// error if an association's target cannot be resolved.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, instance, options),
        fields(model = %instance.class().type_name(), depth = options.depth)
    )]
    pub async fn serialize(
        &self,
        cx: &Cx,
        instance: &Instance,
        options: SerializeOptions,
    ) -> Outcome<JsonValue, Error> {
        self.serialize_instance(cx, instance.class(), instance.values(), options)
            .await
    }

    fn serialize_instance<'a>(
        &'a self,
        cx: &'a Cx,
        class: &'a ModelClass,
        values: &'a BTreeMap<String, Value>,
        options: SerializeOptions,
    ) -> LocalBoxFuture<'a, Outcome<JsonValue, Error>> {
        Box::pin(async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }

            let mut data = Map::new();
            for key in self.get_attributes(class).into_keys() {
                if let Some(value) = values.get(&key) {
                    data.insert(key, value.to_json());
                }
            }

            if !options.associations || options.depth < 0 {
                return Outcome::Ok(JsonValue::Object(data));
            }

            let nested = options.depth(options.depth - 1);
            for (key, association) in self.get_associations(class) {
                let value = match values.get(&key) {
                    Some(value) if !value.is_null() => value,
                    _ => continue,
                };
                let target = try_outcome!(outcome(self.resolve_target(class, &key, &association)));

                let serialized = if association.is_collection() {
                    let mut items = Vec::new();
                    for item in value.as_array().unwrap_or_default() {
                        items.push(try_outcome!(
                            self.serialize_related(cx, &target, item, nested).await
                        ));
                    }
                    JsonValue::Array(items)
                } else {
                    try_outcome!(self.serialize_related(cx, &target, value, nested).await)
                };
                data.insert(key, serialized);
            }

            Outcome::Ok(JsonValue::Object(data))
        })
    }

    /// Serialize one related value, which may be an instance or a plain map.
    async fn serialize_related(
        &self,
        cx: &Cx,
        target: &ModelClass,
        value: &Value,
        options: SerializeOptions,
    ) -> Outcome<JsonValue, Error> {
        match value {
            Value::Model(instance) => {
                self.serialize_instance(cx, target, instance.values(), options)
                    .await
            }
            Value::Object(map) => self.serialize_instance(cx, target, map, options).await,
            _ => Outcome::Ok(JsonValue::Null),
        }
    }

    /// Deserialize plain data into an instance of `class`.
    ///
    /// Non-object input counts as an empty object. Defaults are not applied.
    /// Temporal attributes given as text are parsed. Associated data becomes
    /// real instances of the target model. With `options.validate` set, the
    /// built instance is validated and discarded on failure.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, class, data, options),
        fields(model = %class.type_name(), depth = options.depth)
    )]
    pub async fn deserialize(
        &self,
        cx: &Cx,
        class: &ModelClass,
        data: &JsonValue,
        options: DeserializeOptions,
    ) -> Outcome<Instance, Error> {
        self.deserialize_instance(cx, class, data, options).await
    }

    fn deserialize_instance<'a>(
        &'a self,
        cx: &'a Cx,
        class: &'a ModelClass,
        data: &'a JsonValue,
        options: DeserializeOptions,
    ) -> LocalBoxFuture<'a, Outcome<Instance, Error>> {
        Box::pin(async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }

            let empty = Map::new();
            let data = data.as_object().unwrap_or(&empty);

            let mut instance = Instance::new(class.clone());
            for (key, attribute) in self.get_attributes(class) {
                let Some(raw) = data.get(&key) else {
                    continue;
                };
                let mut value = Value::from_json(raw.clone());
                match attribute.attr_type().map(AttributeType::kind) {
                    Some(kind) if kind.is_temporal() => {
                        if let Some(timestamp) = value.as_str().and_then(parse_timestamp) {
                            value = Value::Timestamp(timestamp);
                        }
                    }
                    Some(AttributeKind::Blob) => {
                        if let Some(bytes) = byte_array(&value) {
                            value = Value::Bytes(bytes);
                        }
                    }
                    _ => {}
                }
                instance.set(key, value);
            }

            if options.associations && options.depth >= 0 {
                let nested = options.depth(options.depth - 1);
                for (key, association) in self.get_associations(class) {
                    let raw = match data.get(&key) {
                        Some(raw) if !raw.is_null() => raw,
                        _ => continue,
                    };
                    let value = try_outcome!(
                        self.deserialize_association(cx, class, &key, &association, raw, nested)
                            .await
                    );
                    instance.set(key, value);
                }
            }

            if options.validate {
                try_outcome!(
                    self.validate(cx, &instance, ValidateOptions::default())
                        .await
                );
            }

            Outcome::Ok(instance)
        })
    }

    async fn deserialize_association(
        &self,
        cx: &Cx,
        class: &ModelClass,
        key: &str,
        association: &AssociationOptions,
        raw: &JsonValue,
        options: DeserializeOptions,
    ) -> Outcome<Value, Error> {
        let target = try_outcome!(outcome(self.resolve_target(class, key, association)));

        if !association.is_collection() {
            let related = try_outcome!(self.deserialize_instance(cx, &target, raw, options).await);
            return Outcome::Ok(Value::from(related));
        }

        let mut items = Vec::new();
        for item in raw.as_array().map(Vec::as_slice).unwrap_or_default() {
            let related = try_outcome!(self.deserialize_instance(cx, &target, item, options).await);
            items.push(Value::from(related));
        }
        Outcome::Ok(Value::Array(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{AssociationOptions, BELONGS_TO, HAS_MANY, HAS_ONE};
    use crate::attribute::{AttributeOptions, BLOB, DATETIME, INTEGER, STRING};
    use asupersync::runtime::RuntimeBuilder;
    use serde_json::json;

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    fn run<F: Future>(future: F) -> F::Output {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(future)
    }

    fn models(registry: &Registry) -> (ModelClass, ModelClass) {
        let comment = registry
            .declare("Comment", |m| {
                m.attribute("id", AttributeOptions::new(INTEGER).primary());
                m.attribute("message", AttributeOptions::new(STRING));
            })
            .unwrap();
        let user = registry
            .declare("User", |m| {
                m.attribute("name", AttributeOptions::new(STRING));
                m.attribute("joined", AttributeOptions::new(DATETIME).optional());
                m.association(
                    "comments",
                    AssociationOptions::new(HAS_MANY).target(&comment),
                );
            })
            .unwrap();
        (user, comment)
    }

    #[test]
    fn test_serialize_drops_undeclared_keys() {
        let registry = Registry::new();
        let (user, _) = models(&registry);
        let mut instance = Instance::new(user);
        instance.set("name", "Alice");
        instance.set("secret", "hunter2");

        let cx = Cx::for_testing();
        let data = unwrap_outcome(run(registry.serialize(
            &cx,
            &instance,
            SerializeOptions::default(),
        )));
        assert_eq!(data, json!({"name": "Alice"}));
    }

    #[test]
    fn test_serialize_follows_associations() {
        let registry = Registry::new();
        let (user, comment) = models(&registry);

        let mut first = Instance::new(comment);
        first.set("id", 1);
        first.set("message", "hi");
        first.set("ignored", true);

        let mut instance = Instance::new(user);
        instance.set("name", "Alice");
        instance.set("comments", vec![Value::from(first)]);

        let cx = Cx::for_testing();
        let data = unwrap_outcome(run(registry.serialize(
            &cx,
            &instance,
            SerializeOptions::default(),
        )));
        assert_eq!(
            data,
            json!({"name": "Alice", "comments": [{"id": 1, "message": "hi"}]})
        );

        let shallow = unwrap_outcome(run(registry.serialize(
            &cx,
            &instance,
            SerializeOptions::default().associations(false),
        )));
        assert_eq!(shallow, json!({"name": "Alice"}));

        let negative = unwrap_outcome(run(registry.serialize(
            &cx,
            &instance,
            SerializeOptions::default().depth(-1),
        )));
        assert_eq!(negative, json!({"name": "Alice"}));
    }

    #[test]
    fn test_deserialize_skips_defaults_and_parses_timestamps() {
        let registry = Registry::new();
        let class = registry
            .declare("Event", |m| {
                m.attribute("title", AttributeOptions::new(STRING).default_value("untitled").optional());
                m.attribute("at", AttributeOptions::new(DATETIME));
            })
            .unwrap();

        let cx = Cx::for_testing();
        let instance = unwrap_outcome(run(registry.deserialize(
            &cx,
            &class,
            &json!({"at": "2024-05-01T12:30:00Z"}),
            DeserializeOptions::default(),
        )));

        assert!(!instance.has("title"));
        let at = instance.get("at").and_then(Value::as_timestamp).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-05-01T12:30:00+00:00");
    }

    #[test]
    fn test_deserialize_non_object_input_is_empty() {
        let registry = Registry::new();
        let (user, _) = models(&registry);

        let cx = Cx::for_testing();
        let instance = unwrap_outcome(run(registry.deserialize(
            &cx,
            &user,
            &json!([1, 2, 3]),
            DeserializeOptions::default().validate(false),
        )));
        assert!(instance.values().is_empty());
    }

    #[test]
    fn test_blob_round_trips_as_bytes() {
        let registry = Registry::new();
        let doc = registry
            .declare("Doc", |m| {
                m.attribute("data", AttributeOptions::new(BLOB));
            })
            .unwrap();
        let mut instance = Instance::new(doc.clone());
        instance.set("data", vec![1u8, 2, 3]);

        let cx = Cx::for_testing();
        let data = unwrap_outcome(run(registry.serialize(
            &cx,
            &instance,
            SerializeOptions::default(),
        )));
        assert_eq!(data, json!({"data": [1, 2, 3]}));

        let restored = unwrap_outcome(run(registry.deserialize(
            &cx,
            &doc,
            &data,
            DeserializeOptions::default(),
        )));
        assert_eq!(restored, instance);

        // Out-of-range numbers are not bytes and are kept as given.
        let wide = unwrap_outcome(run(registry.deserialize(
            &cx,
            &doc,
            &json!({"data": [1, 300]}),
            DeserializeOptions::default(),
        )));
        assert_eq!(
            wide.get("data"),
            Some(&Value::Array(vec![Value::Int(1), Value::Int(300)]))
        );
    }

    #[test]
    fn test_deserialize_builds_related_instances() {
        let registry = Registry::new();
        let (user, comment) = models(&registry);

        let cx = Cx::for_testing();
        let instance = unwrap_outcome(run(registry.deserialize(
            &cx,
            &user,
            &json!({"name": "Alice", "comments": [{"id": 7, "message": "yo"}]}),
            DeserializeOptions::default(),
        )));

        let related: Vec<&Instance> = instance.related_many("comments").collect();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].class(), &comment);
        assert_eq!(related[0].get("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_unresolved_target_is_fatal() {
        let registry = Registry::new();
        let class = registry
            .declare("Orphan", |m| {
                m.association("parent", AssociationOptions::new(BELONGS_TO).deferred(|| None));
            })
            .unwrap();

        let mut instance = Instance::new(class.clone());
        instance.set("parent", json!({"id": 1}));

        let cx = Cx::for_testing();
        match run(registry.serialize(&cx, &instance, SerializeOptions::default())) {
            Outcome::Err(Error::Resolution(e)) => assert_eq!(e.key, "parent"),
            _ => panic!("expected a resolution error"),
        }
        match run(registry.deserialize(
            &cx,
            &class,
            &json!({"parent": {"id": 1}}),
            DeserializeOptions::default(),
        )) {
            Outcome::Err(Error::Resolution(e)) => assert_eq!(e.model, "Orphan"),
            _ => panic!("expected a resolution error"),
        }
    }

    #[test]
    fn test_absent_association_with_unresolved_target_is_fine() {
        let registry = Registry::new();
        let class = registry
            .declare("Loner", |m| {
                m.attribute("name", AttributeOptions::new(STRING));
                m.association("friend", AssociationOptions::new(HAS_ONE));
            })
            .unwrap();

        let cx = Cx::for_testing();
        let instance = unwrap_outcome(run(registry.deserialize(
            &cx,
            &class,
            &json!({"name": "solo", "friend": null}),
            DeserializeOptions::default(),
        )));
        assert!(!instance.has("friend"));
    }
}
