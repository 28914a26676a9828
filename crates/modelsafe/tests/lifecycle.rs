//! Construction, serialization and deserialization across associations.

use std::sync::Arc;

use asupersync::runtime::RuntimeBuilder;
use chrono::{TimeZone, Utc};
use modelsafe::prelude::*;
use serde_json::json;

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

#[test]
fn scalar_round_trip() {
    let registry = Registry::new();
    let profile = registry
        .declare("Profile", |m| {
            m.attribute("name", AttributeOptions::new(STRING));
            m.attribute("count", AttributeOptions::new(INTEGER));
            m.attribute("ratio", AttributeOptions::new(REAL));
            m.attribute("active", AttributeOptions::new(BOOLEAN));
            m.attribute("born", AttributeOptions::new(DATE));
            m.attribute("tags", AttributeOptions::new(ARRAY(STRING)));
            m.attribute("kind", AttributeOptions::new(ENUM(["admin", "member"])));
            m.attribute("initial", AttributeOptions::new(CHAR));
            m.attribute("views", AttributeOptions::new(BIGINT));
            m.attribute("balance", AttributeOptions::new(DECIMAL));
            m.attribute("avatar", AttributeOptions::new(BLOB));
            m.attribute("settings", AttributeOptions::new(OBJECT));
        })
        .unwrap();

    let mut instance = registry.new_instance(&profile);
    instance.set("name", "Jim Bob");
    instance.set("count", 2345);
    instance.set("ratio", 0.25);
    instance.set("active", true);
    instance.set(
        "born",
        Utc.with_ymd_and_hms(2017, 3, 1, 0, 0, 0).unwrap(),
    );
    instance.set("tags", vec![Value::from("a"), Value::from("b")]);
    instance.set("kind", "admin");
    instance.set("initial", "J");
    instance.set("views", 9_007_199_254_740_993_i64);
    instance.set("balance", 12.5);
    instance.set("avatar", vec![0u8, 127, 255]);
    instance.set("settings", Value::from_json(json!({"theme": "dark", "size": 3})));

    let cx = Cx::for_testing();
    let data = unwrap_outcome(block_on(registry.serialize(
        &cx,
        &instance,
        SerializeOptions::default(),
    )));
    assert_eq!(data["born"], json!("2017-03-01T00:00:00Z"));
    assert_eq!(data["avatar"], json!([0, 127, 255]));

    let restored = unwrap_outcome(block_on(registry.deserialize(
        &cx,
        &profile,
        &data,
        DeserializeOptions::default(),
    )));
    assert_eq!(restored, instance);
}

#[test]
fn recursive_round_trip_builds_related_instance() {
    let registry = Registry::new();
    let child = registry
        .declare("ChildModel", |m| {
            m.attribute("hello", AttributeOptions::new(STRING));
        })
        .unwrap();
    let captured = child.clone();
    let parent = registry
        .declare("ParentModel", |m| {
            m.attribute("name", AttributeOptions::new(STRING));
            m.attribute("count", AttributeOptions::new(INTEGER));
            m.association(
                "child",
                AssociationOptions::new(HAS_ONE).deferred(move || Some(captured.clone())),
            );
        })
        .unwrap();

    let input = json!({"name": "Jim Bob", "count": 2345, "child": {"hello": "world"}});
    let instance = registry.construct(&parent, input.clone(), ConstructOptions::default());

    let cx = Cx::for_testing();
    let data = unwrap_outcome(block_on(registry.serialize(
        &cx,
        &instance,
        SerializeOptions::default(),
    )));
    assert_eq!(data, input);

    let restored = unwrap_outcome(block_on(registry.deserialize(
        &cx,
        &parent,
        &data,
        DeserializeOptions::default(),
    )));
    let related = restored.related("child").expect("child is an instance");
    assert_eq!(related.class(), &child);
    assert_eq!(related.get("hello").and_then(Value::as_str), Some("world"));
    assert_eq!(restored.get("count"), Some(&Value::Int(2345)));
}

#[test]
fn non_sequence_collections_become_empty() {
    let registry = Registry::new();
    let comment = registry
        .declare("Comment", |m| {
            m.attribute("message", AttributeOptions::new(STRING));
        })
        .unwrap();
    let user = registry
        .declare("User", |m| {
            m.attribute("name", AttributeOptions::new(STRING));
            m.association("comments", AssociationOptions::new(HAS_MANY).target(&comment));
            m.association("groups", AssociationOptions::new(BELONGS_TO_MANY).target(&comment));
        })
        .unwrap();

    let cx = Cx::for_testing();
    let restored = unwrap_outcome(block_on(registry.deserialize(
        &cx,
        &user,
        &json!({"name": "Alice", "comments": "not a list", "groups": {"message": "x"}}),
        DeserializeOptions::default(),
    )));
    assert_eq!(restored.get("comments"), Some(&Value::Array(Vec::new())));
    assert_eq!(restored.get("groups"), Some(&Value::Array(Vec::new())));

    let mut instance = registry.new_instance(&user);
    instance.set("name", "Alice");
    instance.set("comments", 42);
    let data = unwrap_outcome(block_on(registry.serialize(
        &cx,
        &instance,
        SerializeOptions::default(),
    )));
    assert_eq!(data, json!({"name": "Alice", "comments": []}));
}

#[test]
fn depth_limits_recursion() {
    let registry = Registry::new();
    let node = registry
        .declare("Node", |m| {
            m.attribute("id", AttributeOptions::new(INTEGER));
            m.association("next", AssociationOptions::new(HAS_ONE));
        })
        .unwrap();
    registry
        .associate(
            &node,
            |props| Ok((props.property("next")?, AssociationTarget::from(&node))),
            None,
        )
        .unwrap();

    let chain = json!({"id": 1, "next": {"id": 2, "next": {"id": 3, "next": {"id": 4}}}});
    let instance = registry.construct(&node, chain.clone(), ConstructOptions::default());

    let cx = Cx::for_testing();
    let data = unwrap_outcome(block_on(registry.serialize(
        &cx,
        &instance,
        SerializeOptions::default(),
    )));
    assert_eq!(data, json!({"id": 1, "next": {"id": 2, "next": {"id": 3}}}));

    let data = unwrap_outcome(block_on(registry.serialize(
        &cx,
        &instance,
        SerializeOptions::default().depth(0),
    )));
    assert_eq!(data, json!({"id": 1, "next": {"id": 2}}));

    let restored = unwrap_outcome(block_on(registry.deserialize(
        &cx,
        &node,
        &chain,
        DeserializeOptions::default().depth(0),
    )));
    let next = restored.related("next").expect("first level is followed");
    assert!(!next.has("next"));
}

#[test]
fn mutually_referencing_models_bind_after_declaration() {
    let registry = Arc::new(Registry::new());
    let author = registry
        .declare("Author", |m| {
            m.attribute("name", AttributeOptions::new(STRING));
            m.association("posts", AssociationOptions::new(HAS_MANY));
        })
        .unwrap();
    let post = registry
        .declare("Post", |m| {
            m.attribute("title", AttributeOptions::new(STRING));
            m.association("author", AssociationOptions::new(BELONGS_TO).target(&author));
        })
        .unwrap();

    let cx = Cx::for_testing();
    let data = json!({"name": "Ann", "posts": [{"title": "One"}, {"title": "Two"}]});

    // Following the unbound association fails until it is bound.
    match block_on(registry.deserialize(&cx, &author, &data, DeserializeOptions::default())) {
        Outcome::Err(Error::Resolution(e)) => {
            assert_eq!(e.model, "Author");
            assert_eq!(e.key, "posts");
        }
        _ => panic!("expected a resolution error"),
    }

    registry
        .associate(
            &author,
            |props| Ok((props.property("posts")?, AssociationTarget::from(&post))),
            None,
        )
        .unwrap();

    let restored = unwrap_outcome(block_on(registry.deserialize(
        &cx,
        &author,
        &data,
        DeserializeOptions::default(),
    )));
    let titles: Vec<&str> = restored
        .related_many("posts")
        .filter_map(|p| p.get("title").and_then(Value::as_str))
        .collect();
    assert_eq!(titles, vec!["One", "Two"]);
    assert!(restored.related_many("posts").all(|p| p.class() == &post));
}

#[test]
fn deserialize_does_not_touch_input() {
    let registry = Registry::new();
    let class = registry
        .declare("Stamp", |m| {
            m.attribute("at", AttributeOptions::new(DATETIME));
        })
        .unwrap();

    let input = json!({"at": "2020-01-02 03:04:05", "extra": 1});
    let snapshot = input.clone();

    let cx = Cx::for_testing();
    let instance = unwrap_outcome(block_on(registry.deserialize(
        &cx,
        &class,
        &input,
        DeserializeOptions::default(),
    )));

    assert_eq!(input, snapshot);
    assert!(!instance.has("extra"));
    assert_eq!(
        instance.get("at").and_then(Value::as_timestamp),
        Some(&Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap())
    );
}

#[test]
fn global_registry_backs_default_safe() {
    let class = Registry::global()
        .declare("GlobalThing", |m| {
            m.attribute("label", AttributeOptions::new(TEXT));
        })
        .unwrap();

    let mut safe = Safe::default();
    safe.define(&class).unwrap();
    assert!(safe.is_defined(&class));
    assert!(
        safe.interact(&class, |props| props.contains("label"))
            .unwrap()
    );
}
