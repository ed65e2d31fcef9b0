use std::sync::{Arc, Mutex};

use atama::node::MAX_SEQUENCE_PADDING;
use atama::{
    ChangeStack, Engine, EngineError, EngineOptions, EventKind, MemoryStore, Subscription,
    TraceMode,
};
use atama_path::PathError;
use serde_json::{json, Value};

type Seen = Arc<Mutex<Vec<(Value, String)>>>;

fn quiet_engine() -> Engine {
    Engine::with_options(EngineOptions {
        traces: TraceMode::Disabled,
        ..EngineOptions::default()
    })
}

fn record(engine: &Engine, path: Option<&str>) -> (Subscription, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = engine.subscribe(path, move |value: &Value, stack: &ChangeStack| {
        sink.lock().unwrap().push((value.clone(), stack.key()));
    });
    (sub, seen)
}

fn count(seen: &Seen) -> usize {
    seen.lock().unwrap().len()
}

#[test]
fn engine_events_matrix_equal_set_is_noop() {
    let mut engine = quiet_engine();
    let (_, root) = record(&engine, None);

    assert!(engine.set("x", 5).unwrap());
    assert!(!engine.set("x", 5).unwrap());
    assert!(!engine.set("x", 5.0).unwrap());

    assert_eq!(count(&root), 1);
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.history().last().unwrap().kind, EventKind::Create);
}

#[test]
fn engine_events_matrix_equal_container_is_noop() {
    let mut engine = quiet_engine();
    engine.set("user", json!({"name": "Ann", "tags": ["a"]})).unwrap();
    let (_, root) = record(&engine, None);

    assert!(!engine.set("user", json!({"tags": ["a"], "name": "Ann"})).unwrap());
    assert!(engine.set("user", json!({"name": "Ann", "tags": ["b"]})).unwrap());
    assert_eq!(count(&root), 1);
}

#[test]
fn engine_events_matrix_root_fires_once_per_mutation() {
    let mut engine = quiet_engine();
    let (_, root) = record(&engine, None);

    engine.set("a", json!({"b": 1})).unwrap();
    engine.set("a.b", 2).unwrap();
    engine.set("a.c", 3).unwrap();
    engine.remove("a.b").unwrap();

    let seen = root.lock().unwrap();
    let keys: Vec<_> = seen.iter().map(|(_, key)| key.as_str()).collect();
    assert_eq!(keys, vec!["a", "a.b", "a.c", "a.b"]);
    assert_eq!(seen[3].0, json!({"a": {"c": 3}}));
}

#[test]
fn engine_events_matrix_path_isolation() {
    let mut engine = quiet_engine();
    engine.set("a", json!({"b": {"d": 0}, "c": 0})).unwrap();
    let (_, ab) = record(&engine, Some("a.b"));

    engine.set("a.c", 1).unwrap();
    assert_eq!(count(&ab), 0);

    engine.set("a.b.d", 1).unwrap();
    assert_eq!(
        ab.lock().unwrap().as_slice(),
        &[(json!({"d": 1}), "a.b.d".to_string())]
    );

    engine.set("ab", 1).unwrap();
    assert_eq!(count(&ab), 1);
}

#[test]
fn engine_events_matrix_fan_out_fires_each_subscription_once() {
    let mut engine = quiet_engine();
    let (_, a) = record(&engine, Some("a"));
    let (_, ab) = record(&engine, Some("a.b"));
    let (_, ac) = record(&engine, Some("a.c"));

    engine.set("a", json!({"b": 1, "c": 2})).unwrap();
    assert_eq!((count(&a), count(&ab), count(&ac)), (1, 1, 1));
    assert_eq!(ab.lock().unwrap()[0].0, json!(1));

    engine.set("a.b", 5).unwrap();
    assert_eq!((count(&a), count(&ab), count(&ac)), (2, 2, 1));
}

#[test]
fn engine_events_matrix_missing_scope_yields_null() {
    let mut engine = quiet_engine();
    engine.set("a", json!({"b": 1})).unwrap();
    let (_, ab) = record(&engine, Some("a.b"));

    engine.remove("a").unwrap();
    assert_eq!(ab.lock().unwrap()[0].0, Value::Null);
}

#[test]
fn engine_events_matrix_sequence_delete_closes_gap() {
    let mut engine = quiet_engine();
    engine.set("list", json!([1, "a", false])).unwrap();
    let (_, list) = record(&engine, Some("list"));

    assert!(engine.remove("list.1").unwrap());
    assert_eq!(engine.get("list"), Some(json!([1, false])));
    assert_eq!(list.lock().unwrap()[0].0, json!([1, false]));

    assert!(!engine.remove("list.7").unwrap());
    assert_eq!(count(&list), 1);
}

#[test]
fn engine_events_matrix_sequence_set_pads_with_null() {
    let mut engine = quiet_engine();
    engine.set("list", json!([1])).unwrap();
    engine.set("list.3", 4).unwrap();
    assert_eq!(engine.get("list"), Some(json!([1, null, null, 4])));
}

#[test]
fn engine_events_matrix_delete_absent_key_is_noop() {
    let mut engine = quiet_engine();
    let (_, root) = record(&engine, None);
    assert!(!engine.remove("nothing").unwrap());
    assert_eq!(count(&root), 0);
    assert!(engine.history().is_empty());
}

#[test]
fn engine_events_matrix_change_stack_describes_ancestors() {
    let mut engine = quiet_engine();
    engine.set("user", json!({"profile": {"name": "Ann"}})).unwrap();
    let user_id = engine.at("user").wrapper_id().unwrap();
    let profile_id = engine.at("user.profile").wrapper_id().unwrap();

    let stacks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stacks);
    engine.subscribe(None, move |_: &Value, stack: &ChangeStack| {
        sink.lock().unwrap().push(stack.clone());
    });
    engine.set("user.profile.name", "Bob").unwrap();

    let stacks = stacks.lock().unwrap();
    let stack = &stacks[0];
    assert_eq!(stack.path(), vec!["user", "profile", "name"]);
    assert_eq!(stack.keys(), vec!["user", "user.profile", "user.profile.name"]);
    assert_eq!(stack[1].container, user_id);
    assert_eq!(stack[2].container, profile_id);
    assert_eq!(stack[2].previous, Some(json!("Ann")));
    assert_eq!(stack[2].value, Some(json!("Bob")));
    assert_eq!(stack[0].previous, None);
}

#[test]
fn engine_events_matrix_wrapper_identity() {
    let mut engine = quiet_engine();
    engine.set("user", json!({"name": "Ann"})).unwrap();
    let before = engine.at("user").wrapper_id();

    engine.set("user.name", "Bob").unwrap();
    assert_eq!(engine.at("user").wrapper_id(), before);

    engine.set("user", json!({"name": "Cy"})).unwrap();
    assert_ne!(engine.at("user").wrapper_id(), before);
}

#[test]
fn engine_events_matrix_unsubscribe_twice() {
    let mut engine = quiet_engine();
    let (sub, seen) = record(&engine, None);
    assert_eq!(engine.listener_count(), 1);
    assert!(sub.unsubscribe());
    assert!(!sub.unsubscribe());
    assert_eq!(engine.listener_count(), 0);
    engine.set("x", 1).unwrap();
    assert_eq!(count(&seen), 0);
}

#[test]
fn engine_events_matrix_unsubscribe_during_dispatch() {
    let mut engine = quiet_engine();
    let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let target = Arc::clone(&later);
    let first_calls = Arc::new(Mutex::new(0usize));
    let first_sink = Arc::clone(&first_calls);
    let first = engine.subscribe(None, move |_: &Value, _: &ChangeStack| {
        *first_sink.lock().unwrap() += 1;
        if let Some(sub) = target.lock().unwrap().as_ref() {
            sub.unsubscribe();
        }
    });
    let (second, second_seen) = record(&engine, None);
    *later.lock().unwrap() = Some(second.clone());

    engine.set("x", 1).unwrap();
    assert_eq!(*first_calls.lock().unwrap(), 1);
    assert_eq!(count(&second_seen), 0);
    assert!(!second.is_active());
    assert!(first.is_active());
}

#[test]
fn engine_events_matrix_panicking_listener_is_isolated() {
    let mut engine = quiet_engine();
    engine.subscribe(None, |_: &Value, _: &ChangeStack| panic!("listener failed"));
    let (_, seen) = record(&engine, None);

    engine.set("x", 1).unwrap();
    engine.set("x", 2).unwrap();
    assert_eq!(count(&seen), 2);
    assert_eq!(engine.get("x"), Some(json!(2)));
}

#[test]
fn engine_events_matrix_user_name_flow() {
    let mut engine = quiet_engine();
    engine.set("user", json!({"name": "Ann", "age": 30})).unwrap();
    let (_, name) = record(&engine, Some("user.name"));
    let (_, root) = record(&engine, None);

    engine.set("user.name", "Bob").unwrap();
    engine.set("user.age", 31).unwrap();

    assert_eq!(
        name.lock().unwrap().as_slice(),
        &[(json!("Bob"), "user.name".to_string())]
    );
    assert_eq!(count(&root), 2);
    assert_eq!(engine.view(), json!({"user": {"name": "Bob", "age": 31}}));

    let updates = engine.history().by_type(EventKind::Update);
    let keys: Vec<_> = updates.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["user.name", "user.age"]);
}

#[test]
fn engine_events_matrix_listen_sugar() {
    let mut engine = quiet_engine();
    engine.set("card", json!({"user": "Ann"})).unwrap();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = engine
        .listen("card.$user", move |value: &Value, stack: &ChangeStack| {
            sink.lock().unwrap().push((value.clone(), stack.key()));
        })
        .unwrap();
    assert_eq!(sub.path(), Some("card.user"));

    engine.set("card.user", "Bob").unwrap();
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[
            (json!("Ann"), String::new()),
            (json!("Bob"), "card.user".to_string()),
        ]
    );

    let listens = engine.history().by_type(EventKind::Listen);
    assert_eq!(listens.last().unwrap().key, "card.user");

    assert!(matches!(
        engine.listen("card.user", |_: &Value, _: &ChangeStack| {}),
        Err(EngineError::InvalidListenExpr(_))
    ));
}

#[test]
fn engine_events_matrix_strict_reserved_keys() {
    let mut engine = Engine::with_options(EngineOptions {
        strict_keys: true,
        traces: TraceMode::Disabled,
        ..EngineOptions::default()
    });
    assert!(matches!(engine.set("$user", 1), Err(EngineError::ReservedKey(k)) if k == "$user"));
    engine.set("a", json!({})).unwrap();
    assert!(matches!(engine.set("a.__meta", 1), Err(EngineError::ReservedKey(_))));
    assert!(matches!(engine.remove("a.$x"), Err(EngineError::ReservedKey(_))));
    assert_eq!(engine.view(), json!({"a": {}}));

    let mut lax = quiet_engine();
    assert!(lax.set("$user", 1).unwrap());
}

#[test]
fn engine_events_matrix_read_logging() {
    let mut engine = Engine::with_options(EngineOptions {
        log_reads: true,
        traces: TraceMode::Disabled,
        ..EngineOptions::default()
    });
    engine.set("x", 1).unwrap();
    assert_eq!(engine.get("x"), Some(json!(1)));
    assert_eq!(engine.get("y"), None);

    let reads = engine.history().by_type(EventKind::Read);
    assert_eq!(reads.len(), 2);
    assert_eq!(reads.get(0).unwrap().value, Some(json!(1)));
    assert_eq!(reads.get(1).unwrap().value, None);

    let mut silent = quiet_engine();
    silent.set("x", 1).unwrap();
    silent.get("x");
    assert!(silent.history().by_type(EventKind::Read).is_empty());
}

#[test]
fn engine_events_matrix_invalid_keys() {
    let mut engine = quiet_engine();
    assert!(matches!(engine.set("a..b", 1), Err(EngineError::InvalidPath(_))));
    assert!(matches!(engine.set("", 1), Err(EngineError::EmptyPath)));
    assert!(matches!(engine.remove(""), Err(EngineError::EmptyPath)));
}

#[test]
fn engine_events_matrix_user_name_subscribed_before_user_exists() {
    let mut engine = quiet_engine();
    let (_, name) = record(&engine, Some("user.name"));

    engine.set("user", json!({"name": "Ann", "age": 30})).unwrap();
    assert_eq!(
        name.lock().unwrap().as_slice(),
        &[(json!("Ann"), "user".to_string())]
    );

    engine.set("user.age", 31).unwrap();
    assert!(!engine.set("user.name", "Ann").unwrap());
    assert_eq!(count(&name), 1);

    engine.set("user.name", "Bea").unwrap();
    assert_eq!(count(&name), 2);
    assert_eq!(name.lock().unwrap()[1], (json!("Bea"), "user.name".to_string()));
}

#[test]
fn engine_events_matrix_unrepresentable_index_changes_nothing() {
    let mut engine = quiet_engine();
    engine.set("list", json!([1])).unwrap();
    let (_, root) = record(&engine, None);

    for index in [
        "99999999999999999999".to_string(),
        usize::MAX.to_string(),
        (MAX_SEQUENCE_PADDING + 2).to_string(),
    ] {
        assert!(matches!(
            engine.set(&format!("list.{index}"), 7),
            Err(EngineError::InvalidIndex { .. })
        ));
    }
    assert!(matches!(
        engine.remove("list.99999999999999999999"),
        Err(EngineError::InvalidIndex { .. })
    ));

    assert_eq!(engine.view(), json!({"list": [1]}));
    assert_eq!(engine.history().len(), 1);
    assert_eq!(count(&root), 0);
}

#[test]
fn engine_events_matrix_padding_up_to_the_cap() {
    let mut engine = quiet_engine();
    engine.set("list", json!([])).unwrap();
    assert!(engine.set(&format!("list.{MAX_SEQUENCE_PADDING}"), 1).unwrap());
    assert_eq!(engine.at("list").len(), MAX_SEQUENCE_PADDING + 1);
}

#[test]
fn engine_events_matrix_steps_with_separator_are_rejected() {
    let mut engine = quiet_engine();
    let (_, ab) = record(&engine, Some("a.b"));

    assert!(matches!(
        engine.attach_root().at_key("a.b").set(1),
        Err(EngineError::InvalidPath(PathError::SeparatorInStep(_)))
    ));
    assert!(matches!(
        engine.set_path(&["a", ""], json!(1)),
        Err(EngineError::InvalidPath(PathError::EmptySegment(_)))
    ));
    assert!(matches!(
        engine.remove_path(&["a.b"]),
        Err(EngineError::InvalidPath(PathError::SeparatorInStep(_)))
    ));

    assert_eq!(engine.view(), json!({}));
    assert!(engine.history().is_empty());
    assert_eq!(count(&ab), 0);

    let store = MemoryStore::with_blob(r#"{"timestamp": 1, "data": {"a.b": 1}}"#);
    assert!(matches!(
        Engine::with_persistence(EngineOptions::default(), store),
        Err(EngineError::InvalidPath(_))
    ));
}
