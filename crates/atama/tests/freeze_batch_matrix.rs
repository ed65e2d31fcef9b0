use std::sync::{Arc, Mutex};

use atama::{ChangeStack, Engine, EngineError, EngineOptions, TraceMode};
use serde_json::{json, Map, Value};

fn quiet_engine() -> Engine {
    Engine::with_options(EngineOptions {
        traces: TraceMode::Disabled,
        ..EngineOptions::default()
    })
}

fn counter(engine: &Engine, path: Option<&str>) -> Arc<Mutex<Vec<String>>> {
    let keys = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&keys);
    engine.subscribe(path, move |_: &Value, stack: &ChangeStack| {
        sink.lock().unwrap().push(stack.key());
    });
    keys
}

#[test]
fn freeze_batch_matrix_consolidates_notifications() {
    let mut engine = quiet_engine();
    let root = counter(&engine, None);
    let a = counter(&engine, Some("a"));
    let z = counter(&engine, Some("z"));

    engine.freeze(|engine| {
        engine.set("a", json!({"b": 1})).unwrap();
        engine.set("a.b", 2).unwrap();
        engine.set("c", 3).unwrap();
        assert!(engine.is_frozen());
    });

    assert!(!engine.is_frozen());
    assert_eq!(root.lock().unwrap().as_slice(), &["c".to_string()]);
    assert_eq!(a.lock().unwrap().as_slice(), &["a.b".to_string()]);
    assert!(z.lock().unwrap().is_empty());
    assert_eq!(engine.history().len(), 3);
}

#[test]
fn freeze_batch_matrix_nested_freeze_flushes_at_outermost() {
    let mut engine = quiet_engine();
    let root = counter(&engine, None);

    engine.freeze(|engine| {
        engine.set("x", 1).unwrap();
        engine.freeze(|engine| {
            engine.set("y", 2).unwrap();
        });
        assert!(root.lock().unwrap().is_empty());
        engine.set("z", 3).unwrap();
    });

    assert_eq!(root.lock().unwrap().len(), 1);
}

#[test]
fn freeze_batch_matrix_quiet_freeze_notifies_nobody() {
    let mut engine = quiet_engine();
    engine.set("x", 1).unwrap();
    let root = counter(&engine, None);

    let value = engine.freeze(|engine| {
        engine.set("x", 1).unwrap();
        engine.get("x")
    });

    assert_eq!(value, Some(json!(1)));
    assert!(root.lock().unwrap().is_empty());
}

#[test]
fn freeze_batch_matrix_error_still_flushes_applied_changes() {
    let mut engine = quiet_engine();
    let root = counter(&engine, None);

    let outcome = engine.freeze(|engine| -> Result<(), EngineError> {
        engine.set("a", 1)?;
        engine.set("missing.key", 2)?;
        Ok(())
    });

    assert!(matches!(outcome, Err(EngineError::PathNotFound(_))));
    assert_eq!(engine.get("a"), Some(json!(1)));
    assert_eq!(root.lock().unwrap().len(), 1);
}

#[test]
fn freeze_batch_matrix_merge() {
    let mut engine = quiet_engine();
    engine.set("keep", true).unwrap();
    let root = counter(&engine, None);

    let mut added = Map::new();
    added.insert("name".into(), json!("Ann"));
    added.insert("age".into(), json!(30));
    assert!(engine.merge(added.clone()).unwrap());
    assert_eq!(root.lock().unwrap().len(), 1);
    assert_eq!(engine.view(), json!({"keep": true, "name": "Ann", "age": 30}));

    assert!(!engine.merge(added).unwrap());
    assert_eq!(root.lock().unwrap().len(), 1);
}

#[test]
fn freeze_batch_matrix_unsubscribed_during_freeze() {
    let mut engine = quiet_engine();
    let keys = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&keys);
    let sub = engine.subscribe(None, move |_: &Value, stack: &ChangeStack| {
        sink.lock().unwrap().push(stack.key());
    });

    engine.freeze(|engine| {
        engine.set("x", 1).unwrap();
        sub.unsubscribe();
    });

    assert!(keys.lock().unwrap().is_empty());
}
