use std::{cell::RefCell, fs, path::PathBuf, rc::Rc, time::Duration};

use serde_json::{Value, json};
use settings_engine::{
    Bindable, Direction, Error, FileStore, FileStoreOptions, ManualChangeSource, ManualClock,
    PropertyBag, WatchState,
};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    path: PathBuf,
    store: FileStore,
    events: ManualChangeSource,
    clock: Rc<ManualClock>,
}

fn open(doc: &Value) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, serde_json::to_vec_pretty(doc).unwrap()).unwrap();
    let events = ManualChangeSource::new();
    let clock = Rc::new(ManualClock::new());
    let store = FileStore::open_with(
        &path,
        FileStoreOptions::default(),
        Box::new(events.clone()),
        clock.clone(),
    )
    .unwrap();
    Harness {
        _dir: dir,
        path,
        store,
        events,
        clock,
    }
}

fn record_changes(store: &FileStore, key: &str) -> Rc<RefCell<Vec<Value>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    store.listen(key, move |_, v| s.borrow_mut().push(v.clone()));
    seen
}

#[test]
fn external_reload_notifies_changed_keys_only() {
    let h = open(&json!({ "a": { "value": 1 }, "b": { "value": 2 } }));
    let a_obj = PropertyBag::new();
    let b_obj = PropertyBag::new();
    let _ba = h.store.bind("a", a_obj.clone(), "value", Direction::Both).unwrap();
    let _bb = h.store.bind("b", b_obj.clone(), "value", Direction::Both).unwrap();
    let a_seen = record_changes(&h.store, "a");
    let b_seen = record_changes(&h.store, "b");
    let a_writes = a_obj.write_count();

    fs::write(&h.path, br#"{"a": {"value": 1}, "b": {"value": 9}}"#).unwrap();
    h.events.fire();
    assert_eq!(h.store.process_events().unwrap(), vec!["b"]);

    assert_eq!(*b_seen.borrow(), vec![json!(9)]);
    assert_eq!(b_obj.property("value"), Some(json!(9)));
    assert!(a_seen.borrow().is_empty());
    assert_eq!(a_obj.write_count(), a_writes);
    assert_eq!(h.store.write_count(), 0, "reload never writes back");
}

#[test]
fn self_write_is_not_treated_as_external_change() {
    let h = open(&json!({ "a": { "value": 1 }, "b": { "value": 2 } }));
    let b_seen = record_changes(&h.store, "b");

    h.store.set("b", json!(9)).unwrap();
    assert_eq!(*b_seen.borrow(), vec![json!(9)]);
    assert_eq!(h.store.state(), WatchState::WatchingPaused);

    // The write's own change event arrives while the watch is paused.
    h.events.fire();
    assert!(h.store.process_events().unwrap().is_empty());
    assert_eq!(h.events.dropped(), 1);

    h.clock.advance(Duration::from_millis(1999));
    assert!(h.store.process_events().unwrap().is_empty());
    assert_eq!(h.store.state(), WatchState::WatchingPaused);

    h.clock.advance(Duration::from_millis(1));
    assert!(h.store.process_events().unwrap().is_empty());
    assert_eq!(h.store.state(), WatchState::WatchingActive);

    // A late residual event for the store's own bytes is skipped.
    h.events.fire();
    assert!(h.store.process_events().unwrap().is_empty());
    assert_eq!(b_seen.borrow().len(), 1);

    // A genuine edit after the quiet delay is detected.
    fs::write(&h.path, br#"{"a": {"value": 1}, "b": {"value": 3}}"#).unwrap();
    h.events.fire();
    assert_eq!(h.store.process_events().unwrap(), vec!["b"]);
    assert_eq!(*b_seen.borrow(), vec![json!(9), json!(3)]);
}

#[test]
fn idempotent_set_writes_once() {
    let h = open(&json!({ "b": { "value": 2 } }));
    let b_seen = record_changes(&h.store, "b");
    h.store.set("b", json!(9)).unwrap();
    h.store.set("b", json!(9)).unwrap();
    assert_eq!(h.store.write_count(), 1);
    assert_eq!(b_seen.borrow().len(), 1);
}

#[test]
fn bound_object_changes_do_not_echo() {
    let h = open(&json!({ "name": { "value": "x" } }));
    let obj = PropertyBag::new();
    let _binding = h
        .store
        .bind("name", obj.clone(), "text", Direction::Both)
        .unwrap();
    assert_eq!(obj.property("text"), Some(json!("x")));

    h.store.set("name", json!("y")).unwrap();
    assert_eq!(obj.property("text"), Some(json!("y")));
    assert_eq!(h.store.write_count(), 1);

    obj.set_property("text", json!("z"));
    assert_eq!(h.store.get("name").unwrap(), json!("z"));
    assert_eq!(h.store.write_count(), 2);
    let on_disk: Value = serde_json::from_slice(&fs::read(&h.path).unwrap()).unwrap();
    assert_eq!(on_disk["name"]["value"], json!("z"));
}

#[test]
fn sibling_bindings_follow_each_other() {
    let h = open(&json!({ "size": { "value": 10 } }));
    let spin = PropertyBag::new();
    let slider = PropertyBag::new();
    let _a = h.store.bind("size", spin.clone(), "value", Direction::Both).unwrap();
    let _b = h
        .store
        .bind("size", slider.clone(), "value", Direction::Both)
        .unwrap();
    spin.set_property("value", json!(12));
    assert_eq!(slider.property("value"), Some(json!(12)));
    assert_eq!(h.store.write_count(), 1);
}

#[test]
fn malformed_document_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, b"{ \"a\": { \"value\": 1 ").unwrap();
    let result = FileStore::open_with(
        &path,
        FileStoreOptions::default(),
        Box::new(ManualChangeSource::new()),
        Rc::new(ManualClock::new()),
    );
    assert!(matches!(result, Err(Error::Parse { .. })));
}

#[test]
fn missing_document_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let result = FileStore::open_with(
        dir.path().join("absent.json"),
        FileStoreOptions::default(),
        Box::new(ManualChangeSource::new()),
        Rc::new(ManualClock::new()),
    );
    assert!(matches!(result, Err(Error::Read { .. })));
}

#[test]
fn dependency_field_drives_sensitivity() {
    let h = open(&json!({
        "show-panel": { "type": "switch", "value": false },
        "opacity": { "type": "spinbutton", "value": 40, "min": 0, "max": 100,
                     "dependency": "show-panel" }
    }));
    let spin = PropertyBag::new();
    let _binding = h
        .store
        .bind("opacity", spin.clone(), "value", Direction::Both)
        .unwrap();
    assert!(!spin.is_sensitive());
    let flips = spin.sensitivity_flips();

    h.store.set("show-panel", json!(true)).unwrap();
    assert!(spin.is_sensitive());
    assert_eq!(spin.sensitivity_flips(), flips + 1);

    let edited = json!({
        "show-panel": { "value": false },
        "opacity": { "value": 40, "dependency": "show-panel" }
    });
    fs::write(&h.path, serde_json::to_vec(&edited).unwrap()).unwrap();
    h.store.check_settings().unwrap();
    assert!(!spin.is_sensitive());
}

#[test]
fn dependency_gates_despite_malformed_hints() {
    let h = open(&json!({
        "show": { "value": false },
        "opacity": { "value": 40, "dependency": "show", "round": "2" }
    }));
    let spin = PropertyBag::new();
    let _binding = h
        .store
        .bind("opacity", spin.clone(), "value", Direction::Both)
        .unwrap();
    assert!(!spin.is_sensitive());

    h.store.set("show", json!(true)).unwrap();
    assert!(spin.is_sensitive());
    h.store.set("show", json!(false)).unwrap();
    assert!(!spin.is_sensitive());
}

#[test]
fn write_failure_rolls_back() {
    let h = open(&json!({ "a": { "value": 1 } }));
    let seen = record_changes(&h.store, "a");
    // Replacing the document with a directory makes the write fail.
    fs::remove_file(&h.path).unwrap();
    fs::create_dir(&h.path).unwrap();
    let err = h.store.set("a", json!(2)).unwrap_err();
    assert!(matches!(err, Error::Write { .. }));
    assert_eq!(h.store.get("a").unwrap(), json!(1));
    assert!(seen.borrow().is_empty());
    assert_eq!(h.store.write_count(), 0);
}
