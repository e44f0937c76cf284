//! One-way links from a boolean key to an object's sensitivity.

use std::{cell::Cell, fmt, rc::Rc};

use tracing::{debug, trace};

use crate::{
    Bindable, MapFn, Result, Value,
    signal::HandlerId,
    store::{SettingsStore, StoreHandle},
    value::truthy,
};

/// Shared link state, referenced weakly from the store subscription.
struct LinkCore {
    /// Observed store.
    store: StoreHandle,
    /// Observed key.
    key: String,
    /// Object whose sensitivity follows the key.
    target: Rc<dyn Bindable>,
    /// Applied to the key's value before truthiness is taken.
    map: Option<MapFn>,
    /// Store change subscription.
    handler: Cell<Option<HandlerId>>,
}

impl LinkCore {
    /// Set the target's sensitivity from `value`.
    fn apply(&self, value: &Value) {
        let sensitive = match &self.map {
            Some(f) => truthy(&f(value)),
            None => truthy(value),
        };
        trace!(key = %self.key, sensitive, "dependency_apply");
        self.target.set_sensitive(sensitive);
    }
}

/// Drives a target's sensitivity from a key's value. Target changes never
/// write back.
///
/// Dropping the link releases it.
#[must_use = "a dependency link is released when dropped"]
pub struct DependencyLink {
    /// Shared state.
    core: Rc<LinkCore>,
}

impl fmt::Debug for DependencyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyLink")
            .field("store", &self.core.store.kind())
            .field("key", &self.core.key)
            .field("released", &self.is_released())
            .finish()
    }
}

impl DependencyLink {
    /// Link `key` of `store` to the sensitivity of `target`.
    pub fn new(store: impl Into<StoreHandle>, key: &str, target: Rc<dyn Bindable>) -> Result<Self> {
        Self::with_mapping(store, key, target, None)
    }

    /// Link through `map`, for keys that are not themselves boolean.
    pub fn with_mapping(
        store: impl Into<StoreHandle>,
        key: &str,
        target: Rc<dyn Bindable>,
        map: Option<MapFn>,
    ) -> Result<Self> {
        let store = store.into();
        let current = store.get(key)?;
        let core = Rc::new(LinkCore {
            store,
            key: key.to_string(),
            target,
            map,
            handler: Cell::new(None),
        });
        core.apply(&current);
        let weak = Rc::downgrade(&core);
        let id = core.store.subscribe(
            key,
            Rc::new(move |_: &str, value: &Value| {
                if let Some(core) = weak.upgrade() {
                    core.apply(value);
                }
            }),
        );
        core.handler.set(Some(id));
        debug!(store = core.store.kind(), key, "dependency link created");
        Ok(Self { core })
    }

    /// Observed key.
    pub fn key(&self) -> &str {
        &self.core.key
    }

    /// Whether the link has been released.
    pub fn is_released(&self) -> bool {
        self.core.handler.get().is_none()
    }

    /// Stop following the key. Releasing twice is a no-op.
    pub fn release(&self) {
        if let Some(id) = self.core.handler.take() {
            self.core.store.unsubscribe(id);
            trace!(key = %self.core.key, "dependency_released");
        }
    }
}

impl Drop for DependencyLink {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{MemoryBackend, PropertyBag, Schema, SchemaStore};

    /// A store with a boolean and a string key.
    fn store() -> SchemaStore {
        let schema = Schema::from_json_str(
            r#"{ "id": "org.test", "keys": {
                "enabled": { "type": "b", "default": false },
                "mode": { "type": "s", "default": "off", "choices": ["off", "on", "auto"] }
            } }"#,
        )
        .unwrap();
        SchemaStore::new(schema, Rc::new(MemoryBackend::new()))
    }

    #[test]
    fn follows_boolean_key() {
        let store = store();
        let bag = PropertyBag::new();
        let link = DependencyLink::new(&store, "enabled", bag.clone()).unwrap();
        assert!(!bag.is_sensitive());
        store.set("enabled", json!(true)).unwrap();
        assert!(bag.is_sensitive());

        link.release();
        link.release();
        store.set("enabled", json!(false)).unwrap();
        assert!(bag.is_sensitive());
    }

    #[test]
    fn mapped_key() {
        let store = store();
        let bag = PropertyBag::new();
        let map: MapFn = Rc::new(|v: &Value| json!(v != "off"));
        let _link = DependencyLink::with_mapping(&store, "mode", bag.clone(), Some(map)).unwrap();
        assert!(!bag.is_sensitive());
        store.set("mode", json!("auto")).unwrap();
        assert!(bag.is_sensitive());
    }

    #[test]
    fn target_changes_do_not_write_back() {
        let store = store();
        let bag = PropertyBag::new();
        let _link = DependencyLink::new(&store, "enabled", bag.clone()).unwrap();
        bag.set_sensitive(true);
        assert_eq!(store.get("enabled").unwrap(), json!(false));
        assert_eq!(store.mutation_count(), 0);
    }
}
