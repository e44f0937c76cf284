//! Schema-validated settings store.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
};

use tracing::{debug, trace, warn};

use crate::{
    BindOptions, Binding, Bindable, Direction, Error, MapFn, Result, Value,
    backend::SchemaBackend,
    coerce::{coerce, writable_range},
    schema::{KeySpec, Schema},
    signal::{ChangeFn, HandlerId, Signal},
    store::{SettingsStore, WritableFn},
    value::ValueRange,
};

/// Shared state behind every handle to one schema store.
struct SchemaInner {
    /// Key declarations.
    schema: Schema,
    /// Persistence service.
    backend: Rc<dyn SchemaBackend>,
    /// Current writability per key.
    writable: RefCell<HashMap<String, bool>>,
    /// `changed::<key>` handlers.
    changed: Signal<ChangeFn>,
    /// `writable-changed::<key>` handlers.
    writable_changed: Signal<WritableFn>,
    /// Number of committed mutations.
    mutations: Cell<usize>,
}

/// Handle to a schema-validated store. Clones share the same store.
///
/// Obtain handles through
/// [`StoreRegistry::open_schema_store`](crate::StoreRegistry::open_schema_store) so that one
/// store exists per schema name.
#[derive(Clone)]
pub struct SchemaStore {
    /// Shared state.
    inner: Rc<SchemaInner>,
}

impl fmt::Debug for SchemaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaStore")
            .field("schema", &self.inner.schema.id())
            .field("listeners", &self.inner.changed.len())
            .finish()
    }
}

impl SchemaStore {
    /// Create a store over `schema`, persisting through `backend`.
    pub fn new(schema: Schema, backend: Rc<dyn SchemaBackend>) -> Self {
        let writable = schema
            .keys()
            .filter_map(|k| schema.key(k).map(|spec| (k.to_string(), spec.writable)))
            .collect();
        Self {
            inner: Rc::new(SchemaInner {
                schema,
                backend,
                writable: RefCell::new(writable),
                changed: Signal::default(),
                writable_changed: Signal::default(),
                mutations: Cell::new(0),
            }),
        }
    }

    /// Schema identifier.
    pub fn schema_id(&self) -> &str {
        self.inner.schema.id()
    }

    /// Declared key names, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.schema.keys().map(str::to_string).collect()
    }

    /// Whether the schema declares `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.schema.key(key).is_some()
    }

    /// Declaration of `key`.
    fn spec(&self, key: &str) -> Result<&KeySpec> {
        self.inner
            .schema
            .key(key)
            .ok_or_else(|| Error::unknown_key(key))
    }

    /// Current value of `key`: the stored value, or the declared default.
    pub fn get(&self, key: &str) -> Result<Value> {
        let spec = self.spec(key)?;
        match self.inner.backend.read(self.schema_id(), key)? {
            Some(v) if spec.value_type.admits(&v) && coerce(&spec.range, v.clone()).is_ok() => {
                Ok(v)
            }
            Some(v) => {
                warn!(
                    schema = self.schema_id(),
                    key,
                    %v,
                    "stored value no longer valid; using default"
                );
                Ok(spec.default.clone())
            }
            None => Ok(spec.default.clone()),
        }
    }

    /// Validate `value` against the declared range and commit it.
    ///
    /// Assigning the current value is a no-op. On success the change is
    /// announced exactly once to every listener and binding on `key`.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let spec = self.spec(key)?;
        let value = coerce(&spec.range, value)?;
        if !self.is_writable(key) {
            return Err(Error::ValueRejected {
                key: key.to_string(),
            });
        }
        if self.get(key)? == value {
            trace!(schema = self.schema_id(), key, "set_unchanged");
            return Ok(());
        }
        if !self.inner.backend.write(self.schema_id(), key, &value)? {
            return Err(Error::ValueRejected {
                key: key.to_string(),
            });
        }
        self.inner.mutations.set(self.inner.mutations.get() + 1);
        debug!(schema = self.schema_id(), key, %value, "schema key set");
        self.inner.changed.emit(key, &value);
        Ok(())
    }

    /// Drop any stored value so the default applies, announcing the change
    /// if the effective value differs.
    pub fn reset(&self, key: &str) -> Result<()> {
        let before = self.get(key)?;
        self.inner.backend.remove(self.schema_id(), key)?;
        let after = self.get(key)?;
        if before != after {
            self.inner.mutations.set(self.inner.mutations.get() + 1);
            debug!(schema = self.schema_id(), key, "schema key reset");
            self.inner.changed.emit(key, &after);
        }
        Ok(())
    }

    /// Declared range of `key`.
    pub fn range(&self, key: &str) -> Result<ValueRange> {
        Ok(self.spec(key)?.range.clone())
    }

    /// `(min, max)` for bounded keys, `None` otherwise.
    pub fn writable_range(&self, key: &str) -> Result<Option<(Value, Value)>> {
        Ok(writable_range(&self.spec(key)?.range))
    }

    /// Display rounding for numeric controls: zero digits for integral keys.
    pub fn rounding(&self, key: &str) -> Result<Option<u32>> {
        Ok(self.spec(key)?.value_type.is_integral().then_some(0))
    }

    /// Change the writability of `key`, announcing it when it differs.
    pub fn set_writable(&self, key: &str, writable: bool) -> Result<()> {
        self.spec(key)?;
        let previous = self
            .inner
            .writable
            .borrow_mut()
            .insert(key.to_string(), writable);
        if previous != Some(writable) {
            debug!(schema = self.schema_id(), key, writable, "writability changed");
            self.inner
                .writable_changed
                .emit_with(key, |cb| cb(key, writable));
        }
        Ok(())
    }

    /// Run `callback` whenever `key` changes value.
    pub fn listen(&self, key: &str, callback: impl Fn(&str, &Value) + 'static) -> HandlerId {
        self.inner.changed.connect(Some(key), Rc::new(callback))
    }

    /// Remove a listener or binding subscription.
    pub fn unlisten(&self, id: HandlerId) {
        self.inner.changed.disconnect(id);
        self.inner.writable_changed.disconnect(id);
    }

    /// Number of committed mutations (writes and effective resets).
    pub fn mutation_count(&self) -> usize {
        self.inner.mutations.get()
    }

    /// Number of handlers that a change to `key` would reach.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.changed.count_for(key)
    }

    /// Bind `key` to `property` of `object` in `direction`.
    pub fn bind(
        &self,
        key: &str,
        object: Rc<dyn Bindable>,
        property: &str,
        direction: Direction,
    ) -> Result<Binding> {
        self.bind_with(key, object, property, BindOptions::new(direction))
    }

    /// Bind with value-mapping functions applied in each direction.
    pub fn bind_with_mapping(
        &self,
        key: &str,
        object: Rc<dyn Bindable>,
        property: &str,
        direction: Direction,
        map_get: Option<MapFn>,
        map_set: Option<MapFn>,
    ) -> Result<Binding> {
        let mut options = BindOptions::new(direction);
        options.map_get = map_get;
        options.map_set = map_set;
        self.bind_with(key, object, property, options)
    }

    /// Bind with explicit [`BindOptions`].
    pub fn bind_with(
        &self,
        key: &str,
        object: Rc<dyn Bindable>,
        property: &str,
        options: BindOptions,
    ) -> Result<Binding> {
        self.spec(key)?;
        Binding::new(self, key, object, property, options)
    }
}

impl SettingsStore for SchemaStore {
    fn get(&self, key: &str) -> Result<Value> {
        Self::get(self, key)
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        Self::set(self, key, value)
    }

    fn subscribe(&self, key: &str, callback: Rc<ChangeFn>) -> HandlerId {
        self.inner.changed.connect(Some(key), callback)
    }

    fn unsubscribe(&self, id: HandlerId) {
        self.unlisten(id);
    }

    fn is_writable(&self, key: &str) -> bool {
        self.inner
            .writable
            .borrow()
            .get(key)
            .copied()
            .unwrap_or(false)
    }

    fn subscribe_writable(&self, key: &str, callback: Rc<WritableFn>) -> Option<HandlerId> {
        Some(self.inner.writable_changed.connect(Some(key), callback))
    }

    fn dependency_key(&self, _key: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::MemoryBackend;

    /// Store over a small notification schema and a fresh memory backend.
    fn store() -> (SchemaStore, Rc<MemoryBackend>) {
        let schema = Schema::from_json_str(
            r#"{ "id": "org.test", "keys": {
                "enabled": { "type": "b", "default": true },
                "opacity": { "type": "i", "default": 40, "range": [0, 100] },
                "size": { "type": "s", "default": "small", "choices": ["small", "large"] },
                "locked": { "type": "b", "default": false, "writable": false }
            } }"#,
        )
        .unwrap();
        let backend = Rc::new(MemoryBackend::new());
        let store = SchemaStore::new(schema, backend.clone());
        (store, backend)
    }

    #[test]
    fn unknown_key_fails() {
        let (store, _) = store();
        assert!(matches!(store.get("nope"), Err(Error::UnknownKey { .. })));
        assert!(matches!(
            store.set("nope", json!(1)),
            Err(Error::UnknownKey { .. })
        ));
    }

    #[test]
    fn rejected_values_leave_store_unchanged() {
        let (store, backend) = store();
        let err = store.set("opacity", json!(150)).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert!(matches!(
            store.set("enabled", json!("yes")),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.set("size", json!("huge")),
            Err(Error::InvalidEnumValue { .. })
        ));
        assert_eq!(store.get("opacity").unwrap(), json!(40));
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn idempotent_set_notifies_once() {
        let (store, backend) = store();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        store.listen("opacity", move |_, _| h.set(h.get() + 1));

        store.set("opacity", json!(70)).unwrap();
        store.set("opacity", json!(70)).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(backend.write_count(), 1);
        assert_eq!(store.mutation_count(), 1);
    }

    #[test]
    fn backend_refusal_surfaces() {
        let (store, backend) = store();
        backend.refuse_writes("org.test", "opacity", true);
        assert!(matches!(
            store.set("opacity", json!(10)),
            Err(Error::ValueRejected { .. })
        ));
    }

    #[test]
    fn lockdown_and_writability_signal() {
        let (store, _) = store();
        assert!(matches!(
            store.set("locked", json!(true)),
            Err(Error::ValueRejected { .. })
        ));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        store.subscribe_writable("locked", Rc::new(move |_: &str, w: bool| s.borrow_mut().push(w)));
        store.set_writable("locked", true).unwrap();
        store.set_writable("locked", true).unwrap();
        store.set("locked", json!(true)).unwrap();
        assert_eq!(*seen.borrow(), vec![true]);
    }

    #[test]
    fn reset_restores_default() {
        let (store, _) = store();
        store.set("size", json!("large")).unwrap();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        store.listen("size", move |_, v| {
            assert_eq!(v, &json!("small"));
            h.set(h.get() + 1);
        });
        store.reset("size").unwrap();
        store.reset("size").unwrap();
        assert_eq!(store.get("size").unwrap(), json!("small"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn range_introspection() {
        let (store, _) = store();
        assert_eq!(
            store.writable_range("opacity").unwrap(),
            Some((json!(0), json!(100)))
        );
        assert_eq!(store.writable_range("size").unwrap(), None);
        assert_eq!(store.rounding("opacity").unwrap(), Some(0));
        assert_eq!(store.rounding("enabled").unwrap(), None);
    }

    #[test]
    fn invalid_stored_value_reads_as_default() {
        let (store, backend) = store();
        backend.write("org.test", "opacity", &json!(900)).unwrap();
        assert_eq!(store.get("opacity").unwrap(), json!(40));
    }
}
