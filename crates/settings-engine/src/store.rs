//! The store contract shared by bindings and dependency links.

use std::rc::Rc;

use crate::{
    FileStore, Result, SchemaStore, Value,
    signal::{ChangeFn, HandlerId},
};

/// Callback invoked with `(key, writable)` when a key's writability changes.
pub type WritableFn = dyn Fn(&str, bool);

/// Operations a binding needs from a settings store.
pub trait SettingsStore {
    /// Current value of `key`.
    fn get(&self, key: &str) -> Result<Value>;

    /// Validate and persist `value` for `key`, notifying subscribers on change.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Run `callback` whenever `key` changes value.
    fn subscribe(&self, key: &str, callback: Rc<ChangeFn>) -> HandlerId;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: HandlerId);

    /// Whether `key` may currently be written.
    fn is_writable(&self, key: &str) -> bool;

    /// Run `callback` whenever the writability of `key` changes. Stores whose
    /// keys are always writable return `None`.
    fn subscribe_writable(&self, key: &str, callback: Rc<WritableFn>) -> Option<HandlerId>;

    /// Key whose boolean value gates the sensitivity of controls bound to `key`.
    fn dependency_key(&self, key: &str) -> Option<String>;
}

/// The backend kinds a binding can be constructed against.
#[derive(Debug, Clone)]
pub enum StoreHandle {
    /// A schema-validated store.
    Schema(SchemaStore),
    /// A JSON-file-backed store.
    File(FileStore),
}

impl StoreHandle {
    /// Short backend name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema",
            Self::File(_) => "file",
        }
    }

    /// The underlying store as a trait object.
    fn inner(&self) -> &dyn SettingsStore {
        match self {
            Self::Schema(s) => s,
            Self::File(f) => f,
        }
    }
}

impl From<SchemaStore> for StoreHandle {
    fn from(store: SchemaStore) -> Self {
        Self::Schema(store)
    }
}

impl From<&SchemaStore> for StoreHandle {
    fn from(store: &SchemaStore) -> Self {
        Self::Schema(store.clone())
    }
}

impl From<FileStore> for StoreHandle {
    fn from(store: FileStore) -> Self {
        Self::File(store)
    }
}

impl From<&FileStore> for StoreHandle {
    fn from(store: &FileStore) -> Self {
        Self::File(store.clone())
    }
}

impl SettingsStore for StoreHandle {
    fn get(&self, key: &str) -> Result<Value> {
        self.inner().get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.inner().set(key, value)
    }

    fn subscribe(&self, key: &str, callback: Rc<ChangeFn>) -> HandlerId {
        self.inner().subscribe(key, callback)
    }

    fn unsubscribe(&self, id: HandlerId) {
        self.inner().unsubscribe(id);
    }

    fn is_writable(&self, key: &str) -> bool {
        self.inner().is_writable(key)
    }

    fn subscribe_writable(&self, key: &str, callback: Rc<WritableFn>) -> Option<HandlerId> {
        self.inner().subscribe_writable(key, callback)
    }

    fn dependency_key(&self, key: &str) -> Option<String> {
        self.inner().dependency_key(key)
    }
}
