//! The store registry: schema definitions plus one open store per schema name.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::{debug, warn};

use crate::{
    Error, FileStore, FileStoreOptions, Result, SchemaStore,
    backend::{MemoryBackend, SchemaBackend},
    clock::SystemClock,
    monitor::NotifyChangeSource,
    schema::Schema,
};

/// Owns schema definitions and the open schema stores.
///
/// [`open_schema_store`](Self::open_schema_store) hands out the same store for
/// a given schema name until it is [`close`](Self::close)d, so every binding
/// on that schema shares one store and one set of notifications.
pub struct StoreRegistry {
    /// Persistence for every schema store.
    backend: Rc<dyn SchemaBackend>,
    /// Registered definitions by schema id.
    schemas: RefCell<HashMap<String, Schema>>,
    /// Open stores by schema id.
    open: RefCell<HashMap<String, SchemaStore>>,
    /// Options for file stores opened here.
    file_options: FileStoreOptions,
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("schemas", &self.schema_names())
            .field("open", &self.open_count())
            .finish()
    }
}

impl StoreRegistry {
    /// Create a registry persisting schema stores through `backend`.
    pub fn new(backend: Rc<dyn SchemaBackend>) -> Self {
        Self {
            backend,
            schemas: RefCell::new(HashMap::new()),
            open: RefCell::new(HashMap::new()),
            file_options: FileStoreOptions::default(),
        }
    }

    /// Create a registry whose schema stores live in memory.
    pub fn in_memory() -> Self {
        Self::new(Rc::new(MemoryBackend::new()))
    }

    /// Use `options` for file stores opened through this registry.
    #[must_use]
    pub fn with_file_options(mut self, options: FileStoreOptions) -> Self {
        self.file_options = options;
        self
    }

    /// Register a schema definition. An already open store keeps the
    /// definition it was opened with.
    pub fn register_schema(&self, schema: Schema) {
        let id = schema.id().to_string();
        if self.is_open(&id) {
            warn!(schema = %id, "schema re-registered while open; open store unchanged");
        }
        debug!(schema = %id, "schema registered");
        self.schemas.borrow_mut().insert(id, schema);
    }

    /// Register every `*.json` schema definition in `dir`, returning how many
    /// were loaded.
    pub fn load_schema_dir(&self, dir: &Path) -> Result<usize> {
        let read_err = |source| Error::Read {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(read_err)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<_>>()
            .map_err(read_err)?;
        paths.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
        paths.sort();
        for path in &paths {
            self.register_schema(Schema::from_path(path)?);
        }
        Ok(paths.len())
    }

    /// Registered schema ids, sorted.
    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// The store for schema `name`, opening it on first use.
    pub fn open_schema_store(&self, name: &str) -> Result<SchemaStore> {
        if let Some(store) = self.open.borrow().get(name) {
            return Ok(store.clone());
        }
        let schema = self
            .schemas
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSchema {
                name: name.to_string(),
            })?;
        let store = SchemaStore::new(schema, Rc::clone(&self.backend));
        self.open
            .borrow_mut()
            .insert(name.to_string(), store.clone());
        debug!(schema = name, "schema store opened");
        Ok(store)
    }

    /// Open a file store over `path`. File stores are not cached: each call
    /// loads the document and owns its own watch.
    pub fn open_file_store(&self, path: impl Into<PathBuf>) -> Result<FileStore> {
        FileStore::open_with(
            path,
            self.file_options.clone(),
            Box::new(NotifyChangeSource::new()),
            Rc::new(SystemClock),
        )
    }

    /// Whether a store for `name` is open.
    pub fn is_open(&self, name: &str) -> bool {
        self.open.borrow().contains_key(name)
    }

    /// Forget the open store for `name`. Existing handles keep working; the
    /// next open creates a fresh store. Returns false if none was open.
    pub fn close(&self, name: &str) -> bool {
        let closed = self.open.borrow_mut().remove(name).is_some();
        if closed {
            debug!(schema = name, "schema store closed");
        }
        closed
    }

    /// Number of open schema stores.
    pub fn open_count(&self) -> usize {
        self.open.borrow().len()
    }
}
