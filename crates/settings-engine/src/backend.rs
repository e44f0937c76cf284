//! Persistence services behind schema stores.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::{Serializer, ser::PrettyFormatter};
use tracing::debug;

use crate::{Error, Result, Value};

/// A named-schema key/value service.
///
/// Values handed to [`SchemaBackend::write`] have already been validated
/// against the key's declared range; a backend may still refuse them (for
/// example a locked-down key) by returning `Ok(false)`.
pub trait SchemaBackend {
    /// Stored value for `key`, or `None` when the default applies.
    fn read(&self, schema: &str, key: &str) -> Result<Option<Value>>;

    /// Persist `value`. Returns `Ok(false)` if the backend refuses it.
    fn write(&self, schema: &str, key: &str, value: &Value) -> Result<bool>;

    /// Forget the stored value so the default applies again.
    fn remove(&self, schema: &str, key: &str) -> Result<()>;
}

/// In-process backend, for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Stored values by `(schema, key)`.
    values: RefCell<HashMap<(String, String), Value>>,
    /// Keys whose writes are refused.
    refused: RefCell<HashSet<(String, String)>>,
    /// Number of accepted writes.
    writes: Cell<usize>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or stop refusing) writes to `schema`/`key`.
    pub fn refuse_writes(&self, schema: &str, key: &str, refuse: bool) {
        let id = (schema.to_string(), key.to_string());
        let mut refused = self.refused.borrow_mut();
        if refuse {
            refused.insert(id);
        } else {
            refused.remove(&id);
        }
    }

    /// Number of accepted writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

impl SchemaBackend for MemoryBackend {
    fn read(&self, schema: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .values
            .borrow()
            .get(&(schema.to_string(), key.to_string()))
            .cloned())
    }

    fn write(&self, schema: &str, key: &str, value: &Value) -> Result<bool> {
        let id = (schema.to_string(), key.to_string());
        if self.refused.borrow().contains(&id) {
            return Ok(false);
        }
        self.values.borrow_mut().insert(id, value.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(true)
    }

    fn remove(&self, schema: &str, key: &str) -> Result<()> {
        self.values
            .borrow_mut()
            .remove(&(schema.to_string(), key.to_string()));
        Ok(())
    }
}

/// Durable backend: one pretty-printed JSON object per schema, stored as
/// `<dir>/<schema>.json`.
///
/// Every write rewrites the schema's file through a temporary file and a
/// rename, so a `set` is on disk when it returns.
#[derive(Debug)]
pub struct JsonDirBackend {
    /// Directory holding one file per schema.
    dir: PathBuf,
    /// Loaded schema files, keyed by schema id.
    cache: RefCell<HashMap<String, BTreeMap<String, Value>>>,
}

impl JsonDirBackend {
    /// Use `dir`, creating it if necessary.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| Error::Write {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// File holding `schema`'s values.
    pub fn path_for(&self, schema: &str) -> PathBuf {
        self.dir.join(format!("{schema}.json"))
    }

    /// Run `f` over the cached values of `schema`, loading them first if needed.
    fn with_values<T>(
        &self,
        schema: &str,
        f: impl FnOnce(&mut BTreeMap<String, Value>) -> T,
    ) -> Result<T> {
        let mut cache = self.cache.borrow_mut();
        if !cache.contains_key(schema) {
            let loaded = load_values(&self.path_for(schema))?;
            cache.insert(schema.to_string(), loaded);
        }
        let values = cache
            .get_mut(schema)
            .ok_or_else(|| Error::invalid_schema(schema, "value cache missing"))?;
        Ok(f(values))
    }

    /// Persist the cached values of `schema`.
    fn flush(&self, schema: &str) -> Result<()> {
        let path = self.path_for(schema);
        let cache = self.cache.borrow();
        let Some(values) = cache.get(schema) else {
            return Ok(());
        };
        let bytes = to_pretty(values, 4);
        write_replace(&path, &bytes).map_err(|source| Error::Write { path, source })?;
        debug!(schema, "schema values persisted");
        Ok(())
    }
}

impl SchemaBackend for JsonDirBackend {
    fn read(&self, schema: &str, key: &str) -> Result<Option<Value>> {
        self.with_values(schema, |values| values.get(key).cloned())
    }

    fn write(&self, schema: &str, key: &str, value: &Value) -> Result<bool> {
        let previous = self.with_values(schema, |values| {
            values.insert(key.to_string(), value.clone())
        })?;
        if let Err(e) = self.flush(schema) {
            self.with_values(schema, |values| match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            })?;
            return Err(e);
        }
        Ok(true)
    }

    fn remove(&self, schema: &str, key: &str) -> Result<()> {
        let removed = self.with_values(schema, |values| values.remove(key))?;
        if removed.is_some() {
            self.flush(schema)?;
        }
        Ok(())
    }
}

/// Load a schema values file; a missing file means nothing is stored yet.
fn load_values(path: &Path) -> Result<BTreeMap<String, Value>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(Error::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Serialize `value` as pretty JSON with `indent` spaces, plus a trailing newline.
pub fn to_pretty<T: Serialize + ?Sized>(value: &T, indent: usize) -> Vec<u8> {
    let pad = vec![b' '; indent];
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&pad));
    // Serializing JSON values into memory cannot fail.
    if value.serialize(&mut ser).is_ok() {
        out.push(b'\n');
    }
    out
}

/// Write `bytes` to a sibling temporary file and rename it over `path`.
fn write_replace(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}
