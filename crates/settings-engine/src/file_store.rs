//! JSON-file-backed settings store.
//!
//! The document is a JSON object mapping each key to a record:
//!
//! ```json
//! {
//!     "show-panel": { "type": "switch", "value": true },
//!     "opacity": { "type": "spinbutton", "value": 40, "min": 0, "max": 100,
//!                  "dependency": "show-panel" }
//! }
//! ```
//!
//! The store reloads the whole document when the file changes on disk and
//! announces every key whose `value` differs from the previous snapshot. Its
//! own writes pause the watch, which resumes only after a quiet delay
//! following the last write, so they are never mistaken for external edits.

use std::{
    cell::{Cell, RefCell},
    fmt, fs, io,
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, Instant},
};

use serde::Deserialize;
use serde_json::Map;
use tracing::{debug, trace, warn};

use crate::{
    BindOptions, Binding, Bindable, Direction, Error, MapFn, Result, Value,
    backend::to_pretty,
    clock::{Clock, SystemClock},
    monitor::{ChangeSource, NotifyChangeSource},
    record::KeyRecord,
    signal::{ChangeFn, HandlerId, Signal},
    store::{SettingsStore, WritableFn},
    value::kind_name,
};

/// Callback invoked with the key that a `set` changed.
pub type KeyFn = dyn Fn(&str);

/// Watch state of a file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Not watching.
    Idle,
    /// Watching for external edits.
    WatchingActive,
    /// A self-initiated write happened; the watch resumes after the quiet delay.
    WatchingPaused,
}

/// File store tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileStoreOptions {
    /// Delay after the last self-write before the watch resumes.
    pub quiet_delay_ms: u64,
    /// Indent width of the persisted document.
    pub indent: usize,
    /// Ignore change events whose file bytes equal the last loaded or written snapshot.
    pub skip_unchanged_reloads: bool,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            quiet_delay_ms: 2000,
            indent: 4,
            skip_unchanged_reloads: true,
        }
    }
}

impl FileStoreOptions {
    /// The quiet delay as a [`Duration`].
    pub fn quiet_delay(&self) -> Duration {
        Duration::from_millis(self.quiet_delay_ms)
    }
}

/// Shared state behind every handle to one file store.
struct FileInner {
    /// Document path.
    path: PathBuf,
    /// Tuning.
    options: FileStoreOptions,
    /// Records in document order.
    records: RefCell<Map<String, Value>>,
    /// Bytes last loaded from or written to disk.
    snapshot: RefCell<Vec<u8>>,
    /// Current watch state.
    state: Cell<WatchState>,
    /// When a paused watch resumes.
    resume_at: Cell<Option<Instant>>,
    /// File watch.
    source: RefCell<Box<dyn ChangeSource>>,
    /// Time source for the quiet delay.
    clock: Rc<dyn Clock>,
    /// Binding subscriptions, notified first.
    bound: Signal<ChangeFn>,
    /// Plain listeners, notified after bindings.
    listeners: Signal<ChangeFn>,
    /// Store-wide "a key was set" callbacks.
    changed: Signal<KeyFn>,
    /// Number of documents persisted.
    writes: Cell<usize>,
}

/// Handle to a JSON-file-backed store. Clones share the same store.
#[derive(Clone)]
pub struct FileStore {
    /// Shared state.
    inner: Rc<FileInner>,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.inner.path)
            .field("state", &self.inner.state.get())
            .field("keys", &self.inner.records.borrow().len())
            .finish()
    }
}

impl FileStore {
    /// Load `path` and start watching it for external edits.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(
            path,
            FileStoreOptions::default(),
            Box::new(NotifyChangeSource::new()),
            Rc::new(SystemClock),
        )
    }

    /// Load `path` with explicit options, change source, and clock.
    ///
    /// A missing or malformed document fails construction.
    pub fn open_with(
        path: impl Into<PathBuf>,
        options: FileStoreOptions,
        source: Box<dyn ChangeSource>,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.into();
        let bytes = read_document(&path)?;
        let records = parse_document(&path, &bytes)?;
        debug!(path = %path.display(), keys = records.len(), "settings document loaded");
        let store = Self {
            inner: Rc::new(FileInner {
                path,
                options,
                records: RefCell::new(records),
                snapshot: RefCell::new(bytes),
                state: Cell::new(WatchState::Idle),
                resume_at: Cell::new(None),
                source: RefCell::new(source),
                clock,
                bound: Signal::default(),
                listeners: Signal::default(),
                changed: Signal::default(),
                writes: Cell::new(0),
            }),
        };
        store.start_watch()?;
        Ok(store)
    }

    /// Document path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Current watch state.
    pub fn state(&self) -> WatchState {
        self.inner.state.get()
    }

    /// Number of documents persisted by this store.
    pub fn write_count(&self) -> usize {
        self.inner.writes.get()
    }

    /// When the paused watch will resume, if it is paused.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.resume_at.get()
    }

    /// Keys in document order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.records.borrow().keys().cloned().collect()
    }

    /// Whether the document has a record for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.records.borrow().contains_key(key)
    }

    /// The `value` field of `key`'s record.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.get_property(key, "value")
    }

    /// Field `field` of `key`'s record.
    pub fn get_property(&self, key: &str, field: &str) -> Result<Value> {
        let records = self.inner.records.borrow();
        let record = records.get(key).ok_or_else(|| Error::unknown_key(key))?;
        record.get(field).cloned().ok_or_else(|| Error::MissingField {
            key: key.to_string(),
            field: field.to_string(),
        })
    }

    /// Whether `key`'s record has field `field`.
    pub fn has_property(&self, key: &str, field: &str) -> bool {
        self.inner
            .records
            .borrow()
            .get(key)
            .is_some_and(|r| r.get(field).is_some())
    }

    /// Typed view of `key`'s record.
    pub fn record(&self, key: &str) -> Result<KeyRecord> {
        let records = self.inner.records.borrow();
        let record = records.get(key).ok_or_else(|| Error::unknown_key(key))?;
        KeyRecord::from_value(&self.inner.path, key, record)
    }

    /// `(min, max)` from the record, when both are present.
    pub fn range(&self, key: &str) -> Result<Option<(Value, Value)>> {
        let record = self.record(key)?;
        Ok(record.min.zip(record.max))
    }

    /// Display rounding digits from the record's `round` field.
    pub fn rounding(&self, key: &str) -> Result<Option<u32>> {
        Ok(self.record(key)?.round)
    }

    /// The record's `dependency` key.
    ///
    /// Only the `dependency` field is read, so malformed sibling hints do not
    /// hide it.
    pub fn dependency(&self, key: &str) -> Result<Option<String>> {
        match self.get_property(key, "dependency") {
            Ok(Value::String(dep)) => Ok(Some(dep)),
            Ok(Value::Null) | Err(Error::MissingField { .. }) => Ok(None),
            Ok(other) => Err(Error::Parse {
                path: self.inner.path.clone(),
                message: format!(
                    "{key}: dependency must be a string, found {}",
                    kind_name(&other)
                ),
            }),
            Err(e) => Err(e),
        }
    }

    /// Assign `key`'s value and persist the document.
    ///
    /// Assigning the current value does nothing. A failed write restores the
    /// previous value and reports [`Error::Write`].
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let previous = self.get(key)?;
        if previous == value {
            trace!(key, "set_unchanged");
            return Ok(());
        }
        self.store_value(key, value.clone());
        if let Err(e) = self.save() {
            self.store_value(key, previous);
            return Err(e);
        }
        debug!(path = %self.inner.path.display(), key, %value, "file key set");
        self.inner.bound.emit(key, &value);
        self.inner.listeners.emit(key, &value);
        self.inner.changed.emit_with(key, |cb| cb(key));
        Ok(())
    }

    /// Overwrite the in-memory `value` field of an existing record.
    fn store_value(&self, key: &str, value: Value) {
        if let Some(Value::Object(record)) = self.inner.records.borrow_mut().get_mut(key) {
            record.insert("value".to_string(), value);
        }
    }

    /// Replace the file with the full record set: pause the watch, remove the
    /// file, write it anew, then schedule the watch to resume.
    fn save(&self) -> Result<()> {
        self.pause_watch();
        let bytes = to_pretty(&*self.inner.records.borrow(), self.inner.options.indent);
        let written = replace_file(&self.inner.path, &bytes);
        let resume_at = self.inner.clock.now() + self.inner.options.quiet_delay();
        self.inner.resume_at.set(Some(resume_at));
        written.map_err(|source| Error::Write {
            path: self.inner.path.clone(),
            source,
        })?;
        *self.inner.snapshot.borrow_mut() = bytes;
        self.inner.writes.set(self.inner.writes.get() + 1);
        Ok(())
    }

    /// Start the watch and enter [`WatchState::WatchingActive`].
    fn start_watch(&self) -> Result<()> {
        self.inner.resume_at.set(None);
        if let Err(e) = self.inner.source.borrow_mut().start(&self.inner.path) {
            self.inner.state.set(WatchState::Idle);
            return Err(e);
        }
        self.inner.state.set(WatchState::WatchingActive);
        Ok(())
    }

    /// Cancel the watch ahead of a self-initiated write.
    fn pause_watch(&self) {
        self.inner.source.borrow_mut().stop();
        if self.inner.state.get() == WatchState::WatchingActive {
            debug!(path = %self.inner.path.display(), "watch paused");
        }
        self.inner.state.set(WatchState::WatchingPaused);
    }

    /// Pump the store: resume a paused watch once the quiet delay has elapsed,
    /// then reload the document if the watch reported a change.
    ///
    /// Returns the keys whose value changed.
    pub fn process_events(&self) -> Result<Vec<String>> {
        if let Some(at) = self.inner.resume_at.get()
            && self.inner.clock.now() >= at
        {
            self.start_watch()?;
            debug!(path = %self.inner.path.display(), "watch resumed");
        }
        if self.inner.state.get() != WatchState::WatchingActive {
            return Ok(Vec::new());
        }
        let pending = self.inner.source.borrow_mut().pending();
        if !pending {
            return Ok(Vec::new());
        }
        self.check_settings()
    }

    /// Reload the document and announce every key whose value changed:
    /// bindings first, then listeners.
    ///
    /// A malformed document is reported and the previous snapshot kept.
    pub fn check_settings(&self) -> Result<Vec<String>> {
        let path = &self.inner.path;
        let bytes = read_document(path)?;
        if self.inner.options.skip_unchanged_reloads && *self.inner.snapshot.borrow() == bytes {
            trace!(path = %path.display(), "reload_skipped_unchanged");
            return Ok(Vec::new());
        }
        let fresh = parse_document(path, &bytes)?;
        let old = self.inner.records.replace(fresh);
        *self.inner.snapshot.borrow_mut() = bytes;

        let changed = {
            let records = self.inner.records.borrow();
            for key in old.keys().filter(|k| !records.contains_key(*k)) {
                warn!(path = %path.display(), key = %key, "key removed from document");
            }
            records
                .iter()
                .filter_map(|(key, record)| {
                    let value = record.get("value")?;
                    let before = old.get(key).and_then(|r| r.get("value"));
                    (before != Some(value)).then(|| (key.clone(), value.clone()))
                })
                .collect::<Vec<_>>()
        };
        debug!(path = %path.display(), changed = changed.len(), "settings document reloaded");
        for (key, value) in &changed {
            self.inner.bound.emit(key, value);
        }
        for (key, value) in &changed {
            self.inner.listeners.emit(key, value);
        }
        Ok(changed.into_iter().map(|(key, _)| key).collect())
    }

    /// Run `callback` whenever `key` changes value, by `set` or by reload.
    pub fn listen(&self, key: &str, callback: impl Fn(&str, &Value) + 'static) -> HandlerId {
        self.inner.listeners.connect(Some(key), Rc::new(callback))
    }

    /// Run `callback` with the key after every effective `set`.
    pub fn connect_changed(&self, callback: impl Fn(&str) + 'static) -> HandlerId {
        self.inner.changed.connect(None, Rc::new(callback))
    }

    /// Remove a listener, change callback, or binding subscription.
    pub fn unlisten(&self, id: HandlerId) {
        self.inner.bound.disconnect(id);
        self.inner.listeners.disconnect(id);
        self.inner.changed.disconnect(id);
    }

    /// Number of handlers that a change to `key` would reach.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.bound.count_for(key) + self.inner.listeners.count_for(key)
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
        if !self.contains(key) {
            return Err(Error::unknown_key(key));
        }
        Binding::new(self, key, object, property, options)
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Value> {
        Self::get(self, key)
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        Self::set(self, key, value)
    }

    fn subscribe(&self, key: &str, callback: Rc<ChangeFn>) -> HandlerId {
        self.inner.bound.connect(Some(key), callback)
    }

    fn unsubscribe(&self, id: HandlerId) {
        self.unlisten(id);
    }

    fn is_writable(&self, key: &str) -> bool {
        self.contains(key)
    }

    fn subscribe_writable(&self, _key: &str, _callback: Rc<WritableFn>) -> Option<HandlerId> {
        None
    }

    fn dependency_key(&self, key: &str) -> Option<String> {
        match self.dependency(key) {
            Ok(dep) => dep,
            Err(e) => {
                warn!(key, error = %e, "ignoring unusable dependency field");
                None
            }
        }
    }
}

/// Read the raw document bytes.
fn read_document(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a document, which must be a JSON object.
fn parse_document(path: &Path, bytes: &[u8]) -> Result<Map<String, Value>> {
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };
    match serde_json::from_slice(bytes).map_err(|e| parse_err(e.to_string()))? {
        Value::Object(records) => Ok(records),
        other => Err(parse_err(format!(
            "top level must be an object, found {}",
            kind_name(&other)
        ))),
    }
}

/// Remove `path` if present, then create it with `bytes`.
fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::write(path, bytes)
}
