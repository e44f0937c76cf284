//! Settings Engine
//!
//! Keeps persisted settings consistent with the objects bound to them:
//! - validates values against declared ranges ([`coerce`])
//! - serves schema-validated stores, one per schema name ([`StoreRegistry`], [`SchemaStore`])
//! - serves JSON-file stores that follow external edits ([`FileStore`])
//! - links store keys to object properties in both directions ([`Binding`])
//! - drives object sensitivity from boolean keys ([`DependencyLink`])
//!
//! Everything runs on the caller's thread. File stores are pumped with
//! [`FileStore::process_events`]; no callback ever runs on another thread.
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use settings_engine::{Direction, PropertyBag, Result, StoreRegistry};
//!
//! fn run() -> Result<()> {
//!     let registry = StoreRegistry::in_memory();
//!     let store = registry.open_file_store("settings.json")?;
//!     let toggle = PropertyBag::new();
//!     let _binding = store.bind("show-panel", toggle.clone(), "active", Direction::Both)?;
//!     loop {
//!         store.process_events()?;
//!     }
//! }
//! ```

mod backend;
mod binding;
mod clock;
mod coerce;
mod dependency;
mod error;
mod file_store;
mod monitor;
mod object;
mod record;
mod registry;
mod schema;
mod schema_store;
mod scope;
mod signal;
mod store;
mod value;

pub use backend::{JsonDirBackend, MemoryBackend, SchemaBackend, to_pretty};
pub use binding::{BindOptions, Binding, Direction, MapFn};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coerce::{coerce, writable_range};
pub use dependency::DependencyLink;
pub use error::{Error, Result};
pub use file_store::{FileStore, FileStoreOptions, KeyFn, WatchState};
pub use monitor::{ChangeSource, ManualChangeSource, NotifyChangeSource};
pub use object::{Bindable, PropertyBag};
pub use record::KeyRecord;
pub use registry::StoreRegistry;
pub use schema::{KeySpec, Schema};
pub use schema_store::SchemaStore;
pub use scope::BindingScope;
pub use signal::{ChangeFn, HandlerId, Signal};
pub use store::{SettingsStore, StoreHandle, WritableFn};
pub use value::{Value, ValueRange, ValueType, kind_name, truthy};
