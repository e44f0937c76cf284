//! `settingsctl schema ...`: operations on schema-validated stores.

use std::{
    env,
    path::{Path, PathBuf},
    rc::Rc,
};

use settings_engine::{JsonDirBackend, SchemaStore, StoreRegistry, Value, ValueRange};
use tracing::{debug, info};

use crate::{
    cli::{SchemaArgs, SchemaCommand},
    error::{Error, Result},
    parse_value,
};

/// Run one schema-store command.
pub fn run(args: SchemaArgs) -> Result<()> {
    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => default_data_dir().ok_or(Error::NoDataDir)?,
    };
    let schema_dir = args.schema_dir.unwrap_or_else(|| data_dir.join("schemas"));
    let registry = open_registry(&schema_dir, &data_dir)?;

    match args.command {
        SchemaCommand::Get { schema, key } => {
            let store = registry.open_schema_store(&schema)?;
            println!("{}", store.get(&key)?);
        }
        SchemaCommand::Set { schema, key, value } => {
            let store = registry.open_schema_store(&schema)?;
            store.set(&key, parse_value(&value))?;
            info!(schema = %schema, key = %key, "value written");
        }
        SchemaCommand::Reset { schema, key } => {
            registry.open_schema_store(&schema)?.reset(&key)?;
        }
        SchemaCommand::Range { schema, key } => {
            let store = registry.open_schema_store(&schema)?;
            println!("{}", describe_range(&store.range(&key)?));
        }
        SchemaCommand::Keys { schema } => {
            let store = registry.open_schema_store(&schema)?;
            for line in key_lines(&store)? {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// `$XDG_CONFIG_HOME/settingsctl`, falling back to `~/.config/settingsctl`.
fn default_data_dir() -> Option<PathBuf> {
    let base = env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("settingsctl"))
}

/// Build a registry over `data_dir` with every schema found in `schema_dir`.
fn open_registry(schema_dir: &Path, data_dir: &Path) -> Result<StoreRegistry> {
    let registry = StoreRegistry::new(Rc::new(JsonDirBackend::new(data_dir)?));
    let loaded = registry.load_schema_dir(schema_dir)?;
    if loaded == 0 {
        return Err(Error::NoSchemas(schema_dir.display().to_string()));
    }
    debug!(count = loaded, dir = %schema_dir.display(), "schemas loaded");
    Ok(registry)
}

/// Human-readable summary of a value range.
fn describe_range(range: &ValueRange) -> String {
    match range {
        ValueRange::Free(ty) => format!("type {ty}"),
        ValueRange::Enum(items) => format!("enum {}", Value::from(items.clone())),
        ValueRange::Flags(names) => format!("flags {}", names.join(",")),
        ValueRange::Bounded { min, max } => format!("range {min} {max}"),
    }
}

/// One `key<TAB>value` line per declared key.
fn key_lines(store: &SchemaStore) -> Result<Vec<String>> {
    store
        .keys()
        .into_iter()
        .map(|key| {
            let value = store.get(&key)?;
            Ok(format!("{key}\t{value}"))
        })
        .collect()
}
