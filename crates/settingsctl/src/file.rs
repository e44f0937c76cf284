//! `settingsctl file ...`: operations on a JSON settings document.

use std::{path::Path, thread, time::Duration};

use settings_engine::{FileStore, Value};
use tracing::{info, warn};

use crate::{cli::FileCommand, error::Result, parse_value};

/// Run one file-store command.
pub fn run(command: FileCommand) -> Result<()> {
    match command {
        FileCommand::Get { path, key } => {
            let store = FileStore::open(path)?;
            println!("{}", store.get(&key)?);
        }
        FileCommand::Set { path, key, value } => {
            let store = FileStore::open(path)?;
            store.set(&key, parse_value(&value))?;
            info!(key = %key, "value written");
        }
        FileCommand::Keys { path } => {
            let store = FileStore::open(path)?;
            for line in key_lines(&store) {
                println!("{line}");
            }
        }
        FileCommand::Watch {
            path,
            interval,
            max_changes,
        } => watch(&path, interval, max_changes)?,
    }
    Ok(())
}

/// One `key<TAB>value` line per key; records without a value show their description.
fn key_lines(store: &FileStore) -> Vec<String> {
    store
        .keys()
        .into_iter()
        .map(|key| match store.get(&key) {
            Ok(value) => format!("{key}\t{value}"),
            Err(_) => match store.get_property(&key, "description") {
                Ok(Value::String(d)) => format!("{key}\t# {d}"),
                _ => key,
            },
        })
        .collect()
}

/// Poll the document and print every changed key until `max_changes` is reached.
fn watch(path: &Path, interval: Duration, max_changes: Option<usize>) -> Result<()> {
    let store = FileStore::open(path)?;
    info!(path = %path.display(), "watching for changes");
    let mut reported = 0;
    loop {
        match store.process_events() {
            Ok(keys) => {
                for key in keys {
                    let value = store.get(&key)?;
                    println!("{key}\t{value}");
                    reported += 1;
                }
            }
            Err(e) => warn!(error = %e, "reload failed; keeping previous values"),
        }
        if max_changes.is_some_and(|max| reported >= max) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn key_lines_show_values_and_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(
            &path,
            r#"{ "head": { "type": "header", "description": "General" },
                 "size": { "value": 3 } }"#,
        )
        .unwrap();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(key_lines(&store), vec!["head\t# General", "size\t3"]);
    }

    #[test]
    fn set_command_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, r#"{ "name": { "value": "a" } }"#).unwrap();
        run(FileCommand::Set {
            path: path.clone(),
            key: "name".into(),
            value: "hello".into(),
        })
        .unwrap();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("name").unwrap(), Value::from("hello"));
    }
}
