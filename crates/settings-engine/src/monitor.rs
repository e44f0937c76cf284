//! File-change sources for the file store.
//!
//! A [`ChangeSource`] reports whether the watched document may have changed
//! since it was last asked. The store pumps it from its own thread through
//! [`FileStore::process_events`](crate::FileStore::process_events); no
//! callback ever runs on a watcher thread.

use std::{
    cell::Cell,
    ffi::OsString,
    path::{Path, PathBuf},
    rc::Rc,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace, warn};

use crate::{Error, Result};

/// A watch on one file that can be stopped and restarted.
pub trait ChangeSource {
    /// Begin watching `path`. Starting an active source restarts it.
    fn start(&mut self, path: &Path) -> Result<()>;

    /// Stop watching and discard undelivered events.
    fn stop(&mut self);

    /// Whether the source is currently watching.
    fn is_active(&self) -> bool;

    /// Drain queued events, returning true if any concerned the watched file.
    fn pending(&mut self) -> bool;
}

/// Filesystem watcher backed by the `notify` crate.
///
/// Watches the parent directory non-recursively and filters events by file
/// name, so a write that removes and recreates the file keeps being observed.
pub struct NotifyChangeSource {
    /// Live watcher, present while active.
    watcher: Option<RecommendedWatcher>,
    /// Sender handed to each new watcher.
    tx: Sender<notify::Result<notify::Event>>,
    /// Events delivered by the watcher thread.
    rx: Receiver<notify::Result<notify::Event>>,
    /// File name to match within the watched directory.
    file_name: Option<OsString>,
}

impl NotifyChangeSource {
    /// Create an inactive source.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            watcher: None,
            tx,
            rx,
            file_name: None,
        }
    }

    /// Whether `event` concerns the watched file.
    fn concerns(&self, event: &notify::Event) -> bool {
        let relevant = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
        );
        relevant
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.file_name.as_deref())
    }
}

impl Default for NotifyChangeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSource for NotifyChangeSource {
    fn start(&mut self, path: &Path) -> Result<()> {
        self.stop();
        let watch_err = |message: String| Error::Watch {
            path: path.to_path_buf(),
            message,
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tx = self.tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // The receiver lives as long as the source; a failed send means it is gone.
            if tx.send(res).is_err() {
                trace!("change source dropped");
            }
        })
        .map_err(|e| watch_err(e.to_string()))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_err(e.to_string()))?;
        self.file_name = path.file_name().map(OsString::from);
        self.watcher = Some(watcher);
        debug!(path = %path.display(), "watch started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.watcher.take().is_some() {
            debug!("watch stopped");
        }
        while self.rx.try_recv().is_ok() {}
    }

    fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    fn pending(&mut self) -> bool {
        if self.watcher.is_none() {
            return false;
        }
        let mut hit = false;
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) => hit |= self.concerns(&event),
                Err(e) => warn!(error = %e, "watch event error"),
            }
        }
        hit
    }
}

/// Shared state of a [`ManualChangeSource`].
#[derive(Debug, Default)]
struct ManualState {
    /// Whether the source is watching.
    active: Cell<bool>,
    /// Events fired while active and not yet drained.
    queued: Cell<usize>,
    /// Events fired while stopped.
    dropped: Cell<usize>,
    /// Number of `start` calls.
    starts: Cell<usize>,
}

/// A change source driven by hand, for deterministic tests.
///
/// Clones share state: keep one clone to [`fire`](Self::fire) events while
/// the store owns the other.
#[derive(Debug, Clone, Default)]
pub struct ManualChangeSource {
    /// Shared state.
    state: Rc<ManualState>,
}

impl ManualChangeSource {
    /// Create an inactive source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a change to the watched file. Ignored while stopped, like a
    /// cancelled watch.
    pub fn fire(&self) {
        if self.state.active.get() {
            self.state.queued.set(self.state.queued.get() + 1);
        } else {
            self.state.dropped.set(self.state.dropped.get() + 1);
        }
    }

    /// Events fired while the source was stopped.
    pub fn dropped(&self) -> usize {
        self.state.dropped.get()
    }

    /// Number of times the watch was (re)started.
    pub fn starts(&self) -> usize {
        self.state.starts.get()
    }
}

impl ChangeSource for ManualChangeSource {
    fn start(&mut self, _path: &Path) -> Result<()> {
        self.state.active.set(true);
        self.state.queued.set(0);
        self.state.starts.set(self.state.starts.get() + 1);
        Ok(())
    }

    fn stop(&mut self) {
        self.state.active.set(false);
        self.state.queued.set(0);
    }

    fn is_active(&self) -> bool {
        self.state.active.get()
    }

    fn pending(&mut self) -> bool {
        self.state.queued.replace(0) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_source_drops_events_while_stopped() {
        let handle = ManualChangeSource::new();
        let mut source: Box<dyn ChangeSource> = Box::new(handle.clone());
        handle.fire();
        assert_eq!(handle.dropped(), 1);

        source.start(Path::new("s.json")).unwrap();
        handle.fire();
        handle.fire();
        assert!(source.pending());
        assert!(!source.pending());

        handle.fire();
        source.stop();
        source.start(Path::new("s.json")).unwrap();
        assert!(!source.pending());
        assert_eq!(handle.starts(), 2);
    }

    #[test]
    fn notify_source_starts_on_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut source = NotifyChangeSource::new();
        source.start(&path).unwrap();
        assert!(source.is_active());
        source.stop();
        assert!(!source.is_active());
        assert!(!source.pending());
    }
}
