//! Single-threaded, detail-filtered callback registry.
//!
//! A [`Signal`] holds callbacks that are optionally restricted to one detail
//! string (a settings key, or a property name). Emission snapshots the
//! matching callbacks before invoking any of them, so a callback may freely
//! connect, disconnect, or re-enter the owning object. A callback that is
//! disconnected while an emission is in progress is not invoked afterwards.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::Value;

/// Process-wide source of handler ids, so ids from different signals never collide.
static NEXT_HANDLER: AtomicU64 = AtomicU64::new(1);

/// Identifies a connected callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocate a fresh id.
    fn next() -> Self {
        Self(NEXT_HANDLER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback invoked with `(key, new_value)`.
pub type ChangeFn = dyn Fn(&str, &Value);

/// One connected callback.
struct Slot<F: ?Sized> {
    /// Handler id returned from `connect`.
    id: HandlerId,
    /// Detail filter; `None` matches every emission.
    detail: Option<String>,
    /// The callback itself.
    callback: Rc<F>,
}

/// Ordered list of connected callbacks.
pub struct Signal<F: ?Sized> {
    /// Slots in connection order.
    slots: RefCell<Vec<Slot<F>>>,
}

impl<F: ?Sized> Default for Signal<F> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Signal<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.slots.borrow().len())
            .finish()
    }
}

impl<F: ?Sized> Signal<F> {
    /// Connect `callback`, restricted to `detail` when given.
    pub fn connect(&self, detail: Option<&str>, callback: Rc<F>) -> HandlerId {
        let id = HandlerId::next();
        self.slots.borrow_mut().push(Slot {
            id,
            detail: detail.map(str::to_string),
            callback,
        });
        id
    }

    /// Disconnect a handler. Returns false if it was not connected here.
    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|s| s.id != id);
        slots.len() != before
    }

    /// Whether `id` is currently connected.
    pub fn is_connected(&self, id: HandlerId) -> bool {
        self.slots.borrow().iter().any(|s| s.id == id)
    }

    /// Number of connected handlers.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// True when nothing is connected.
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Number of handlers that would fire for `detail`.
    pub fn count_for(&self, detail: &str) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|s| s.detail.as_deref().is_none_or(|d| d == detail))
            .count()
    }

    /// Snapshot the callbacks that match `detail`, in connection order.
    fn matching(&self, detail: &str) -> Vec<(HandlerId, Rc<F>)> {
        self.slots
            .borrow()
            .iter()
            .filter(|s| s.detail.as_deref().is_none_or(|d| d == detail))
            .map(|s| (s.id, Rc::clone(&s.callback)))
            .collect()
    }

    /// Invoke every callback matching `detail` through `call`.
    pub fn emit_with(&self, detail: &str, mut call: impl FnMut(&F)) {
        for (id, callback) in self.matching(detail) {
            if self.is_connected(id) {
                call(&callback);
            }
        }
    }
}

impl Signal<ChangeFn> {
    /// Notify every callback matching `key` with `value`.
    pub fn emit(&self, key: &str, value: &Value) {
        self.emit_with(key, |cb| cb(key, value));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;

    #[test]
    fn detail_filter_and_order() {
        let sig: Signal<ChangeFn> = Signal::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        sig.connect(
            Some("a"),
            Rc::new(move |k: &str, _: &Value| l1.borrow_mut().push(format!("1:{k}"))),
        );
        let l2 = Rc::clone(&log);
        sig.connect(
            None,
            Rc::new(move |k: &str, _: &Value| l2.borrow_mut().push(format!("2:{k}"))),
        );

        sig.emit("a", &json!(1));
        sig.emit("b", &json!(1));
        assert_eq!(*log.borrow(), vec!["1:a", "2:a", "2:b"]);
        assert_eq!(sig.count_for("a"), 2);
        assert_eq!(sig.count_for("b"), 1);
    }

    #[test]
    fn disconnect_during_emit_suppresses_later_handler() {
        let sig: Rc<Signal<ChangeFn>> = Rc::new(Signal::default());
        let fired = Rc::new(Cell::new(0));
        let victim = Rc::new(Cell::new(None));

        let s = Rc::clone(&sig);
        let v = Rc::clone(&victim);
        sig.connect(
            None,
            Rc::new(move |_: &str, _: &Value| {
                if let Some(id) = v.get() {
                    s.disconnect(id);
                }
            }),
        );
        let f = Rc::clone(&fired);
        let id = sig.connect(None, Rc::new(move |_: &str, _: &Value| f.set(f.get() + 1)));
        victim.set(Some(id));

        sig.emit("k", &json!(null));
        assert_eq!(fired.get(), 0);
        assert!(!sig.disconnect(id), "already disconnected");
    }
}
