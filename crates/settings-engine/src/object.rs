//! The bound-object boundary.
//!
//! Bindings only need an object that exposes named properties with get/set,
//! a per-property change notification, and an enabled/sensitive flag. Any
//! toolkit adapter implements [`Bindable`]; [`PropertyBag`] is a headless
//! implementation used by tests and command-line tools.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::Rc,
};

use tracing::trace;

use crate::{
    Value,
    signal::{ChangeFn, HandlerId, Signal},
};

/// An object whose named properties can be bound to settings keys.
pub trait Bindable {
    /// Current value of `name`, or `None` if the object has no such property.
    fn property(&self, name: &str) -> Option<Value>;

    /// Assign `name`. Implementations notify handlers connected to `name`.
    fn set_property(&self, name: &str, value: Value);

    /// Register `handler` to run after `name` changes.
    fn connect_notify(&self, name: &str, handler: Rc<ChangeFn>) -> HandlerId;

    /// Remove a handler registered with [`Bindable::connect_notify`].
    fn disconnect(&self, id: HandlerId);

    /// Enable or disable the object for user interaction.
    fn set_sensitive(&self, sensitive: bool);

    /// Whether the object is currently enabled.
    fn is_sensitive(&self) -> bool;
}

/// A headless [`Bindable`] storing properties in a map.
///
/// Assigning a property its current value is a no-op and does not notify.
pub struct PropertyBag {
    /// Property values by name.
    props: RefCell<BTreeMap<String, Value>>,
    /// `notify::<name>` handlers.
    notify: Signal<ChangeFn>,
    /// Sensitivity flag.
    sensitive: Cell<bool>,
    /// Number of times the sensitivity flag actually flipped.
    sensitivity_flips: Cell<usize>,
    /// Number of property assignments that changed a value.
    writes: Cell<usize>,
}

impl PropertyBag {
    /// Create an empty, sensitive bag.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Create a bag pre-populated with `props`, without notifying.
    pub fn with_properties<I, K>(props: I) -> Rc<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let bag = Self::default();
        bag.props
            .borrow_mut()
            .extend(props.into_iter().map(|(k, v)| (k.into(), v)));
        Rc::new(bag)
    }

    /// Number of value-changing property assignments so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Number of times sensitivity flipped between enabled and disabled.
    pub fn sensitivity_flips(&self) -> usize {
        self.sensitivity_flips.get()
    }

    /// Number of connected notify handlers.
    pub fn handler_count(&self) -> usize {
        self.notify.len()
    }
}

impl Default for PropertyBag {
    fn default() -> Self {
        Self {
            props: RefCell::new(BTreeMap::new()),
            notify: Signal::default(),
            sensitive: Cell::new(true),
            sensitivity_flips: Cell::new(0),
            writes: Cell::new(0),
        }
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBag")
            .field("props", &self.props.borrow())
            .field("sensitive", &self.sensitive.get())
            .finish()
    }
}

impl Bindable for PropertyBag {
    fn property(&self, name: &str) -> Option<Value> {
        self.props.borrow().get(name).cloned()
    }

    fn set_property(&self, name: &str, value: Value) {
        {
            let mut props = self.props.borrow_mut();
            if props.get(name) == Some(&value) {
                return;
            }
            props.insert(name.to_string(), value.clone());
        }
        self.writes.set(self.writes.get() + 1);
        trace!(property = name, %value, "property_set");
        self.notify.emit(name, &value);
    }

    fn connect_notify(&self, name: &str, handler: Rc<ChangeFn>) -> HandlerId {
        self.notify.connect(Some(name), handler)
    }

    fn disconnect(&self, id: HandlerId) {
        self.notify.disconnect(id);
    }

    fn set_sensitive(&self, sensitive: bool) {
        if self.sensitive.replace(sensitive) != sensitive {
            self.sensitivity_flips.set(self.sensitivity_flips.get() + 1);
        }
    }

    fn is_sensitive(&self) -> bool {
        self.sensitive.get()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn equal_assignment_does_not_notify() {
        let bag = PropertyBag::with_properties([("active", json!(false))]);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bag.connect_notify("active", Rc::new(move |_: &str, _: &Value| h.set(h.get() + 1)));

        bag.set_property("active", json!(false));
        assert_eq!(hits.get(), 0);
        bag.set_property("active", json!(true));
        assert_eq!(hits.get(), 1);
        assert_eq!(bag.write_count(), 1);
        assert_eq!(bag.property("active"), Some(json!(true)));
        assert_eq!(bag.property("missing"), None);
    }

    #[test]
    fn sensitivity_counts_flips_only() {
        let bag = PropertyBag::new();
        bag.set_sensitive(true);
        assert_eq!(bag.sensitivity_flips(), 0);
        bag.set_sensitive(false);
        bag.set_sensitive(false);
        assert_eq!(bag.sensitivity_flips(), 1);
        assert!(!bag.is_sensitive());
    }
}
