//! Two-way bindings between a store key and an object property.
//!
//! A binding runs two flows. Store changes reach the object through
//! `map_get`; object property changes reach the store through `map_set`.
//! Each flow is guarded by its own flag, raised only while that flow pushes
//! a value into the other endpoint, so the push is not bounced back.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use tracing::{debug, trace, warn};

use crate::{
    Bindable, DependencyLink, Error, Result, Value,
    signal::HandlerId,
    store::{SettingsStore, StoreHandle},
};

/// A value-mapping function applied to one binding direction.
pub type MapFn = Rc<dyn Fn(&Value) -> Value>;

/// Which flows a binding keeps live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Both flows; normalised to [`Direction::Both`].
    #[default]
    Default,
    /// Store changes reach the object; object changes are ignored.
    Get,
    /// Object changes reach the store; the store is not observed.
    Set,
    /// Both flows.
    Both,
}

impl Direction {
    /// Resolve [`Direction::Default`].
    pub fn normalized(self) -> Self {
        match self {
            Self::Default => Self::Both,
            other => other,
        }
    }

    /// Whether store values flow to the object.
    pub fn reads(self) -> bool {
        matches!(self.normalized(), Self::Get | Self::Both)
    }

    /// Whether object values flow to the store.
    pub fn writes(self) -> bool {
        matches!(self.normalized(), Self::Set | Self::Both)
    }
}

/// Construction options for a [`Binding`].
#[derive(Clone, Default)]
pub struct BindOptions {
    /// Live flows.
    pub direction: Direction,
    /// Skip the initial store-to-object push.
    pub suppress_initial_sync: bool,
    /// Read the store once and do not track later changes.
    pub get_no_changes: bool,
    /// Suppress the sensitivity wiring.
    pub ignore_sensitivity: bool,
    /// Applied to store values before they reach the object.
    pub map_get: Option<MapFn>,
    /// Applied to object values before they reach the store.
    pub map_set: Option<MapFn>,
}

impl fmt::Debug for BindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindOptions")
            .field("direction", &self.direction)
            .field("suppress_initial_sync", &self.suppress_initial_sync)
            .field("get_no_changes", &self.get_no_changes)
            .field("ignore_sensitivity", &self.ignore_sensitivity)
            .field("map_get", &self.map_get.is_some())
            .field("map_set", &self.map_set.is_some())
            .finish()
    }
}

impl BindOptions {
    /// Options for `direction` with every other setting at its default.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Skip the initial store-to-object push.
    #[must_use]
    pub fn suppress_initial_sync(mut self) -> Self {
        self.suppress_initial_sync = true;
        self
    }

    /// Read the store once, then stop tracking it.
    #[must_use]
    pub fn get_no_changes(mut self) -> Self {
        self.get_no_changes = true;
        self
    }

    /// Leave the object's sensitivity alone.
    #[must_use]
    pub fn without_sensitivity(mut self) -> Self {
        self.ignore_sensitivity = true;
        self
    }

    /// Map store values before they reach the object.
    #[must_use]
    pub fn map_get(mut self, f: impl Fn(&Value) -> Value + 'static) -> Self {
        self.map_get = Some(Rc::new(f));
        self
    }

    /// Map object values before they reach the store.
    #[must_use]
    pub fn map_set(mut self, f: impl Fn(&Value) -> Value + 'static) -> Self {
        self.map_set = Some(Rc::new(f));
        self
    }
}

/// Raises a flag for its lifetime.
struct FlagGuard<'a> {
    /// The raised flag.
    flag: &'a Cell<bool>,
}

impl<'a> FlagGuard<'a> {
    /// Raise `flag` until the guard drops.
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Shared binding state, referenced weakly from both endpoints' handlers.
struct BindingCore {
    /// Bound store.
    store: StoreHandle,
    /// Bound key.
    key: String,
    /// Bound object.
    object: Rc<dyn Bindable>,
    /// Bound property.
    property: String,
    /// Normalised direction.
    direction: Direction,
    /// Store-to-object mapping.
    map_get: Option<MapFn>,
    /// Object-to-store mapping.
    map_set: Option<MapFn>,
    /// Raised while this binding writes the store.
    ignoring_key_changed: Cell<bool>,
    /// Raised while this binding writes the object.
    ignoring_prop_changed: Cell<bool>,
    /// Store change subscription.
    store_handler: Cell<Option<HandlerId>>,
    /// Store writability subscription.
    writable_handler: Cell<Option<HandlerId>>,
    /// Object notify subscription.
    object_handler: Cell<Option<HandlerId>>,
    /// Sensitivity link to the key's dependency key.
    dependency: RefCell<Option<DependencyLink>>,
    /// Last store rejection of an object value.
    last_error: RefCell<Option<Error>>,
    /// Set once released.
    released: Cell<bool>,
}

impl BindingCore {
    /// Store-to-object flow.
    fn key_changed(&self, value: &Value) {
        if self.released.get() {
            return;
        }
        if self.ignoring_key_changed.get() {
            trace!(key = %self.key, "key_changed_ignored");
            return;
        }
        self.push_to_object(value);
    }

    /// Write the mapped store value into the object unless it already holds it.
    fn push_to_object(&self, value: &Value) {
        let mapped = match &self.map_get {
            Some(f) => f(value),
            None => value.clone(),
        };
        if self.object.property(&self.property).as_ref() == Some(&mapped) {
            return;
        }
        debug_assert!(!self.ignoring_key_changed.get());
        trace!(key = %self.key, property = %self.property, %mapped, "push_to_object");
        let _guard = FlagGuard::raise(&self.ignoring_prop_changed);
        self.object.set_property(&self.property, mapped);
    }

    /// Object-to-store flow.
    fn prop_changed(&self, value: &Value) {
        if self.released.get() {
            return;
        }
        if self.ignoring_prop_changed.get() {
            trace!(property = %self.property, "prop_changed_ignored");
            return;
        }
        let mapped = match &self.map_set {
            Some(f) => f(value),
            None => value.clone(),
        };
        trace!(key = %self.key, property = %self.property, %mapped, "push_to_store");
        let result = {
            let _guard = FlagGuard::raise(&self.ignoring_key_changed);
            self.store.set(&self.key, mapped)
        };
        if let Err(e) = result {
            warn!(
                store = self.store.kind(),
                key = %self.key,
                property = %self.property,
                error = %e,
                "store rejected bound value"
            );
            *self.last_error.borrow_mut() = Some(e);
        }
    }

    /// Drive the object's sensitivity from the store: through the key's
    /// dependency key when it has one, otherwise from its writability.
    fn wire_sensitivity(self: &Rc<Self>) {
        if let Some(dep) = self.store.dependency_key(&self.key) {
            match DependencyLink::new(self.store.clone(), &dep, Rc::clone(&self.object)) {
                Ok(link) => *self.dependency.borrow_mut() = Some(link),
                Err(e) => warn!(
                    key = %self.key,
                    dependency = %dep,
                    error = %e,
                    "dependency key unavailable"
                ),
            }
            return;
        }
        self.object.set_sensitive(self.store.is_writable(&self.key));
        let weak: Weak<Self> = Rc::downgrade(self);
        let id = self.store.subscribe_writable(
            &self.key,
            Rc::new(move |_: &str, writable: bool| {
                if let Some(core) = weak.upgrade()
                    && !core.released.get()
                {
                    core.object.set_sensitive(writable);
                }
            }),
        );
        self.writable_handler.set(id);
    }

    /// Disconnect from both endpoints. Idempotent.
    fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        if let Some(id) = self.store_handler.take() {
            self.store.unsubscribe(id);
        }
        if let Some(id) = self.writable_handler.take() {
            self.store.unsubscribe(id);
        }
        if let Some(id) = self.object_handler.take() {
            self.object.disconnect(id);
        }
        if let Some(link) = self.dependency.borrow_mut().take() {
            link.release();
        }
        debug!(key = %self.key, property = %self.property, "binding released");
    }
}

/// A live link between a store key and an object property.
///
/// Dropping the binding releases it.
#[must_use = "a binding is released when dropped"]
pub struct Binding {
    /// Shared state.
    core: Rc<BindingCore>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("store", &self.core.store.kind())
            .field("key", &self.core.key)
            .field("property", &self.core.property)
            .field("direction", &self.core.direction)
            .field("released", &self.core.released.get())
            .finish()
    }
}

impl Binding {
    /// Bind `key` of `store` to `property` of `object`.
    ///
    /// Unless the direction excludes reads or the options suppress it, the
    /// object receives the current store value before this returns.
    pub fn new(
        store: impl Into<StoreHandle>,
        key: &str,
        object: Rc<dyn Bindable>,
        property: &str,
        options: BindOptions,
    ) -> Result<Self> {
        let store = store.into();
        let direction = options.direction.normalized();
        let initial = store.get(key)?;
        let core = Rc::new(BindingCore {
            store,
            key: key.to_string(),
            object,
            property: property.to_string(),
            direction,
            map_get: options.map_get,
            map_set: options.map_set,
            ignoring_key_changed: Cell::new(false),
            ignoring_prop_changed: Cell::new(false),
            store_handler: Cell::new(None),
            writable_handler: Cell::new(None),
            object_handler: Cell::new(None),
            dependency: RefCell::new(None),
            last_error: RefCell::new(None),
            released: Cell::new(false),
        });

        if direction.reads() && !options.suppress_initial_sync {
            core.push_to_object(&initial);
        }
        if direction.reads() && !options.get_no_changes {
            let weak = Rc::downgrade(&core);
            let id = core.store.subscribe(
                key,
                Rc::new(move |_: &str, value: &Value| {
                    if let Some(core) = weak.upgrade() {
                        core.key_changed(value);
                    }
                }),
            );
            core.store_handler.set(Some(id));
        }
        if direction.writes() {
            let weak = Rc::downgrade(&core);
            let id = core.object.connect_notify(
                property,
                Rc::new(move |_: &str, value: &Value| {
                    if let Some(core) = weak.upgrade() {
                        core.prop_changed(value);
                    }
                }),
            );
            core.object_handler.set(Some(id));
        }
        if !options.ignore_sensitivity {
            core.wire_sensitivity();
        }
        debug!(
            store = core.store.kind(),
            key,
            property,
            ?direction,
            "binding created"
        );
        Ok(Self { core })
    }

    /// Bound key.
    pub fn key(&self) -> &str {
        &self.core.key
    }

    /// Bound property.
    pub fn property(&self) -> &str {
        &self.core.property
    }

    /// Live flows, with [`Direction::Default`] resolved.
    pub fn direction(&self) -> Direction {
        self.core.direction
    }

    /// Bound store.
    pub fn store(&self) -> &StoreHandle {
        &self.core.store
    }

    /// Whether the binding has been released.
    pub fn is_released(&self) -> bool {
        self.core.released.get()
    }

    /// The most recent store rejection of an object value, cleared on read.
    pub fn take_error(&self) -> Option<Error> {
        self.core.last_error.borrow_mut().take()
    }

    /// Stop both flows and disconnect from both endpoints. Releasing twice
    /// is a no-op.
    pub fn release(&self) {
        self.core.release();
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.core.release();
    }
}
