//! Grouped lifetime management for bindings.

use std::fmt;

use crate::{Binding, DependencyLink};

/// Holds the bindings and dependency links of one settings page.
///
/// Everything held is released when the scope is cleared or dropped.
#[derive(Default)]
pub struct BindingScope {
    /// Held bindings, in registration order.
    bindings: Vec<Binding>,
    /// Held dependency links, in registration order.
    links: Vec<DependencyLink>,
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("bindings", &self.bindings.len())
            .field("links", &self.links.len())
            .finish()
    }
}

impl BindingScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `binding` until the scope is cleared.
    pub fn hold(&mut self, binding: Binding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    /// Hold `link` until the scope is cleared.
    pub fn hold_link(&mut self, link: DependencyLink) -> &mut Self {
        self.links.push(link);
        self
    }

    /// Number of held bindings and links.
    pub fn len(&self) -> usize {
        self.bindings.len() + self.links.len()
    }

    /// True when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.links.is_empty()
    }

    /// Release everything held. The scope can be reused afterwards.
    pub fn clear(&mut self) {
        while let Some(binding) = self.bindings.pop() {
            binding.release();
        }
        while let Some(link) = self.links.pop() {
            link.release();
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}
