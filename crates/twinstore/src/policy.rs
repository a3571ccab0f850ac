//! # Storage Policy
//!
//! Two predicates over the owning record decide how an attachment uses its
//! backends:
//!
//! | Predicate | Meaning |
//! |-----------|---------|
//! | `multiple_if` | Dual mode: keep a mirror in the alternate store |
//! | `display_from_alternate` | Reads (`url`, `path`) prefer the alternate store |
//!
//! Both are evaluated on every call, never cached, so flipping a flag takes
//! effect on the next read. `display_from_alternate` only counts while
//! `multiple_if` holds.
//!
//! Rollouts usually drive the predicates from [`MigrationFlags`], a shared
//! switchboard the operator (or a test) flips at runtime.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

pub type Predicate<R> = Rc<dyn Fn(&R) -> bool>;

pub struct StoragePolicy<R> {
    multiple_if: Option<Predicate<R>>,
    display_from_alternate: Option<Predicate<R>>,
}

impl<R> StoragePolicy<R> {
    /// A policy with neither predicate set: filesystem only.
    pub fn new() -> Self {
        Self {
            multiple_if: None,
            display_from_alternate: None,
        }
    }

    pub fn with_multiple_if(mut self, predicate: impl Fn(&R) -> bool + 'static) -> Self {
        self.multiple_if = Some(Rc::new(predicate));
        self
    }

    pub fn with_display_from_alternate(
        mut self,
        predicate: impl Fn(&R) -> bool + 'static,
    ) -> Self {
        self.display_from_alternate = Some(Rc::new(predicate));
        self
    }

    /// Predicates that read the given flags on every evaluation.
    pub fn from_flags(flags: Rc<MigrationFlags>) -> Self {
        let read_flags = flags.clone();
        Self::new()
            .with_multiple_if(move |_| flags.dual_write())
            .with_display_from_alternate(move |_| read_flags.read_from_alternate())
    }

    pub fn use_multiple(&self, record: &R) -> bool {
        self.multiple_if
            .as_ref()
            .is_some_and(|predicate| predicate(record))
    }

    pub fn display_from_alternate(&self, record: &R) -> bool {
        self.use_multiple(record)
            && self
                .display_from_alternate
                .as_ref()
                .is_some_and(|predicate| predicate(record))
    }
}

impl<R> Default for StoragePolicy<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for StoragePolicy<R> {
    fn clone(&self) -> Self {
        Self {
            multiple_if: self.multiple_if.clone(),
            display_from_alternate: self.display_from_alternate.clone(),
        }
    }
}

impl<R> fmt::Debug for StoragePolicy<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoragePolicy")
            .field("multiple_if", &self.multiple_if.is_some())
            .field("display_from_alternate", &self.display_from_alternate.is_some())
            .finish()
    }
}

/// Runtime switches for a storage migration, shared by every policy built with
/// [`StoragePolicy::from_flags`].
#[derive(Debug, Default)]
pub struct MigrationFlags {
    dual_write: Cell<bool>,
    read_from_alternate: Cell<bool>,
}

impl MigrationFlags {
    pub fn new(dual_write: bool, read_from_alternate: bool) -> Rc<Self> {
        Rc::new(Self {
            dual_write: Cell::new(dual_write),
            read_from_alternate: Cell::new(read_from_alternate),
        })
    }

    pub fn dual_write(&self) -> bool {
        self.dual_write.get()
    }

    pub fn read_from_alternate(&self) -> bool {
        self.read_from_alternate.get()
    }

    pub fn set_dual_write(&self, enabled: bool) {
        self.dual_write.set(enabled);
    }

    pub fn set_read_from_alternate(&self, enabled: bool) {
        self.read_from_alternate.set(enabled);
    }
}
