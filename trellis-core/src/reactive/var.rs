//! Var Implementation
//!
//! A Var is the mutable source of the reactive graph. It owns a value and the
//! Snap describing that value. Writing a new value installs a fresh `Ready`
//! Snap and obsoletes the previous one, which invalidates every View built
//! on top of it.
//!
//! A Var can be finalized with [`Var::set_final`]: its Snap becomes `Forever`
//! and the Var refuses any further writes.
//!
//! # Example
//!
//! ```rust,ignore
//! let count = Var::create(0);
//! let label = count.view().map(|n| format!("{n} clicks"));
//!
//! count.update(|n| n + 1)?;
//! assert_eq!(label.try_get().as_deref(), Some("1 clicks"));
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

use super::{Snap, View};

/// Counter for generating unique Var IDs.
static VAR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_var_id() -> u64 {
    VAR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct VarCell<T> {
    id: u64,
    constant: Cell<bool>,
    value: RefCell<T>,
    snap: RefCell<Snap<T>>,
}

/// A mutable reactive cell. Clones share the same cell.
pub struct Var<T>(Rc<VarCell<T>>);

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Clone + 'static> Var<T> {
    pub fn create(value: T) -> Self {
        Self(Rc::new(VarCell {
            id: next_var_id(),
            constant: Cell::new(false),
            snap: RefCell::new(Snap::ready(value.clone())),
            value: RefCell::new(value),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_constant(&self) -> bool {
        self.0.constant.get()
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.0.value.borrow().clone()
    }

    /// Replace the value and invalidate dependents.
    pub fn set(&self, value: T) -> Result<()> {
        self.ensure_mutable()?;
        self.install(value, Snap::ready);
        Ok(())
    }

    /// Replace the value for the last time.
    ///
    /// Views of this Var become constant and stop listening.
    pub fn set_final(&self, value: T) -> Result<()> {
        self.ensure_mutable()?;
        self.0.constant.set(true);
        self.install(value, Snap::forever);
        Ok(())
    }

    pub fn update(&self, f: impl FnOnce(T) -> T) -> Result<()> {
        let next = f(self.get());
        self.set(next)
    }

    /// Set the value only if `f` yields a replacement.
    pub fn update_maybe(&self, f: impl FnOnce(T) -> Option<T>) -> Result<()> {
        match f(self.get()) {
            Some(next) => self.set(next),
            None => Ok(()),
        }
    }

    /// The View of this Var's value.
    pub fn view(&self) -> View<T> {
        let var = self.clone();
        View::new(move || var.0.snap.borrow().clone())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_constant() {
            return Err(Error::VarIsConstant { var_id: self.0.id });
        }
        Ok(())
    }

    fn install(&self, value: T, make: fn(T) -> Snap<T>) {
        *self.0.value.borrow_mut() = value.clone();
        let previous = self.0.snap.replace(make(value));
        previous.mark_obsolete();
    }
}

impl<T: fmt::Debug> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.0.id)
            .field("value", &*self.0.value.borrow())
            .field("constant", &self.0.constant.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_obsoletes_previous_snap_once() {
        let var = Var::create(1);
        let snap = var.view().snap();
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        snap.when_ready(|_| {}, move || counter.set(counter.get() + 1));

        var.set(2).unwrap();
        var.set(3).unwrap();

        assert_eq!(fired.get(), 1);
        assert_eq!(var.get(), 3);
        assert_eq!(var.view().try_get(), Some(3));
    }

    #[test]
    fn set_final_rejects_later_writes() {
        let var = Var::create("draft");
        var.set_final("published").unwrap();

        assert!(var.view().snap().is_forever());
        assert_eq!(
            var.set("edited"),
            Err(Error::VarIsConstant { var_id: var.id() })
        );
        assert_eq!(var.set_final("again").unwrap_err(), Error::VarIsConstant { var_id: var.id() });
        assert_eq!(var.get(), "published");
    }

    #[test]
    fn update_maybe_skips_none() {
        let var = Var::create(10);
        let snap = var.view().snap();

        var.update_maybe(|_| None).unwrap();
        assert!(!snap.is_obsolete());

        var.update_maybe(|x| Some(x + 1)).unwrap();
        assert!(snap.is_obsolete());
        assert_eq!(var.get(), 11);
    }

    #[test]
    fn ids_are_unique() {
        let a = Var::create(());
        let b = Var::create(());
        assert_ne!(a.id(), b.id());
    }
}
