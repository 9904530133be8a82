//! Cooperative cancellation.
//!
//! A token is a flag plus a list of registered callbacks. Cancelling sets the
//! flag and runs the callbacks once, in registration order. Computations check
//! the flag at bind boundaries; nothing is preempted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Callback = Box<dyn FnOnce()>;

#[derive(Default)]
struct TokenState {
    cancelled: Cell<bool>,
    registrations: RefCell<Vec<Option<Callback>>>,
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancellationToken(Rc<TokenState>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.get()
    }

    /// Request cancellation. Later calls do nothing.
    pub fn cancel(&self) {
        if self.0.cancelled.replace(true) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.0.registrations.borrow_mut());
        for callback in callbacks.into_iter().flatten() {
            callback();
        }
    }

    /// Run `callback` when the token is cancelled.
    ///
    /// On an already cancelled token the callback runs immediately.
    pub fn register(&self, callback: impl FnOnce() + 'static) -> Registration {
        if self.is_cancelled() {
            callback();
            return Registration {
                token: Weak::new(),
                index: 0,
            };
        }
        let mut registrations = self.0.registrations.borrow_mut();
        registrations.push(Some(Box::new(callback)));
        Registration {
            token: Rc::downgrade(&self.0),
            index: registrations.len() - 1,
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Handle to a registered cancellation callback.
pub struct Registration {
    token: Weak<TokenState>,
    index: usize,
}

impl Registration {
    /// Forget the callback without running it.
    pub fn dispose(self) {
        if let Some(state) = self.token.upgrade() {
            if let Some(slot) = state.registrations.borrow_mut().get_mut(self.index) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_run_once_in_order() {
        let token = CancellationToken::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            token.register(move || log.borrow_mut().push(i));
        }

        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn disposed_registration_is_skipped() {
        let token = CancellationToken::new();
        let hit = Rc::new(Cell::new(false));
        let hit_clone = hit.clone();

        let registration = token.register(move || hit_clone.set(true));
        registration.dispose();
        token.cancel();

        assert!(!hit.get());
    }

    #[test]
    fn registering_after_cancel_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let hit = Rc::new(Cell::new(false));
        let hit_clone = hit.clone();
        token.register(move || hit_clone.set(true)).dispose();
        assert!(hit.get());
    }
}
