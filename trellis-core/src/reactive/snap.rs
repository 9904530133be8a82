//! Snap Implementation
//!
//! A Snap is a single-assignment cell describing one version of a reactive
//! value. It starts out waiting, receives its value at most once, and is
//! eventually retired ("obsoleted") when the value it describes goes stale.
//!
//! # States
//!
//! ```text
//!            ┌──────────► Forever(value)
//!            │
//! Waiting ───┼──────────► Ready(value) ──► Obsolete
//!            │
//!            └──────────────────────────► Obsolete
//! ```
//!
//! A Snap never leaves `Obsolete` and never leaves `Forever`. `Forever` marks
//! a value that can never change, which lets every combinator downstream of a
//! constant stop listening.
//!
//! # Waiters
//!
//! Two queues hang off a live Snap:
//!
//! - *available* waiters, consumed once when the value arrives;
//! - *obsolete* observers, consumed once when the Snap is retired.
//!
//! Both are run in insertion order. Obsolete observers are other Snaps or
//! plain callbacks (both implement [`Obsoletable`]), so obsolescence cascades
//! through the dependency graph synchronously. Retired observers are dropped
//! from the queue every `waiter_compaction_threshold` enqueues, so a Snap that
//! lives for a long time under a churning graph does not grow without bound.
//!
//! # Ownership
//!
//! A Snap holds its waiters, never its sources. The closures a combinator
//! registers on its sources hold the result Snap; those closures are freed
//! when the source resolves or is obsoleted, which breaks the cycle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::concurrency::Async;
use crate::config;

use super::View;

/// Counter for generating unique Snap IDs.
static SNAP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_snap_id() -> u64 {
    SNAP_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Something that can be told its inputs went stale.
pub trait Obsoletable {
    /// Retire this observer. Must be idempotent.
    fn mark_obsolete(&self);

    /// Whether the observer is already retired.
    fn is_obsolete(&self) -> bool;
}

/// A one-shot callback observer.
struct ObsoleteCallback(RefCell<Option<Box<dyn FnOnce()>>>);

impl ObsoleteCallback {
    fn new(f: impl FnOnce() + 'static) -> Rc<dyn Obsoletable> {
        Rc::new(Self(RefCell::new(Some(Box::new(f)))))
    }
}

impl Obsoletable for ObsoleteCallback {
    fn mark_obsolete(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f();
        }
    }

    fn is_obsolete(&self) -> bool {
        self.0.borrow().is_none()
    }
}

/// Continuation receiving the value and whether it is final.
type Avail<T> = Box<dyn FnOnce(T, bool)>;
type Observers = Vec<Rc<dyn Obsoletable>>;

enum State<T> {
    Forever(T),
    Ready(T, Observers),
    Waiting(Vec<Avail<T>>, Observers),
    Obsolete,
}

struct SnapCell<T> {
    id: u64,
    state: RefCell<State<T>>,
}

/// One version of a reactive value.
pub struct Snap<T>(Rc<SnapCell<T>>);

impl<T> Clone for Snap<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

/// Push an observer, periodically dropping retired ones.
fn enqueue(observers: &mut Observers, observer: Rc<dyn Obsoletable>) {
    observers.push(observer);
    let threshold = config::waiter_compaction_threshold().max(1);
    if observers.len() % threshold == 0 {
        observers.retain(|o| !o.is_obsolete());
    }
}

impl<T> SnapCell<T> {
    fn retire(&self) {
        let observers = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Forever(_) | State::Obsolete => return,
                State::Ready(_, observers) | State::Waiting(_, observers) => {
                    let observers = std::mem::take(observers);
                    *state = State::Obsolete;
                    observers
                }
            }
        };
        for observer in observers {
            observer.mark_obsolete();
        }
    }
}

impl<T> Obsoletable for SnapCell<T> {
    fn mark_obsolete(&self) {
        self.retire()
    }

    fn is_obsolete(&self) -> bool {
        matches!(*self.state.borrow(), State::Obsolete)
    }
}

enum Next<T> {
    Run(T, bool, Avail<T>),
    Retired(Rc<dyn Obsoletable>),
    Queued,
}

impl<T: Clone + 'static> Snap<T> {
    fn with_state(state: State<T>) -> Self {
        Self(Rc::new(SnapCell {
            id: next_snap_id(),
            state: RefCell::new(state),
        }))
    }

    /// A Snap whose value will never change.
    pub fn forever(value: T) -> Self {
        Self::with_state(State::Forever(value))
    }

    /// A Snap that already holds `value`.
    pub fn ready(value: T) -> Self {
        Self::with_state(State::Ready(value, Vec::new()))
    }

    /// A Snap still waiting for its value.
    pub fn waiting() -> Self {
        Self::with_state(State::Waiting(Vec::new(), Vec::new()))
    }

    /// A Snap that is already retired.
    pub fn retired() -> Self {
        Self::with_state(State::Obsolete)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_forever(&self) -> bool {
        matches!(*self.0.state.borrow(), State::Forever(_))
    }

    pub fn is_obsolete(&self) -> bool {
        self.0.is_obsolete()
    }

    /// Holds a value (`Ready` or `Forever`).
    pub fn is_done(&self) -> bool {
        matches!(*self.0.state.borrow(), State::Forever(_) | State::Ready(..))
    }

    /// The value, if one has arrived and the Snap is still current.
    pub fn value(&self) -> Option<T> {
        match &*self.0.state.borrow() {
            State::Forever(v) | State::Ready(v, _) => Some(v.clone()),
            _ => None,
        }
    }

    /// Retire this Snap and, transitively, everything observing it.
    pub fn mark_obsolete(&self) {
        self.0.retire()
    }

    /// Waiting → Ready.
    pub fn mark_ready(&self, value: T) {
        self.resolve(value, false)
    }

    /// Waiting → Forever.
    pub fn mark_forever(&self, value: T) {
        self.resolve(value, true)
    }

    /// Resolve with `value`, as `Forever` when `forever` is set.
    pub(crate) fn resolve(&self, value: T, forever: bool) {
        let waiters = {
            let mut state = self.0.state.borrow_mut();
            match &mut *state {
                State::Waiting(avail, observers) => {
                    let avail = std::mem::take(avail);
                    let observers = std::mem::take(observers);
                    *state = if forever {
                        State::Forever(value.clone())
                    } else {
                        State::Ready(value.clone(), observers)
                    };
                    avail
                }
                _ => return,
            }
        };
        for k in waiters {
            k(value.clone(), forever);
        }
    }

    /// Core subscription: run `avail` once a value is present and retire
    /// `observer` when this Snap is retired.
    fn when(&self, avail: Avail<T>, observer: Rc<dyn Obsoletable>) {
        let next = {
            let mut state = self.0.state.borrow_mut();
            match &mut *state {
                State::Forever(v) => Next::Run(v.clone(), true, avail),
                State::Ready(v, observers) => {
                    enqueue(observers, observer);
                    Next::Run(v.clone(), false, avail)
                }
                State::Waiting(waiters, observers) => {
                    waiters.push(avail);
                    enqueue(observers, observer);
                    Next::Queued
                }
                State::Obsolete => Next::Retired(observer),
            }
        };
        match next {
            Next::Run(v, forever, avail) => avail(v, forever),
            Next::Retired(observer) => observer.mark_obsolete(),
            Next::Queued => {}
        }
    }

    /// Run `on_available` with the value once present, and `on_obsolete`
    /// when this Snap is retired.
    ///
    /// On a `Ready` Snap `on_available` runs synchronously; on an already
    /// retired Snap only `on_obsolete` runs; on a `Forever` Snap
    /// `on_obsolete` is dropped.
    pub fn when_ready(
        &self,
        on_available: impl FnOnce(T) + 'static,
        on_obsolete: impl FnOnce() + 'static,
    ) {
        self.when(
            Box::new(move |v, _| on_available(v)),
            ObsoleteCallback::new(on_obsolete),
        )
    }

    /// Run `f` when this Snap is retired.
    pub fn on_obsolete(&self, f: impl FnOnce() + 'static) {
        self.subscribe(ObsoleteCallback::new(f))
    }

    pub(crate) fn subscribe(&self, observer: Rc<dyn Obsoletable>) {
        let retired = {
            let mut state = self.0.state.borrow_mut();
            match &mut *state {
                State::Forever(_) => None,
                State::Ready(_, observers) | State::Waiting(_, observers) => {
                    enqueue(observers, observer);
                    None
                }
                State::Obsolete => Some(observer),
            }
        };
        if let Some(observer) = retired {
            observer.mark_obsolete();
        }
    }

    fn as_observer(&self) -> Rc<dyn Obsoletable> {
        self.0.clone()
    }

    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(T) -> U + 'static) -> Snap<U> {
        if let Some(v) = self.forever_value() {
            return Snap::forever(f(v));
        }
        let res = Snap::waiting();
        let out = res.clone();
        self.when(
            Box::new(move |x, forever| out.resolve(f(x), forever)),
            res.as_observer(),
        );
        res
    }

    /// Combine two Snaps. The result is `Forever` only if both inputs are.
    pub fn map2<B, C>(a: &Snap<T>, b: &Snap<B>, f: impl FnOnce(T, B) -> C + 'static) -> Snap<C>
    where
        B: Clone + 'static,
        C: Clone + 'static,
    {
        match (a.forever_value(), b.forever_value()) {
            (Some(x), Some(y)) => return Snap::forever(f(x, y)),
            (Some(x), None) => return b.map(move |y| f(x, y)),
            (None, Some(y)) => return a.map(move |x| f(x, y)),
            (None, None) => {}
        }

        let res = Snap::waiting();
        let pair = Rc::new(Pair {
            left: RefCell::new(None),
            right: RefCell::new(None),
            f: RefCell::new(Some(f)),
            res: res.clone(),
        });

        let left = Rc::clone(&pair);
        a.when(
            Box::new(move |x, forever| {
                *left.left.borrow_mut() = Some((x, forever));
                left.try_finish();
            }),
            res.as_observer(),
        );
        let right = pair;
        b.when(
            Box::new(move |y, forever| {
                *right.right.borrow_mut() = Some((y, forever));
                right.try_finish();
            }),
            res.as_observer(),
        );
        res
    }

    /// Subscribe to the Snap produced by `f` once this one resolves.
    ///
    /// Retiring either the outer or the inner Snap retires the result.
    pub fn bind<U: Clone + 'static>(&self, f: impl FnOnce(T) -> Snap<U> + 'static) -> Snap<U> {
        let res = Snap::waiting();
        let out = res.clone();
        let observer = res.as_observer();
        self.when(
            Box::new(move |x, outer_forever| {
                let inner = f(x);
                let observer = out.as_observer();
                inner.when(
                    Box::new(move |y, inner_forever| {
                        out.resolve(y, outer_forever && inner_forever)
                    }),
                    observer,
                );
            }),
            observer,
        );
        res
    }

    /// Resolve to all values once every input has resolved.
    pub fn sequence(snaps: Vec<Snap<T>>) -> Snap<Vec<T>> {
        if snaps.is_empty() {
            return Snap::forever(Vec::new());
        }
        let res = Snap::waiting();
        let gather = Rc::new(Gather {
            values: RefCell::new(snaps.iter().map(|_| None).collect()),
            remaining: std::cell::Cell::new(snaps.len()),
            all_forever: std::cell::Cell::new(true),
            res: res.clone(),
        });
        for (i, snap) in snaps.iter().enumerate() {
            let gather = Rc::clone(&gather);
            snap.when(
                Box::new(move |v, forever| gather.accept(i, v, forever)),
                res.as_observer(),
            );
        }
        res
    }

    /// Resolve with the result of an asynchronous computation.
    ///
    /// Errors are logged; the result then stays waiting until retired.
    pub fn map_async<U: Clone + 'static>(&self, f: impl FnOnce(T) -> Async<U> + 'static) -> Snap<U> {
        let res = Snap::waiting();
        let out = res.clone();
        self.when(
            Box::new(move |x, forever| {
                f(x).start_with_continuations(
                    move |y| out.resolve(y, forever),
                    |error| tracing::error!(%error, "asynchronous view mapping failed"),
                    || {},
                    None,
                );
            }),
            res.as_observer(),
        );
        res
    }

    fn forever_value(&self) -> Option<T> {
        match &*self.0.state.borrow() {
            State::Forever(v) => Some(v.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        match &*self.0.state.borrow() {
            State::Ready(_, o) | State::Waiting(_, o) => o.len(),
            _ => 0,
        }
    }
}

impl Snap<()> {
    /// Unit-valued `map2`, used to merge update signals.
    pub fn map2_unit(a: &Snap<()>, b: &Snap<()>) -> Snap<()> {
        Snap::map2(a, b, |(), ()| ())
    }
}

impl<T: Clone + 'static> Snap<View<T>> {
    /// Flatten a Snap of a View into a Snap of the View's current value.
    pub fn join(&self) -> Snap<T> {
        self.bind(|view| view.snap())
    }
}

struct Pair<A, B, C, F> {
    left: RefCell<Option<(A, bool)>>,
    right: RefCell<Option<(B, bool)>>,
    f: RefCell<Option<F>>,
    res: Snap<C>,
}

impl<A, B, C, F> Pair<A, B, C, F>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
    F: FnOnce(A, B) -> C,
{
    fn try_finish(&self) {
        if self.res.is_obsolete() || self.res.is_done() {
            return;
        }
        let (x, fx) = match &*self.left.borrow() {
            Some((x, fx)) => (x.clone(), *fx),
            None => return,
        };
        let (y, fy) = match &*self.right.borrow() {
            Some((y, fy)) => (y.clone(), *fy),
            None => return,
        };
        let f = self.f.borrow_mut().take();
        if let Some(f) = f {
            self.res.resolve(f(x, y), fx && fy);
        }
    }
}

struct Gather<T> {
    values: RefCell<Vec<Option<T>>>,
    remaining: std::cell::Cell<usize>,
    all_forever: std::cell::Cell<bool>,
    res: Snap<Vec<T>>,
}

impl<T: Clone + 'static> Gather<T> {
    fn accept(&self, index: usize, value: T, forever: bool) {
        if let Some(slot) = self.values.borrow_mut().get_mut(index) {
            *slot = Some(value);
        }
        self.all_forever.set(self.all_forever.get() && forever);
        let left = self.remaining.get().saturating_sub(1);
        self.remaining.set(left);
        if left == 0 {
            let values: Vec<T> = std::mem::take(&mut *self.values.borrow_mut())
                .into_iter()
                .flatten()
                .collect();
            self.res.resolve(values, self.all_forever.get());
        }
    }
}

impl<T> fmt::Debug for Snap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.0.state.borrow() {
            State::Forever(_) => "Forever",
            State::Ready(..) => "Ready",
            State::Waiting(..) => "Waiting",
            State::Obsolete => "Obsolete",
        };
        f.debug_struct("Snap")
            .field("id", &self.0.id)
            .field("state", &state)
            .finish()
    }
}
