//! View Implementation
//!
//! A View is a recipe for obtaining the current [`Snap`] of some value. Pulling
//! a View (calling [`View::snap`]) returns a Snap that stays valid until one of
//! its inputs changes; once that Snap is obsoleted the next pull builds a new
//! one.
//!
//! Combinators are lazy: [`View::create_lazy`] memoizes the last Snap it
//! produced, so repeated pulls between two invalidations observe the very
//! same Snap and do not recompute anything.
//!
//! # Consuming Views
//!
//! - [`View::get`] reads a value once.
//! - [`View::sink`] runs a callback for every value the View takes, pulling
//!   again on the scheduler after each invalidation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::concurrency::{scheduler, Async};

use super::Snap;

/// A time-varying value.
pub struct View<T>(Rc<dyn Fn() -> Snap<T>>);

impl<T> Clone for View<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

struct LazyCell<T> {
    current: RefCell<Option<Snap<T>>>,
    observe: Box<dyn Fn() -> Snap<T>>,
}

impl<T: Clone + 'static> LazyCell<T> {
    fn pull(self: &Rc<Self>) -> Snap<T> {
        if let Some(snap) = self.current.borrow().as_ref() {
            if !snap.is_obsolete() {
                return snap.clone();
            }
        }
        let snap = (self.observe)();
        *self.current.borrow_mut() = Some(snap.clone());

        let weak: Weak<Self> = Rc::downgrade(self);
        snap.on_obsolete(move || {
            if let Some(cell) = weak.upgrade() {
                let stale = cell.current.borrow_mut().take();
                drop(stale);
            }
        });
        snap
    }
}

struct SinkLoop<T> {
    view: View<T>,
    act: Box<dyn Fn(T)>,
}

impl<T: Clone + 'static> SinkLoop<T> {
    fn run(self: Rc<Self>) {
        let snap = self.view.snap();
        let this = Rc::clone(&self);
        snap.when_ready(
            move |value| (this.act)(value),
            move || scheduler::fork(move || self.run()),
        );
    }
}

impl<T: Clone + 'static> View<T> {
    /// Wrap a raw observe function. Every pull calls it.
    pub fn new(observe: impl Fn() -> Snap<T> + 'static) -> Self {
        Self(Rc::new(observe))
    }

    /// Wrap an observe function, caching its Snap until that Snap is
    /// obsoleted.
    pub fn create_lazy(observe: impl Fn() -> Snap<T> + 'static) -> Self {
        let cell = Rc::new(LazyCell {
            current: RefCell::new(None),
            observe: Box::new(observe),
        });
        Self::new(move || cell.pull())
    }

    /// A View that never changes.
    pub fn constant(value: T) -> Self {
        let snap = Snap::forever(value);
        Self::new(move || snap.clone())
    }

    /// A View that takes the result of `job` once it completes, and never
    /// changes afterwards.
    pub fn const_async(job: Async<T>) -> Self {
        let snap = Snap::waiting();
        let out = snap.clone();
        job.start_with_continuations(
            move |value| out.mark_forever(value),
            |error| tracing::error!(%error, "constant asynchronous view failed"),
            || {},
            None,
        );
        Self::new(move || snap.clone())
    }

    /// The current Snap.
    pub fn snap(&self) -> Snap<T> {
        (self.0)()
    }

    pub fn map<U: Clone + 'static>(&self, f: impl Fn(T) -> U + 'static) -> View<U> {
        let source = self.clone();
        let f = Rc::new(f);
        View::create_lazy(move || {
            let f = Rc::clone(&f);
            source.snap().map(move |x| f(x))
        })
    }

    pub fn map2<B, C>(a: &View<T>, b: &View<B>, f: impl Fn(T, B) -> C + 'static) -> View<C>
    where
        B: Clone + 'static,
        C: Clone + 'static,
    {
        let (a, b) = (a.clone(), b.clone());
        let f = Rc::new(f);
        View::create_lazy(move || {
            let f = Rc::clone(&f);
            Snap::map2(&a.snap(), &b.snap(), move |x, y| f(x, y))
        })
    }

    /// Switch to the View chosen by `f` for each value of this one.
    pub fn bind<U: Clone + 'static>(&self, f: impl Fn(T) -> View<U> + 'static) -> View<U> {
        self.map(f).join()
    }

    /// Combine a list of Views into a View of their values.
    pub fn sequence(views: impl IntoIterator<Item = View<T>>) -> View<Vec<T>> {
        let views: Vec<View<T>> = views.into_iter().collect();
        View::create_lazy(move || Snap::sequence(views.iter().map(View::snap).collect()))
    }

    /// Map through an asynchronous computation.
    pub fn map_async<U: Clone + 'static>(&self, f: impl Fn(T) -> Async<U> + 'static) -> View<U> {
        let source = self.clone();
        let f = Rc::new(f);
        View::create_lazy(move || {
            let f = Rc::clone(&f);
            source.snap().map_async(move |x| f(x))
        })
    }

    /// Read the current value once it is available.
    pub fn get(&self, k: impl FnOnce(T) + 'static) {
        self.snap().when_ready(k, || {})
    }

    /// The current value, if it is already available.
    pub fn try_get(&self) -> Option<T> {
        self.snap().value()
    }

    /// Run `act` for the current value and for every later value.
    ///
    /// The first pull and every re-pull after an invalidation are forked on
    /// the scheduler. The loop ends when the View becomes constant.
    pub fn sink(&self, act: impl Fn(T) + 'static) {
        let sink = Rc::new(SinkLoop {
            view: self.clone(),
            act: Box::new(act),
        });
        scheduler::fork(move || sink.run());
    }
}

impl<T: Clone + 'static> View<View<T>> {
    /// Flatten a View of Views.
    pub fn join(&self) -> View<T> {
        let views = self.clone();
        View::create_lazy(move || views.snap().join())
    }
}

impl View<()> {
    /// Merge two update signals into one.
    pub fn map2_unit(a: &View<()>, b: &View<()>) -> View<()> {
        let (a, b) = (a.clone(), b.clone());
        View::create_lazy(move || Snap::<()>::map2_unit(&a.snap(), &b.snap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::host;
    use crate::reactive::Var;
    use std::cell::Cell;

    #[test]
    fn lazy_view_shares_snap_until_invalidated() {
        let var = Var::create(1);
        let counter = Rc::new(Cell::new(0));
        let c = Rc::clone(&counter);
        let doubled = var.view().map(move |x| {
            c.set(c.get() + 1);
            x * 2
        });

        let first = doubled.snap();
        let second = doubled.snap();
        assert_eq!(first.id(), second.id());
        assert_eq!(counter.get(), 1);

        var.set(5).unwrap();
        assert!(first.is_obsolete());
        assert_eq!(doubled.try_get(), Some(10));
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn constant_views_are_forever() {
        let view = View::constant(3).map(|x| x + 1);
        assert!(view.snap().is_forever());
        assert_eq!(view.try_get(), Some(4));
    }

    #[test]
    fn bind_switches_inner_view() {
        let which = Var::create(true);
        let left = Var::create("left");
        let right = Var::create("right");
        let (l, r) = (left.view(), right.view());
        let chosen = which.view().bind(move |b| if b { l.clone() } else { r.clone() });

        assert_eq!(chosen.try_get(), Some("left"));
        left.set("LEFT").unwrap();
        assert_eq!(chosen.try_get(), Some("LEFT"));
        which.set(false).unwrap();
        assert_eq!(chosen.try_get(), Some("right"));
    }

    #[test]
    fn sequence_follows_each_input() {
        let vars: Vec<Var<i32>> = (0..3).map(Var::create).collect();
        let all = View::sequence(vars.iter().map(Var::view));
        assert_eq!(all.try_get(), Some(vec![0, 1, 2]));

        vars[1].set(10).unwrap();
        assert_eq!(all.try_get(), Some(vec![0, 10, 2]));
    }

    #[test]
    fn sink_reruns_after_each_change() {
        host::run_until_idle();
        let var = Var::create(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        var.view().sink(move |v| log.borrow_mut().push(v));

        // Nothing runs until the scheduler does.
        assert!(seen.borrow().is_empty());
        host::run_until_idle();

        var.set(1).unwrap();
        var.set(2).unwrap();
        host::run_until_idle();

        assert_eq!(*seen.borrow(), vec![0, 2]);
    }

    #[test]
    fn const_async_resolves_once_job_finishes() {
        host::run_until_idle();
        let view = View::const_async(Async::sleep(5.0).map(|_| "loaded"));
        assert_eq!(view.try_get(), None);

        host::run_until_idle();
        assert_eq!(view.try_get(), Some("loaded"));
        assert!(view.snap().is_forever());
    }

    #[test]
    fn map_async_tracks_source() {
        host::run_until_idle();
        let var = Var::create(2);
        let view = var.view().map_async(|x| Async::ret(x * 100));
        host::run_until_idle();
        assert_eq!(view.try_get(), Some(200));

        var.set(3).unwrap();
        host::run_until_idle();
        assert_eq!(view.try_get(), Some(300));
    }
}
