//! Asynchronous Computations
//!
//! [`Async<T>`] is a deferred, restartable computation in continuation-passing
//! style. Running it hands it an [`AsyncBody`]: a one-shot continuation that
//! receives an [`Outcome`] and the [`CancellationToken`] of the run.
//!
//! # Why Continuations Are Forked
//!
//! `bind` never calls the next step inline. The continuation is forked onto
//! the [`Scheduler`](super::Scheduler), so a chain of any length runs with a
//! bounded stack and the host gets control back between steps. The same
//! boundary is where cancellation is checked and where a panic raised by a
//! bound function is caught and turned into an error outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! let job = Async::sleep(100.0)
//!     .then(Async::ret(21))
//!     .map(|x| x * 2);
//!
//! job.start_with_continuations(|v| assert_eq!(v, 42), |_| {}, || {}, None);
//! host::run_until_idle();
//! ```

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{Error, Result};

use super::cancel::CancellationToken;
use super::{host, scheduler};

/// How an asynchronous computation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Err(Error),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

/// The continuation record handed to a running computation.
pub struct AsyncBody<T> {
    k: Box<dyn FnOnce(Outcome<T>)>,
    ct: CancellationToken,
}

impl<T> AsyncBody<T> {
    pub fn new(ct: CancellationToken, k: impl FnOnce(Outcome<T>) + 'static) -> Self {
        Self { k: Box::new(k), ct }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.ct
    }

    /// Deliver the outcome. Consumes the body, so it happens at most once.
    pub fn resume(self, outcome: Outcome<T>) {
        (self.k)(outcome)
    }
}

/// Run `f`, turning a panic into [`Error::Panicked`].
fn guarded<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Error::from_panic)
}

/// A deferred computation producing a `T`.
///
/// Values are cheap to clone and can be run any number of times.
pub struct Async<T>(Rc<dyn Fn(AsyncBody<T>)>);

impl<T> Clone for Async<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static> Async<T> {
    /// Build a computation from its raw continuation-passing form.
    pub fn new(run: impl Fn(AsyncBody<T>) + 'static) -> Self {
        Self(Rc::new(run))
    }

    /// Run with an explicit continuation record.
    pub fn run(&self, body: AsyncBody<T>) {
        (self.0)(body)
    }

    /// A computation that yields `value`.
    pub fn ret(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_fn(move || value.clone())
    }

    /// A computation that calls `f` each time it runs.
    pub fn from_fn(f: impl Fn() -> T + 'static) -> Self {
        Self::new(move |c| {
            if c.ct.is_cancelled() {
                c.resume(Outcome::Cancelled);
                return;
            }
            match guarded(&f) {
                Ok(v) => c.resume(Outcome::Ok(v)),
                Err(e) => c.resume(Outcome::Err(e)),
            }
        })
    }

    /// A computation that fails with `error`.
    pub fn fail(error: Error) -> Self {
        Self::new(move |c| c.resume(Outcome::Err(error.clone())))
    }

    /// Build the computation to run only when it is run.
    pub fn delay(f: impl Fn() -> Async<T> + 'static) -> Self {
        Self::new(move |c| match guarded(&f) {
            Ok(next) => next.run(c),
            Err(e) => c.resume(Outcome::Err(e)),
        })
    }

    /// Sequence `f` after this computation.
    pub fn bind<U: 'static>(&self, f: impl Fn(T) -> Async<U> + 'static) -> Async<U> {
        let this = self.clone();
        let f = Rc::new(f);
        Async::new(move |c: AsyncBody<U>| {
            if c.ct.is_cancelled() {
                c.resume(Outcome::Cancelled);
                return;
            }
            let f = Rc::clone(&f);
            let ct = c.ct.clone();
            this.run(AsyncBody::new(ct, move |outcome| match outcome {
                Outcome::Ok(x) => scheduler::fork(move || {
                    if c.ct.is_cancelled() {
                        c.resume(Outcome::Cancelled);
                        return;
                    }
                    match guarded(move || (*f)(x)) {
                        Ok(next) => next.run(c),
                        Err(e) => c.resume(Outcome::Err(e)),
                    }
                }),
                Outcome::Err(e) => scheduler::fork(move || c.resume(Outcome::Err(e))),
                Outcome::Cancelled => scheduler::fork(move || c.resume(Outcome::Cancelled)),
            }));
        })
    }

    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> Async<U> {
        let this = self.clone();
        let f = Rc::new(f);
        Async::new(move |c: AsyncBody<U>| {
            if c.ct.is_cancelled() {
                c.resume(Outcome::Cancelled);
                return;
            }
            let f = Rc::clone(&f);
            let ct = c.ct.clone();
            this.run(AsyncBody::new(ct, move |outcome| {
                scheduler::fork(move || {
                    let mapped = match outcome {
                        Outcome::Ok(_) if c.ct.is_cancelled() => Outcome::Cancelled,
                        Outcome::Ok(x) => match guarded(move || (*f)(x)) {
                            Ok(v) => Outcome::Ok(v),
                            Err(e) => Outcome::Err(e),
                        },
                        Outcome::Err(e) => Outcome::Err(e),
                        Outcome::Cancelled => Outcome::Cancelled,
                    };
                    c.resume(mapped)
                })
            }));
        })
    }

    /// Run `next` after this computation, discarding this result.
    pub fn then<U: 'static>(&self, next: Async<U>) -> Async<U> {
        self.bind(move |_| next.clone())
    }

    /// Move errors into the value. Cancellation still propagates.
    pub fn catch(&self) -> Async<Result<T>> {
        let this = self.clone();
        Async::new(move |c: AsyncBody<Result<T>>| {
            let ct = c.ct.clone();
            this.run(AsyncBody::new(ct, move |outcome| {
                c.resume(match outcome {
                    Outcome::Ok(v) => Outcome::Ok(Ok(v)),
                    Outcome::Err(e) => Outcome::Ok(Err(e)),
                    Outcome::Cancelled => Outcome::Cancelled,
                })
            }));
        })
    }

    /// Wrap a callback-style operation.
    ///
    /// `subscribe` receives a [`Resolver`] for each run. Settling that
    /// resolver more than once is an error.
    pub fn from_continuations(subscribe: impl Fn(Resolver<T>) + 'static) -> Self {
        Self::new(move |c| subscribe(Resolver::new(c)))
    }

    /// Run all computations concurrently and collect their results in order.
    ///
    /// The first error or cancellation ends the whole computation.
    pub fn parallel(items: Vec<Async<T>>) -> Async<Vec<T>> {
        let items: Rc<[Async<T>]> = items.into();
        Async::new(move |c: AsyncBody<Vec<T>>| {
            let n = items.len();
            if n == 0 {
                c.resume(Outcome::Ok(Vec::new()));
                return;
            }
            let ct = c.ct.clone();
            let state = Rc::new(ParallelState {
                results: RefCell::new((0..n).map(|_| None).collect()),
                remaining: Cell::new(n),
                body: RefCell::new(Some(c)),
            });
            for (i, item) in items.iter().enumerate() {
                let item = item.clone();
                let state = Rc::clone(&state);
                let ct = ct.clone();
                scheduler::fork(move || {
                    item.run(AsyncBody::new(ct, move |outcome| state.accept(i, outcome)))
                });
            }
        })
    }

    /// Start on the scheduler. Uncaught errors are logged.
    pub fn start(&self, token: Option<CancellationToken>) {
        let ct = token.unwrap_or_default();
        let this = self.clone();
        scheduler::fork(move || {
            if ct.is_cancelled() {
                return;
            }
            this.run(AsyncBody::new(ct, |outcome| {
                if let Outcome::Err(e) = outcome {
                    tracing::error!(error = %e, "uncaught asynchronous error");
                }
            }));
        });
    }

    /// Start immediately, routing the outcome to one of three callbacks.
    pub fn start_with_continuations(
        &self,
        ok: impl FnOnce(T) + 'static,
        err: impl FnOnce(Error) + 'static,
        cancelled: impl FnOnce() + 'static,
        token: Option<CancellationToken>,
    ) {
        let ct = token.unwrap_or_default();
        if ct.is_cancelled() {
            return;
        }
        self.run(AsyncBody::new(ct, move |outcome| match outcome {
            Outcome::Ok(v) => ok(v),
            Outcome::Err(e) => err(e),
            Outcome::Cancelled => cancelled(),
        }));
    }
}

impl Async<()> {
    /// Complete after `ms` milliseconds of host time.
    pub fn sleep(ms: f64) -> Self {
        Self::new(move |c: AsyncBody<()>| {
            if c.ct.is_cancelled() {
                c.resume(Outcome::Cancelled);
                return;
            }
            let ct = c.ct.clone();
            let slot = Rc::new(RefCell::new(Some(c)));
            let fire = Rc::clone(&slot);
            let timer = host::set_timeout(
                ms,
                Box::new(move || {
                    let body = fire.borrow_mut().take();
                    if let Some(body) = body {
                        body.resume(Outcome::Ok(()));
                    }
                }),
            );
            ct.register(move || {
                host::clear_timeout(timer);
                let body = slot.borrow_mut().take();
                if let Some(body) = body {
                    scheduler::fork(move || body.resume(Outcome::Cancelled));
                }
            });
        })
    }
}

struct ParallelState<T> {
    results: RefCell<Vec<Option<T>>>,
    remaining: Cell<usize>,
    body: RefCell<Option<AsyncBody<Vec<T>>>>,
}

impl<T> ParallelState<T> {
    fn accept(&self, index: usize, outcome: Outcome<T>) {
        match outcome {
            Outcome::Ok(v) => {
                if let Some(slot) = self.results.borrow_mut().get_mut(index) {
                    *slot = Some(v);
                }
                let left = self.remaining.get().saturating_sub(1);
                self.remaining.set(left);
                if left == 0 {
                    let body = self.body.borrow_mut().take();
                    if let Some(body) = body {
                        let values = std::mem::take(&mut *self.results.borrow_mut())
                            .into_iter()
                            .flatten()
                            .collect();
                        body.resume(Outcome::Ok(values));
                    }
                }
            }
            Outcome::Err(e) => {
                let body = self.body.borrow_mut().take();
                if let Some(body) = body {
                    body.resume(Outcome::Err(e));
                }
            }
            Outcome::Cancelled => {
                let body = self.body.borrow_mut().take();
                if let Some(body) = body {
                    body.resume(Outcome::Cancelled);
                }
            }
        }
    }
}

struct ResolverState<T> {
    body: RefCell<Option<AsyncBody<T>>>,
    ct: CancellationToken,
    continued: Cell<bool>,
}

/// The success/error/cancel callbacks handed out by
/// [`Async::from_continuations`]. Exactly one of them may be used, once.
pub struct Resolver<T>(Rc<ResolverState<T>>);

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static> Resolver<T> {
    fn new(body: AsyncBody<T>) -> Self {
        let ct = body.ct.clone();
        Self(Rc::new(ResolverState {
            body: RefCell::new(Some(body)),
            ct,
            continued: Cell::new(false),
        }))
    }

    /// Cancellation token of the run being resolved.
    pub fn token(&self) -> &CancellationToken {
        &self.0.ct
    }

    pub fn resolve(&self, value: T) -> Result<()> {
        self.settle(Outcome::Ok(value))
    }

    pub fn reject(&self, error: Error) -> Result<()> {
        self.settle(Outcome::Err(error))
    }

    pub fn cancel(&self) -> Result<()> {
        self.settle(Outcome::Cancelled)
    }

    fn settle(&self, outcome: Outcome<T>) -> Result<()> {
        if self.0.continued.replace(true) {
            tracing::error!("continuation settled more than once");
            return Err(Error::ContinuationInvokedTwice);
        }
        let body = self.0.body.borrow_mut().take();
        if let Some(body) = body {
            scheduler::fork(move || body.resume(outcome));
        }
        Ok(())
    }
}
