//! Animations
//!
//! An [`Anim<T>`] is a value that varies over a fixed duration: a function
//! from elapsed milliseconds to `T`. Running one drives it from animation
//! frames until the elapsed time passes its duration.
//!
//! An [`Animation`] is what the reconciler plays around a patch: an ordered
//! list of actions, each either an `Anim<()>` to play or a finalizer to call
//! once every animation has finished.
//!
//! # Playing
//!
//! 1. All `Play` actions start together, each on its own frame loop.
//! 2. Each loop feeds `compute(t)` to its sink once per frame.
//! 3. When the last loop passes its duration, finalizers run in order.
//!
//! With `animations_enabled` turned off in the configuration, only the
//! finalizers run.

mod easing;
mod trans;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::concurrency::{host, Async, Resolver};
use crate::config;

pub use easing::{DoubleInterpolation, Easing, Interpolation};
pub use trans::{Trans, TransFlags};

/// A value varying over `duration` milliseconds.
pub struct Anim<T> {
    compute: Rc<dyn Fn(f64) -> T>,
    duration: f64,
}

impl<T> Clone for Anim<T> {
    fn clone(&self) -> Self {
        Self {
            compute: Rc::clone(&self.compute),
            duration: self.duration,
        }
    }
}

/// Normalized progress of `t` through `duration`.
fn progress(t: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        1.0
    } else {
        (t / duration).clamp(0.0, 1.0)
    }
}

impl<T: 'static> Anim<T> {
    pub fn new(duration: f64, compute: impl Fn(f64) -> T + 'static) -> Self {
        Self {
            compute: Rc::new(compute),
            duration: duration.max(0.0),
        }
    }

    /// Zero-length animation holding `value`.
    pub fn constant(value: T) -> Self
    where
        T: Clone,
    {
        Self::new(0.0, move |_| value.clone())
    }

    /// Interpolate from `from` to `to` over `duration`.
    pub fn simple(
        interpolation: impl Interpolation<T> + 'static,
        easing: Easing,
        duration: f64,
        from: T,
        to: T,
    ) -> Self {
        Self::new(duration, move |t| {
            let p = easing.transform_time(progress(t, duration));
            interpolation.interpolate(p, &from, &to)
        })
    }

    /// Like [`Anim::simple`], holding `from` for `delay` milliseconds first.
    pub fn delayed(
        interpolation: impl Interpolation<T> + 'static,
        easing: Easing,
        duration: f64,
        delay: f64,
        from: T,
        to: T,
    ) -> Self {
        Self::new(duration + delay, move |t| {
            let p = if t <= delay {
                0.0
            } else {
                easing.transform_time(progress(t - delay, duration))
            };
            interpolation.interpolate(p, &from, &to)
        })
    }

    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> Anim<U> {
        let compute = Rc::clone(&self.compute);
        Anim::new(self.duration, move |t| f(compute(t)))
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn compute(&self, t: f64) -> T {
        (self.compute)(t)
    }

    /// Drive the animation from animation frames, feeding each frame's value
    /// to `sink`. Completes once elapsed time passes the duration.
    pub fn run(&self, sink: impl Fn(T) + 'static) -> Async<()> {
        let anim = self.clone();
        let sink: Rc<dyn Fn(T)> = Rc::new(sink);
        if anim.duration <= 0.0 {
            return Async::from_fn(move || sink(anim.compute(anim.duration)));
        }
        Async::from_continuations(move |resolver| {
            let frames = Rc::new(FrameLoop {
                anim: anim.clone(),
                sink: Rc::clone(&sink),
                resolver,
                start: Cell::new(None),
            });
            frames.schedule();
        })
    }
}

struct FrameLoop<T> {
    anim: Anim<T>,
    sink: Rc<dyn Fn(T)>,
    resolver: Resolver<()>,
    start: Cell<Option<f64>>,
}

impl<T: 'static> FrameLoop<T> {
    fn schedule(self: Rc<Self>) {
        host::request_animation_frame(Box::new(move |now| self.tick(now)));
    }

    fn tick(self: Rc<Self>, now: f64) {
        if self.resolver.token().is_cancelled() {
            if let Err(error) = self.resolver.cancel() {
                tracing::error!(%error, "animation frame loop cancelled twice");
            }
            return;
        }
        let start = match self.start.get() {
            Some(start) => start,
            None => {
                self.start.set(Some(now));
                now
            }
        };
        let elapsed = now - start;
        let duration = self.anim.duration;
        (self.sink)(self.anim.compute(elapsed.min(duration)));
        if elapsed <= duration {
            self.schedule();
        } else if let Err(error) = self.resolver.resolve(()) {
            tracing::error!(%error, "animation frame loop finished twice");
        }
    }
}

impl<T> fmt::Debug for Anim<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anim")
            .field("duration", &self.duration)
            .finish()
    }
}

/// One step of an [`Animation`].
#[derive(Clone)]
pub enum AnimAction {
    Play(Anim<()>),
    Finalize(Rc<dyn Fn()>),
}

/// An ordered collection of animations and finalizers.
#[derive(Clone, Default)]
pub struct Animation {
    actions: Vec<AnimAction>,
}

impl Animation {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap a single animation.
    pub fn pack(anim: Anim<()>) -> Self {
        Self {
            actions: vec![AnimAction::Play(anim)],
        }
    }

    /// Append a finalizer.
    pub fn when_done(mut self, f: impl Fn() + 'static) -> Self {
        self.actions.push(AnimAction::Finalize(Rc::new(f)));
        self
    }

    pub fn append(mut self, other: Animation) -> Self {
        self.actions.extend(other.actions);
        self
    }

    pub fn concat(animations: impl IntoIterator<Item = Animation>) -> Self {
        animations
            .into_iter()
            .fold(Self::empty(), Animation::append)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Longest duration among the `Play` actions.
    pub fn duration(&self) -> f64 {
        self.actions
            .iter()
            .map(|a| match a {
                AnimAction::Play(anim) => anim.duration(),
                AnimAction::Finalize(_) => 0.0,
            })
            .fold(0.0, f64::max)
    }

    /// Play every animation in parallel, then run finalizers in order.
    pub fn play(&self) -> Async<()> {
        let plays: Vec<Anim<()>> = self
            .actions
            .iter()
            .filter_map(|a| match a {
                AnimAction::Play(anim) => Some(anim.clone()),
                AnimAction::Finalize(_) => None,
            })
            .collect();
        let finalizers: Rc<[Rc<dyn Fn()>]> = self
            .actions
            .iter()
            .filter_map(|a| match a {
                AnimAction::Finalize(f) => Some(Rc::clone(f)),
                AnimAction::Play(_) => None,
            })
            .collect();

        Async::delay(move || {
            let finalizers = Rc::clone(&finalizers);
            let finish = move || {
                for f in finalizers.iter() {
                    f();
                }
            };
            if !config::animations_enabled() || plays.is_empty() {
                return Async::from_fn(finish);
            }
            let runs: Vec<Async<()>> = plays.iter().map(|anim| anim.run(|()| {})).collect();
            Async::parallel(runs).map(move |_| finish())
        })
    }
}

impl fmt::Debug for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Animation")
            .field("actions", &self.actions.len())
            .field("duration", &self.duration())
            .finish()
    }
}
