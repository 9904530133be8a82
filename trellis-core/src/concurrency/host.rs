//! Host Event Loop
//!
//! The engine never blocks and never spawns threads. Everything that must
//! happen "later" goes through three host services, the same ones a browser
//! exposes to scripts:
//!
//! - a millisecond clock (`now`)
//! - zero-or-more-delay timers (`set_timeout` / `clear_timeout`)
//! - animation frames (`request_animation_frame` / `cancel_animation_frame`)
//!
//! These are abstracted behind the [`Host`] trait. Each thread starts with a
//! [`VirtualHost`]: a deterministic simulated event loop whose clock only
//! moves when the loop is driven. Embedders with a real event loop install
//! their own implementation with [`install`].
//!
//! # Driving the Virtual Host
//!
//! ```rust,ignore
//! use trellis_core::concurrency::host;
//!
//! host::set_timeout(10.0, Box::new(|| println!("later")));
//! host::run_until_idle(); // fires the timer, clock is now 10ms later
//! ```
//!
//! Timers fire in due order (ties in registration order). Animation frames
//! fire every `frame_interval_ms` of virtual time; all callbacks registered
//! before a frame starts receive that frame's timestamp.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config;

/// Identifier of a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Identifier of a pending animation frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

/// Event loop services consumed by the engine.
pub trait Host {
    /// Current time in milliseconds.
    fn now(&self) -> f64;

    /// Run `callback` once, no earlier than `delay_ms` from now.
    fn set_timeout(&self, delay_ms: f64, callback: Box<dyn FnOnce()>) -> TimerId;

    /// Cancel a pending timer. Unknown ids are ignored.
    fn clear_timeout(&self, id: TimerId);

    /// Run `callback` with the frame timestamp at the next animation frame.
    fn request_animation_frame(&self, callback: Box<dyn FnOnce(f64)>) -> FrameId;

    /// Cancel a pending frame request. Unknown ids are ignored.
    fn cancel_animation_frame(&self, id: FrameId);
}

struct Timer {
    id: u64,
    due: f64,
    callback: Box<dyn FnOnce()>,
}

/// Deterministic single-threaded event loop with a virtual clock.
pub struct VirtualHost {
    now: Cell<f64>,
    next_id: Cell<u64>,
    timers: RefCell<Vec<Timer>>,
    frames: RefCell<Vec<(u64, Box<dyn FnOnce(f64)>)>>,
    last_frame: Cell<Option<f64>>,
}

/// Upper bound on events processed by one `run_until_idle` call.
const MAX_EVENTS_PER_RUN: usize = 1_000_000;

enum Next {
    Timer,
    Frame(f64),
}

impl VirtualHost {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0.0),
            next_id: Cell::new(0),
            timers: RefCell::new(Vec::new()),
            frames: RefCell::new(Vec::new()),
            last_frame: Cell::new(None),
        }
    }

    fn fresh_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Move the clock forward without firing anything.
    ///
    /// Tasks use this to simulate work that takes time.
    pub fn advance(&self, ms: f64) {
        if ms > 0.0 {
            self.now.set(self.now.get() + ms);
        }
    }

    /// Number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    fn next_frame_time(&self) -> f64 {
        let interval = config::current().frame_interval_ms;
        match self.last_frame.get() {
            Some(last) => (last + interval).max(self.now.get()),
            None => self.now.get() + interval,
        }
    }

    fn pick_next(&self) -> Option<Next> {
        let earliest_timer = self
            .timers
            .borrow()
            .iter()
            .map(|t| t.due)
            .fold(None, |acc: Option<f64>, due| match acc {
                Some(best) if best <= due => Some(best),
                _ => Some(due),
            });
        let frame = if self.frames.borrow().is_empty() {
            None
        } else {
            Some(self.next_frame_time())
        };
        match (earliest_timer, frame) {
            (None, None) => None,
            (Some(_), None) => Some(Next::Timer),
            (None, Some(at)) => Some(Next::Frame(at)),
            (Some(due), Some(at)) if due <= at => Some(Next::Timer),
            (Some(_), Some(at)) => Some(Next::Frame(at)),
        }
    }

    fn fire_timer(&self) {
        let timer = {
            let mut timers = self.timers.borrow_mut();
            let index = timers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
                .map(|(i, _)| i);
            match index {
                Some(i) => timers.remove(i),
                None => return,
            }
        };
        if timer.due > self.now.get() {
            self.now.set(timer.due);
        }
        (timer.callback)();
    }

    fn fire_frame(&self, at: f64) {
        let callbacks = std::mem::take(&mut *self.frames.borrow_mut());
        self.now.set(at);
        self.last_frame.set(Some(at));
        for (_, callback) in callbacks {
            callback(at);
        }
    }

    /// Fire the next due event. Returns false when nothing is pending.
    pub fn step(&self) -> bool {
        match self.pick_next() {
            None => false,
            Some(Next::Timer) => {
                self.fire_timer();
                true
            }
            Some(Next::Frame(at)) => {
                self.fire_frame(at);
                true
            }
        }
    }

    /// Fire timers and frames until nothing is pending.
    ///
    /// Returns the number of events processed.
    pub fn run_until_idle(&self) -> usize {
        let mut processed = 0;
        while self.step() {
            processed += 1;
            if processed >= MAX_EVENTS_PER_RUN {
                tracing::warn!(processed, "virtual host still busy; giving up on idle");
                break;
            }
        }
        processed
    }

    /// Fire every event due within the next `ms` milliseconds, then set the
    /// clock to exactly that point.
    pub fn run_for(&self, ms: f64) -> usize {
        let deadline = self.now.get() + ms;
        let mut processed = 0;
        loop {
            let due = match self.pick_next() {
                None => break,
                Some(Next::Frame(at)) => at,
                Some(Next::Timer) => self
                    .timers
                    .borrow()
                    .iter()
                    .map(|t| t.due)
                    .fold(f64::INFINITY, f64::min),
            };
            if due > deadline || !self.step() {
                break;
            }
            processed += 1;
        }
        if self.now.get() < deadline {
            self.now.set(deadline);
        }
        processed
    }
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for VirtualHost {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn set_timeout(&self, delay_ms: f64, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = self.fresh_id();
        let due = self.now.get() + delay_ms.max(0.0);
        self.timers.borrow_mut().push(Timer { id, due, callback });
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|t| t.id != id.0);
    }

    fn request_animation_frame(&self, callback: Box<dyn FnOnce(f64)>) -> FrameId {
        let id = self.fresh_id();
        self.frames.borrow_mut().push((id, callback));
        FrameId(id)
    }

    fn cancel_animation_frame(&self, id: FrameId) {
        self.frames.borrow_mut().retain(|(fid, _)| *fid != id.0);
    }
}

thread_local! {
    static VIRTUAL: Rc<VirtualHost> = Rc::new(VirtualHost::new());
    static INSTALLED: RefCell<Option<Rc<dyn Host>>> = const { RefCell::new(None) };
}

/// Replace this thread's host. Pass `None` to return to the virtual host.
pub fn install(host: Option<Rc<dyn Host>>) {
    INSTALLED.with(|slot| *slot.borrow_mut() = host);
}

/// The host serving the current thread.
pub fn current() -> Rc<dyn Host> {
    let installed = INSTALLED.with(|slot| slot.borrow().clone());
    match installed {
        Some(host) => host,
        None => VIRTUAL.with(|v| v.clone() as Rc<dyn Host>),
    }
}

/// This thread's virtual host, whether or not another host is installed.
pub fn virtual_host() -> Rc<VirtualHost> {
    VIRTUAL.with(Rc::clone)
}

pub fn now() -> f64 {
    current().now()
}

pub fn set_timeout(delay_ms: f64, callback: Box<dyn FnOnce()>) -> TimerId {
    current().set_timeout(delay_ms, callback)
}

pub fn clear_timeout(id: TimerId) {
    current().clear_timeout(id)
}

pub fn request_animation_frame(callback: Box<dyn FnOnce(f64)>) -> FrameId {
    current().request_animation_frame(callback)
}

pub fn cancel_animation_frame(id: FrameId) {
    current().cancel_animation_frame(id)
}

/// Drive this thread's virtual host until nothing is pending.
pub fn run_until_idle() -> usize {
    virtual_host().run_until_idle()
}

/// Drive this thread's virtual host for `ms` milliseconds of virtual time.
pub fn run_for(ms: f64) -> usize {
    virtual_host().run_for(ms)
}

/// Advance this thread's virtual clock without firing events.
pub fn advance(ms: f64) {
    virtual_host().advance(ms)
}
