//! Cooperative Scheduler
//!
//! A single FIFO queue of actions, drained by host timers.
//!
//! # Algorithm
//!
//! 1. `fork` appends an action to the queue.
//! 2. If the scheduler was idle, a zero-delay timer is armed to start a
//!    drain pass.
//! 3. A drain pass runs queued actions one at a time, in order.
//! 4. After each action the pass checks the elapsed time. Once more than
//!    the configured budget has passed, it arms another zero-delay timer and
//!    returns control to the host.
//! 5. When the queue is empty the scheduler goes idle.
//!
//! Actions forked while a pass is running join the same queue and may run in
//! the same pass. Neither a burst of updates nor a deep dependency graph can
//! hold the thread for much longer than one budget.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::config;
use crate::error::Error;

use super::host;

/// Counters describing scheduler activity on this thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Drain passes started.
    pub passes: u64,
    /// Actions executed.
    pub executed: u64,
    /// Passes that ended because the time budget ran out.
    pub yields: u64,
}

/// Round-robin action queue.
pub struct Scheduler {
    idle: Cell<bool>,
    robin: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    stats: Cell<SchedulerStats>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            idle: Cell::new(true),
            robin: RefCell::new(VecDeque::new()),
            stats: Cell::new(SchedulerStats::default()),
        }
    }

    /// Queue an action and make sure a drain pass is coming.
    pub fn fork(self: &Rc<Self>, action: Box<dyn FnOnce()>) {
        self.robin.borrow_mut().push_back(action);
        if self.idle.replace(false) {
            self.arm();
        }
    }

    fn arm(self: &Rc<Self>) {
        let this = Rc::clone(self);
        host::set_timeout(0.0, Box::new(move || this.tick()));
    }

    fn tick(self: &Rc<Self>) {
        let start = host::now();
        let budget = config::current().scheduler_budget_ms;
        self.bump(|s| s.passes += 1);

        loop {
            let next = self.robin.borrow_mut().pop_front();
            let Some(action) = next else {
                self.idle.set(true);
                break;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                let error = Error::from_panic(payload);
                tracing::error!(%error, "scheduled action panicked");
            }
            self.bump(|s| s.executed += 1);

            let elapsed = host::now() - start;
            if elapsed > budget {
                tracing::trace!(
                    elapsed_ms = elapsed,
                    queued = self.queued(),
                    "scheduler budget spent; yielding to host"
                );
                self.bump(|s| s.yields += 1);
                self.arm();
                break;
            }
        }
    }

    fn bump(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Number of actions waiting to run.
    pub fn queued(&self) -> usize {
        self.robin.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.idle.get()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.get()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static SCHEDULER: Rc<Scheduler> = Rc::new(Scheduler::new());
}

/// This thread's scheduler.
pub fn scheduler() -> Rc<Scheduler> {
    SCHEDULER.with(Rc::clone)
}

/// Queue an action on this thread's scheduler.
pub fn fork(action: impl FnOnce() + 'static) {
    scheduler().fork(Box::new(action));
}

/// Activity counters of this thread's scheduler.
pub fn stats() -> SchedulerStats {
    scheduler().stats()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_defers_until_host_runs() {
        host::run_until_idle();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();

        fork(move || ran_clone.set(true));
        assert!(!ran.get());

        host::run_until_idle();
        assert!(ran.get());
        assert!(scheduler().is_idle());
    }

    #[test]
    fn actions_run_in_fork_order() {
        host::run_until_idle();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..10 {
            let log = log.clone();
            fork(move || log.borrow_mut().push(i));
        }
        host::run_until_idle();
        assert_eq!(*log.borrow(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn nested_forks_join_the_queue() {
        host::run_until_idle();
        let log = Rc::new(RefCell::new(Vec::new()));

        let outer = log.clone();
        fork(move || {
            outer.borrow_mut().push("outer");
            let inner = outer.clone();
            fork(move || inner.borrow_mut().push("nested"));
        });
        let second = log.clone();
        fork(move || second.borrow_mut().push("second"));

        host::run_until_idle();
        assert_eq!(*log.borrow(), vec!["outer", "second", "nested"]);
    }

    #[test]
    fn standalone_scheduler_counts_work() {
        host::run_until_idle();
        let sched = Rc::new(Scheduler::new());
        for _ in 0..3 {
            sched.fork(Box::new(|| {}));
        }
        assert_eq!(sched.queued(), 3);

        host::run_until_idle();
        let stats = sched.stats();
        assert_eq!(stats.executed, 3);
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.yields, 0);
    }

    #[test]
    fn panicking_action_does_not_stall_the_queue() {
        host::run_until_idle();
        let log = Rc::new(RefCell::new(Vec::new()));
        let before = log.clone();
        fork(move || before.borrow_mut().push("before"));
        fork(|| panic!("action failed"));
        let after = log.clone();
        fork(move || after.borrow_mut().push("after"));
        host::run_until_idle();

        assert_eq!(*log.borrow(), vec!["before", "after"]);
        assert!(scheduler().is_idle());

        let later = log.clone();
        fork(move || later.borrow_mut().push("later"));
        host::run_until_idle();
        assert_eq!(log.borrow().last().copied(), Some("later"));
    }
}
