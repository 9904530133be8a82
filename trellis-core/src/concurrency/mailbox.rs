//! One-at-a-time message processor.
//!
//! A [`Mailbox`] runs an asynchronous processor for each posted message, but
//! never two at once. A message posted while the processor is busy is parked;
//! posting again while one is parked replaces it. When the running job ends
//! the parked message (if any) is processed next, otherwise the mailbox goes
//! idle.
//!
//! The reconciler posts one unit message per invalidation, so a burst of Var
//! writes during an animated patch collapses into a single follow-up patch.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::Error;

use super::task::{Async, AsyncBody, Outcome};
use super::CancellationToken;

/// Lifecycle of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxState {
    Idle,
    Running,
    RunningWithPending,
}

enum Slot<M> {
    Idle,
    Running,
    Pending(M),
}

struct Inner<M> {
    slot: RefCell<Slot<M>>,
    processor: Box<dyn Fn(M) -> Async<()>>,
}

pub struct Mailbox<M>(Rc<Inner<M>>);

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<M: 'static> Mailbox<M> {
    pub fn new(processor: impl Fn(M) -> Async<()> + 'static) -> Self {
        Self(Rc::new(Inner {
            slot: RefCell::new(Slot::Idle),
            processor: Box::new(processor),
        }))
    }

    pub fn state(&self) -> MailboxState {
        match &*self.0.slot.borrow() {
            Slot::Idle => MailboxState::Idle,
            Slot::Running => MailboxState::Running,
            Slot::Pending(_) => MailboxState::RunningWithPending,
        }
    }

    /// Hand a message to the processor, or park it if a job is running.
    pub fn post(&self, msg: M) {
        let start_now = {
            let mut slot = self.0.slot.borrow_mut();
            if matches!(*slot, Slot::Idle) {
                *slot = Slot::Running;
                Some(msg)
            } else {
                *slot = Slot::Pending(msg);
                None
            }
        };
        if let Some(msg) = start_now {
            self.work(msg);
        }
    }

    fn work(&self, msg: M) {
        let job = match panic::catch_unwind(AssertUnwindSafe(|| (self.0.processor)(msg))) {
            Ok(job) => job.catch(),
            Err(payload) => Async::ret(Err(Error::from_panic(payload))),
        };
        let this = self.clone();
        job.run(AsyncBody::new(CancellationToken::new(), move |outcome| {
            match outcome {
                Outcome::Ok(Err(e)) | Outcome::Err(e) => {
                    tracing::error!(error = %e, "mailbox processor failed");
                }
                Outcome::Cancelled => tracing::debug!("mailbox processor cancelled"),
                Outcome::Ok(Ok(())) => {}
            }
            this.finish();
        }));
    }

    fn finish(&self) {
        let next = {
            let mut slot = self.0.slot.borrow_mut();
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Pending(msg) => {
                    *slot = Slot::Running;
                    Some(msg)
                }
                Slot::Running | Slot::Idle => None,
            }
        };
        if let Some(msg) = next {
            self.work(msg);
        }
    }
}

impl<M> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.0.slot.borrow() {
            Slot::Idle => MailboxState::Idle,
            Slot::Running => MailboxState::Running,
            Slot::Pending(_) => MailboxState::RunningWithPending,
        };
        f.debug_struct("Mailbox").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::host;
    use std::cell::Cell;

    #[test]
    fn posts_during_a_job_coalesce_to_the_latest() {
        host::run_until_idle();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mailbox = Mailbox::new(move |n: u32| {
            let log = Rc::clone(&log);
            Async::sleep(10.0).map(move |_| log.borrow_mut().push(n))
        });

        mailbox.post(1);
        assert_eq!(mailbox.state(), MailboxState::Running);
        mailbox.post(2);
        mailbox.post(3);
        assert_eq!(mailbox.state(), MailboxState::RunningWithPending);

        host::run_until_idle();
        assert_eq!(*seen.borrow(), vec![1, 3]);
        assert_eq!(mailbox.state(), MailboxState::Idle);
    }

    #[test]
    fn failing_processor_does_not_wedge() {
        host::run_until_idle();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mailbox = Mailbox::new(move |_: ()| {
            counter.set(counter.get() + 1);
            Async::fail(Error::failed("patch failed"))
        });

        mailbox.post(());
        host::run_until_idle();
        mailbox.post(());
        host::run_until_idle();

        assert_eq!(calls.get(), 2);
        assert_eq!(mailbox.state(), MailboxState::Idle);
    }

    #[test]
    fn panicking_processor_does_not_wedge() {
        host::run_until_idle();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mailbox = Mailbox::new(move |_: ()| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                panic!("processor failed to build its job");
            }
            Async::ret(())
        });

        mailbox.post(());
        host::run_until_idle();
        assert_eq!(mailbox.state(), MailboxState::Idle);

        mailbox.post(());
        host::run_until_idle();
        assert_eq!(calls.get(), 2);
        assert_eq!(mailbox.state(), MailboxState::Idle);
    }
}
