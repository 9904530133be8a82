//! Cooperative concurrency: the host event loop, the action scheduler, and
//! the asynchronous computation type built on them.

pub mod cancel;
pub mod host;
pub mod mailbox;
pub mod scheduler;
pub mod task;

pub use cancel::{CancellationToken, Registration};
pub use host::{FrameId, Host, TimerId, VirtualHost};
pub use mailbox::{Mailbox, MailboxState};
pub use scheduler::{fork, Scheduler, SchedulerStats};
pub use task::{Async, AsyncBody, Outcome, Resolver};
