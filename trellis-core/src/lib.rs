//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis incremental DOM
//! rendering engine. It implements:
//!
//! - Reactive primitives (Snaps, Views and Vars)
//! - A cooperative scheduler, cancellable `Async` computations and a
//!   coalescing mailbox
//! - A Doc tree with dynamic attributes, templates and a reconciler that
//!   patches only what changed, with enter/exit/change animations
//!
//! Everything runs on a single thread. The DOM and the event loop are
//! in-memory stand-ins (`dom` and `concurrency::host`) driven by a virtual
//! clock, so rendering is deterministic and measurable.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Snap, View and Var
//! - `concurrency`: host event loop, scheduler, `Async`, cancellation, mailbox
//! - `dom`: the in-memory document
//! - `anim`: animations and transitions
//! - `doc`: Docs, attributes, templates and the reconciler
//! - `config`: engine configuration
//!
//! Logging goes through `tracing`; the crate never installs a subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{concurrency::host, dom, Attr, Doc, Var, View};
//!
//! let count = Var::create(0);
//! let label = count.view().map(|n| format!("clicked {n} times"));
//!
//! let button = Doc::element(
//!     "button",
//!     Attr::handler("click", {
//!         let count = count.clone();
//!         move |_| {
//!             let count = count.clone();
//!             move |_: &dom::Event| { let _ = count.update(|n| n + 1); }
//!         }
//!     }),
//!     [Doc::text_view(label)],
//! );
//!
//! Doc::run(&dom::body(), button);
//! host::run_until_idle();
//! ```

pub mod anim;
pub mod concurrency;
pub mod config;
pub mod doc;
pub mod dom;
pub mod error;
pub mod reactive;

pub use anim::{Anim, Animation, Trans};
pub use concurrency::{Async, CancellationToken, Mailbox};
pub use config::EngineConfig;
pub use doc::{Attr, Doc, RunState, Template, TemplateHole};
pub use error::{Error, Result};
pub use reactive::{Snap, Var, View};
