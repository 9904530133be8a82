//! Reactive Primitives
//!
//! This module implements the dataflow layer: Snaps, Views and Vars.
//!
//! # Concepts
//!
//! ## Snaps
//!
//! A [`Snap`] is one version of a value. It is filled at most once and is
//! later obsoleted when an input changes. Obsolescence travels synchronously
//! from a Snap to every Snap derived from it.
//!
//! ## Views
//!
//! A [`View`] produces the current Snap of a value on demand. Combinators
//! (`map`, `map2`, `bind`, `sequence`, ...) build new Views lazily and cache
//! the last Snap they produced until it is obsoleted.
//!
//! ## Vars
//!
//! A [`Var`] is a mutable source. Setting it obsoletes its current Snap and
//! installs a new one; Views over it recompute on their next pull.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded and reference counted. Dependencies are
//! explicit: a View reads its inputs by pulling their Views, and subscribes to
//! their Snaps, rather than through an ambient tracking context.

mod seq;
mod snap;
mod var;
mod view;

pub use snap::{Obsoletable, Snap};
pub use var::Var;
pub use view::View;
