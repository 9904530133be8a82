//! Error types for the engine.
//!
//! Errors fall into three groups:
//!
//! - Programmer misuse (mounting into a missing element, writing to a
//!   finalized Var, settling a continuation twice). These are returned
//!   immediately and never swallowed.
//! - Asynchronous failures, which travel on the error channel of an
//!   [`Async`](crate::concurrency::Async) computation.
//! - Configuration problems when loading an [`EngineConfig`](crate::config::EngineConfig).
//!
//! Snap and View internals never fail on their own.

use std::any::Any;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid id: no element with id `{id}` exists")]
    MountTargetNotFound { id: String },

    #[error("var {var_id} has been finalized as a constant and cannot be set")]
    VarIsConstant { var_id: u64 },

    #[error("a continuation provided by Async::from_continuations was invoked multiple times")]
    ContinuationInvokedTwice,

    #[error("asynchronous computation panicked: {message}")]
    Panicked { message: String },

    #[error("{message}")]
    Failed { message: String },

    #[error("IO error when reading `{path}`: {message}")]
    ConfigIo { path: PathBuf, message: String },

    #[error("config parsing error: {0}")]
    ConfigParse(String),

    #[error("config validation error: {0}")]
    ConfigValidation(String),
}

impl Error {
    /// A plain asynchronous failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Convert a panic payload caught by the scheduler into an error.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
