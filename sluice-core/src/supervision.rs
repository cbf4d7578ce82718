// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Supervision directives and deciders.
//!
//! When a stage callback fails, the interpreter asks the stage's [`Decider`] what
//! to do with the error:
//!
//! - [`Directive::Resume`] drops the offending element and keeps the stage state
//! - [`Directive::Restart`] drops the offending element and resets the stage state
//! - [`Directive::Stop`] fails the stage, which cascades through the graph
//!
//! Protocol violations never reach a decider.
//!
//! # Example
//!
//! ```
//! use sluice_core::supervision::{self, Directive};
//! use sluice_core::StreamError;
//!
//! let decider = supervision::decider(|error: &StreamError| match error {
//!     StreamError::UserError(_) => Directive::Resume,
//!     _ => Directive::Stop,
//! });
//!
//! assert_eq!(decider(&StreamError::stream_error("boom")), Directive::Stop);
//! ```

use crate::StreamError;
use std::sync::Arc;

/// What to do with a failing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Drop the failing element and continue with the current state.
    Resume,
    /// Drop the failing element, reset the stage state and continue.
    Restart,
    /// Fail the stage.
    Stop,
}

/// Shared supervision policy consulted for every stage-local error.
pub type Decider = Arc<dyn Fn(&StreamError) -> Directive + Send + Sync>;

/// Build a [`Decider`] from a closure.
pub fn decider<F>(f: F) -> Decider
where
    F: Fn(&StreamError) -> Directive + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Decider that stops on every error. This is the default.
pub fn stopping_decider() -> Decider {
    decider(|_| Directive::Stop)
}

/// Decider that resumes on every error.
pub fn resuming_decider() -> Decider {
    decider(|_| Directive::Resume)
}

/// Decider that restarts on every error.
pub fn restarting_decider() -> Decider {
    decider(|_| Directive::Restart)
}
