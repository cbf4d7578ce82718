// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Clock and sleep abstraction for stage timers and time-based operators.

pub mod impls;
pub mod runtime;
pub mod timer;

#[cfg(feature = "runtime-tokio")]
pub use impls::tokio::{TokioRuntime, TokioTimer};

/// Runtime used by the engine when none is chosen explicitly.
#[cfg(feature = "runtime-tokio")]
pub type DefaultRuntime = TokioRuntime;

/// Timer of the [`DefaultRuntime`].
#[cfg(feature = "runtime-tokio")]
pub type DefaultTimer = <DefaultRuntime as runtime::Runtime>::Timer;
