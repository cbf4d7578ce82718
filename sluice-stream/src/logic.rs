// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Running stage logic.
//!
//! Callbacks are invoked by the island's interpreter, one at a time, and receive a
//! [`StageContext`] through which the stage pulls, grabs, pushes and completes its
//! ports. Returning `Err` hands the error to the stage's supervision decider; see
//! [`sluice_core::supervision`].

use crate::context::StageContext;
use sluice_core::{Result, StreamError};
use std::any::{type_name, Any};

/// Key identifying one of a stage's timers.
pub type TimerKey = u64;

/// Mutable, single-threaded logic of one materialized stage.
pub trait StageLogic: Send + 'static {
    /// Runs once before any other callback.
    fn pre_start(&mut self, _ctx: &mut StageContext<'_>) -> Result<()> {
        Ok(())
    }

    /// An element is available on inlet `inlet`.
    fn on_push(&mut self, _ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        Err(StreamError::protocol_violation(format!(
            "stage received a push on inlet {inlet} but handles none"
        )))
    }

    /// Upstream of `inlet` completed. Defaults to completing the stage.
    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        ctx.complete_stage()
    }

    /// Upstream of `inlet` failed. Defaults to failing the stage with the same
    /// error.
    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        ctx.fail_stage(error)
    }

    /// Downstream of `outlet` asked for one element.
    fn on_pull(&mut self, _ctx: &mut StageContext<'_>, outlet: usize) -> Result<()> {
        Err(StreamError::protocol_violation(format!(
            "stage received a pull on outlet {outlet} but handles none"
        )))
    }

    /// Downstream of `outlet` cancelled. Defaults to completing the stage.
    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.complete_stage()
    }

    /// Timer `key` fired.
    fn on_timer(&mut self, _ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        Ok(())
    }

    /// An async callback was invoked or a future started with
    /// [`StageContext::run_future`] finished.
    fn on_async(&mut self, _ctx: &mut StageContext<'_>, _event: Box<dyn Any + Send>) -> Result<()> {
        Ok(())
    }

    /// Reset internal state after a `Restart` supervision directive.
    fn restart(&mut self) {}

    /// Runs exactly once when the stage stops.
    ///
    /// `abort_cause` is set when the stage did not stop on its own: the region was
    /// aborted, its materializer shut down or its island was dropped. Stages owning
    /// external resources or completions release them here.
    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {}
}

/// Recover the concrete type of an async event.
///
/// # Errors
/// Returns [`StreamError::ProtocolViolation`] when the event is of another type.
pub fn downcast_event<E: Any>(event: Box<dyn Any + Send>) -> Result<E> {
    event.downcast::<E>().map(|event| *event).map_err(|_| {
        StreamError::protocol_violation(format!(
            "async event is not a {}",
            type_name::<E>()
        ))
    })
}
