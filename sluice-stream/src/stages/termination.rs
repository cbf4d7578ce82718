// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::flow_stage_mat;
use crate::completion::{completion, CompletionPromise, StreamCompletion};
use crate::context::StageContext;
use crate::dsl::Flow;
use crate::logic::StageLogic;
use crate::shape::FlowShape;
use sluice_core::{Attributes, Result, StreamError};

/// Pass-through that reports how the stream around it ended: `Ok` on completion
/// or downstream cancellation, the error on failure.
struct WatchTerminationLogic<T> {
    shape: FlowShape<T, T>,
    promise: CompletionPromise<()>,
}

impl<T: Send + 'static> StageLogic for WatchTerminationLogic<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.promise.complete(Ok(()));
        ctx.complete_stage()
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        self.promise.complete(Err(error.clone()));
        ctx.fail_stage(error)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.promise.complete(Ok(()));
        ctx.complete_stage()
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        self.promise.abort(abort_cause);
    }
}

pub(crate) fn watch_termination<T: Send + 'static>() -> Flow<T, T, StreamCompletion<()>> {
    flow_stage_mat("watch_termination", |_: &Attributes| {
        let (promise, completion) = completion();
        let logic = WatchTerminationLogic {
            shape: FlowShape::<T, T>::new(),
            promise,
        };
        Ok((Box::new(logic) as Box<dyn StageLogic>, completion))
    })
}
