// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Stages without outlets that consume elements.
//!
//! Most sinks materialize a [`StreamCompletion`] resolving with their result once
//! upstream completes, or with the failure that ended the stream.

use super::sink_stage;
use crate::completion::{completion, CompletionPromise, StreamCompletion};
use crate::context::StageContext;
use crate::dsl::Sink;
use crate::logic::StageLogic;
use crate::shape::SinkShape;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use std::sync::Arc;

type Step<S, T> = Arc<dyn Fn(&mut S, T) -> Result<bool> + Send + Sync>;
type Finish<S, R> = Arc<dyn Fn(S) -> Result<R> + Send + Sync>;

/// Accumulates into `state` until `step` returns `false` or upstream completes,
/// then resolves the completion with `finish(state)`.
struct CollectLogic<T, S, R> {
    shape: SinkShape<T>,
    state: Option<S>,
    step: Step<S, T>,
    finish: Finish<S, R>,
    promise: CompletionPromise<R>,
}

impl<T, S, R> CollectLogic<T, S, R>
where
    T: Send + 'static,
    S: Send + 'static,
    R: Send + 'static,
{
    fn resolve(&mut self) {
        let result = match self.state.take() {
            Some(state) => (self.finish)(state),
            None => Err(StreamError::stream_error("sink state already consumed")),
        };
        self.promise.complete(result);
    }
}

impl<T, S, R> StageLogic for CollectLogic<T, S, R>
where
    T: Send + 'static,
    S: Send + 'static,
    R: Send + 'static,
{
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let more = match self.state.as_mut() {
            Some(state) => (self.step)(state, element)?,
            None => false,
        };
        if more {
            return ctx.pull(self.shape.inlet);
        }
        self.resolve();
        ctx.complete_stage()
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.resolve();
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

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        self.promise.abort(abort_cause);
    }
}

fn collecting<T, S, R>(
    name: &'static str,
    seed: impl Fn() -> S + Send + Sync + 'static,
    step: impl Fn(&mut S, T) -> Result<bool> + Send + Sync + 'static,
    finish: impl Fn(S) -> Result<R> + Send + Sync + 'static,
) -> Sink<T, StreamCompletion<R>>
where
    T: Send + 'static,
    S: Send + 'static,
    R: Send + 'static,
{
    let step: Step<S, T> = Arc::new(step);
    let finish: Finish<S, R> = Arc::new(finish);
    sink_stage(name, move |_: &Attributes| {
        let (promise, completion) = completion();
        let logic = CollectLogic {
            shape: SinkShape::<T>::new(),
            state: Some(seed()),
            step: Arc::clone(&step),
            finish: Arc::clone(&finish),
            promise,
        };
        Ok((Box::new(logic) as Box<dyn StageLogic>, completion))
    })
}

pub(crate) fn ignore<T: Send + 'static>() -> Sink<T, StreamCompletion<()>> {
    collecting("ignore", || (), |_, _| Ok(true), |()| Ok(()))
}

pub(crate) fn for_each<T, F>(f: F) -> Sink<T, StreamCompletion<()>>
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    collecting(
        "for_each",
        || (),
        move |_, element| {
            f(element);
            Ok(true)
        },
        |()| Ok(()),
    )
}

pub(crate) fn fold<T, S, F>(seed: S, f: F) -> Sink<T, StreamCompletion<S>>
where
    T: Send + 'static,
    S: Clone + Send + Sync + 'static,
    F: Fn(S, T) -> S + Send + Sync + 'static,
{
    collecting(
        "fold_sink",
        move || seed.clone(),
        move |acc: &mut S, element| {
            *acc = f(acc.clone(), element);
            Ok(true)
        },
        Ok,
    )
}

pub(crate) fn seq<T: Send + 'static>() -> Sink<T, StreamCompletion<Vec<T>>> {
    collecting(
        "seq",
        Vec::new,
        |elements: &mut Vec<T>, element| {
            elements.push(element);
            Ok(true)
        },
        Ok,
    )
}

pub(crate) fn head_option<T: Send + 'static>() -> Sink<T, StreamCompletion<Option<T>>> {
    collecting(
        "head_option",
        || None,
        |first: &mut Option<T>, element| {
            *first = Some(element);
            Ok(false)
        },
        Ok,
    )
}

pub(crate) fn head<T: Send + 'static>() -> Sink<T, StreamCompletion<T>> {
    collecting(
        "head",
        || None,
        |first: &mut Option<T>, element| {
            *first = Some(element);
            Ok(false)
        },
        |first| first.ok_or_else(|| StreamError::empty_stream("head of an empty stream")),
    )
}

pub(crate) fn last_option<T: Send + 'static>() -> Sink<T, StreamCompletion<Option<T>>> {
    collecting(
        "last_option",
        || None,
        |last: &mut Option<T>, element| {
            *last = Some(element);
            Ok(true)
        },
        Ok,
    )
}

pub(crate) fn last<T: Send + 'static>() -> Sink<T, StreamCompletion<T>> {
    collecting(
        "last",
        || None,
        |last: &mut Option<T>, element| {
            *last = Some(element);
            Ok(true)
        },
        |last| last.ok_or_else(|| StreamError::empty_stream("last of an empty stream")),
    )
}

struct CancelledLogic;

impl StageLogic for CancelledLogic {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.complete_stage()
    }
}

pub(crate) fn cancelled<T: Send + 'static>() -> Sink<T, NotUsed> {
    sink_stage("cancelled", |_: &Attributes| {
        Ok((Box::new(CancelledLogic) as Box<dyn StageLogic>, NotUsed))
    })
}

struct OnCompleteLogic<T, F> {
    shape: SinkShape<T>,
    callback: Arc<F>,
    called: bool,
}

impl<T, F> OnCompleteLogic<T, F>
where
    F: Fn(Result<()>) + Send + Sync + 'static,
{
    fn call(&mut self, result: Result<()>) {
        if !self.called {
            self.called = true;
            (self.callback)(result);
        }
    }
}

impl<T, F> StageLogic for OnCompleteLogic<T, F>
where
    T: Send + 'static,
    F: Fn(Result<()>) + Send + Sync + 'static,
{
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let _ = ctx.grab(self.shape.inlet)?;
        ctx.pull(self.shape.inlet)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.call(Ok(()));
        ctx.complete_stage()
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        self.call(Err(error.clone()));
        ctx.fail_stage(error)
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        if let Some(cause) = abort_cause {
            self.call(Err(cause.clone()));
        }
    }
}

pub(crate) fn on_complete<T, F>(callback: F) -> Sink<T, NotUsed>
where
    T: Send + 'static,
    F: Fn(Result<()>) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    sink_stage("on_complete", move |_: &Attributes| {
        let logic = OnCompleteLogic {
            shape: SinkShape::<T>::new(),
            callback: Arc::clone(&callback),
            called: false,
        };
        Ok((Box::new(logic) as Box<dyn StageLogic>, NotUsed))
    })
}
