// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Stages without inlets that originate elements.

use super::source_stage;
use crate::context::StageContext;
use crate::dsl::Source;
use crate::logic::{downcast_event, StageLogic};
use crate::shape::SourceShape;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

fn boxed<L: StageLogic>(logic: L) -> Result<(Box<dyn StageLogic>, NotUsed)> {
    Ok((Box::new(logic), NotUsed))
}

struct IterLogic<It: Iterator> {
    shape: SourceShape<It::Item>,
    iter: It,
}

impl<It> StageLogic for IterLogic<It>
where
    It: Iterator + Send + 'static,
    It::Item: Send + 'static,
{
    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        match self.iter.next() {
            Some(element) => ctx.push(self.shape.out, element),
            None => ctx.complete_stage(),
        }
    }
}

/// Every materialization iterates its own clone of `iterable`.
pub(crate) fn from_iter<I>(iterable: I) -> Source<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    source_stage("from_iter", move |_: &Attributes| {
        boxed(IterLogic {
            shape: SourceShape::<I::Item>::new(),
            iter: iterable.clone().into_iter(),
        })
    })
}

pub(crate) fn single<T: Clone + Send + Sync + 'static>(element: T) -> Source<T> {
    source_stage("single", move |_: &Attributes| {
        boxed(IterLogic {
            shape: SourceShape::<T>::new(),
            iter: std::iter::once(element.clone()),
        })
    })
}

pub(crate) fn repeat<T: Clone + Send + Sync + 'static>(element: T) -> Source<T> {
    source_stage("repeat", move |_: &Attributes| {
        boxed(IterLogic {
            shape: SourceShape::<T>::new(),
            iter: std::iter::repeat(element.clone()),
        })
    })
}

struct TerminalLogic {
    error: Option<StreamError>,
}

impl StageLogic for TerminalLogic {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        match self.error.take() {
            Some(error) => ctx.fail_stage(error),
            None => ctx.complete_stage(),
        }
    }
}

pub(crate) fn empty<T: Send + 'static>() -> Source<T> {
    source_stage("empty", |_: &Attributes| boxed(TerminalLogic { error: None }))
}

pub(crate) fn failed<T: Send + 'static>(error: StreamError) -> Source<T> {
    source_stage("failed", move |_: &Attributes| {
        boxed(TerminalLogic {
            error: Some(error.clone()),
        })
    })
}

struct FutureLogic<T> {
    shape: SourceShape<T>,
    future: Option<Shared<BoxFuture<'static, Result<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> StageLogic for FutureLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if let Some(future) = self.future.take() {
            ctx.run_future(future);
        }
        Ok(())
    }

    fn on_pull(&mut self, _ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        Ok(())
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<Result<T>>(event)? {
            Ok(element) => {
                ctx.emit(self.shape.out, element)?;
                ctx.complete_stage()
            }
            Err(error) => ctx.fail_stage(error),
        }
    }
}

/// The future is shared: every materialization observes the same outcome.
pub(crate) fn from_future<T, F>(future: F) -> Source<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let shared = future.boxed().shared();
    source_stage("from_future", move |_: &Attributes| {
        boxed(FutureLogic {
            shape: SourceShape::<T>::new(),
            future: Some(shared.clone()),
        })
    })
}

struct UnfoldLogic<S, T, F> {
    shape: SourceShape<T>,
    state: Option<S>,
    f: Arc<F>,
}

impl<S, T, F> StageLogic for UnfoldLogic<S, T, F>
where
    S: Send + 'static,
    T: Send + 'static,
    F: Fn(S) -> Option<(S, T)> + Send + Sync + 'static,
{
    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        let Some(state) = self.state.take() else {
            return ctx.complete_stage();
        };
        match (self.f)(state) {
            Some((next, element)) => {
                self.state = Some(next);
                ctx.push(self.shape.out, element)
            }
            None => ctx.complete_stage(),
        }
    }
}

pub(crate) fn unfold<S, T, F>(seed: S, f: F) -> Source<T>
where
    S: Clone + Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(S) -> Option<(S, T)> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    source_stage("unfold", move |_: &Attributes| {
        boxed(UnfoldLogic {
            shape: SourceShape::<T>::new(),
            state: Some(seed.clone()),
            f: Arc::clone(&f),
        })
    })
}

struct UnfoldAsyncLogic<S, T, F> {
    shape: SourceShape<T>,
    state: Option<S>,
    f: Arc<F>,
}

impl<S, T, F, Fut> StageLogic for UnfoldAsyncLogic<S, T, F>
where
    S: Send + 'static,
    T: Send + 'static,
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<(S, T)>>> + Send + 'static,
{
    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        match self.state.take() {
            Some(state) => {
                ctx.run_future((self.f)(state));
                Ok(())
            }
            None => ctx.complete_stage(),
        }
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<Result<Option<(S, T)>>>(event)? {
            Ok(Some((next, element))) => {
                self.state = Some(next);
                ctx.push(self.shape.out, element)
            }
            Ok(None) => ctx.complete_stage(),
            Err(error) => ctx.fail_stage(error),
        }
    }
}

pub(crate) fn unfold_async<S, T, F, Fut>(seed: S, f: F) -> Source<T>
where
    S: Clone + Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<(S, T)>>> + Send + 'static,
{
    let f = Arc::new(f);
    source_stage("unfold_async", move |_: &Attributes| {
        boxed(UnfoldAsyncLogic {
            shape: SourceShape::<T>::new(),
            state: Some(seed.clone()),
            f: Arc::clone(&f),
        })
    })
}

struct StreamLogic<T> {
    shape: SourceShape<T>,
    stream: Option<BoxStream<'static, T>>,
}

impl<T: Send + 'static> StageLogic for StreamLogic<T> {
    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            ctx.run_future(async move {
                let next = stream.next().await;
                (stream, next)
            });
        }
        Ok(())
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        let (stream, next) = downcast_event::<(BoxStream<'static, T>, Option<T>)>(event)?;
        match next {
            Some(element) => {
                self.stream = Some(stream);
                ctx.push(self.shape.out, element)
            }
            None => ctx.complete_stage(),
        }
    }
}

/// A `futures::Stream` can be consumed only once, so the source can only be
/// materialized once; later materializations fail.
pub(crate) fn from_stream<S>(stream: S) -> Source<S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(stream.boxed())));
    source_stage("from_stream", move |_: &Attributes| {
        let stream = slot.lock().take().ok_or_else(|| {
            StreamError::stream_error("a source wrapping a stream can only be materialized once")
        })?;
        boxed(StreamLogic {
            shape: SourceShape::<S::Item>::new(),
            stream: Some(stream),
        })
    })
}
