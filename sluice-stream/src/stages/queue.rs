// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Push-style entry into and pull-style exit from a running stream.
//!
//! [`SourceQueue`] is the materialized value of `Source::queue`: elements are
//! offered from outside and buffered with an [`OverflowStrategy`].
//! [`SinkQueue`] is the materialized value of `Sink::queue`: every
//! [`pull`](SinkQueue::pull) requests exactly one element from upstream.

use super::{sink_stage, source_stage};
use crate::async_callback::CallbackSlot;
use crate::context::StageContext;
use crate::dsl::{Sink, Source};
use crate::logging::debug;
use crate::logic::{downcast_event, StageLogic};
use crate::shape::{SinkShape, SourceShape};
use futures::channel::oneshot;
use futures::Stream;
use parking_lot::Mutex;
use sluice_core::{Attributes, OverflowStrategy, Result, StreamError};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Outcome of [`SourceQueue::offer`].
#[derive(Debug, Clone)]
pub enum QueueOfferResult {
    /// The element was accepted into the stream.
    Enqueued,
    /// The element was dropped by the overflow strategy.
    Dropped,
    /// The stream failed; the element was not accepted.
    Failure(StreamError),
    /// The stream has completed or was cancelled.
    QueueClosed,
}

impl QueueOfferResult {
    /// Whether the element was accepted.
    #[must_use]
    pub const fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued)
    }
}

enum SourceCommand<T> {
    Offer(T, oneshot::Sender<QueueOfferResult>),
    Complete,
    Fail(StreamError),
}

/// Handle for offering elements to a materialized `Source::queue`.
pub struct SourceQueue<T> {
    slot: CallbackSlot<SourceCommand<T>>,
}

impl<T: Send + 'static> SourceQueue<T> {
    /// Offer `element`, resolving once the queue accepted, dropped or refused it.
    ///
    /// With [`OverflowStrategy::Backpressure`] the returned future stays pending
    /// while the buffer is full.
    pub async fn offer(&self, element: T) -> QueueOfferResult {
        let (reply, result) = oneshot::channel();
        if self.slot.invoke(SourceCommand::Offer(element, reply)).is_err() {
            return QueueOfferResult::QueueClosed;
        }
        result.await.unwrap_or(QueueOfferResult::QueueClosed)
    }

    /// Complete the stream once the buffered elements are delivered.
    pub fn complete(&self) {
        let _ = self.slot.invoke(SourceCommand::Complete);
    }

    /// Fail the stream with `error`, discarding buffered elements.
    pub fn fail(&self, error: StreamError) {
        let _ = self.slot.invoke(SourceCommand::Fail(error));
    }
}

impl<T> Clone for SourceQueue<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> fmt::Debug for SourceQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceQueue").finish_non_exhaustive()
    }
}

struct SourceQueueLogic<T> {
    shape: SourceShape<T>,
    capacity: usize,
    strategy: OverflowStrategy,
    slot: CallbackSlot<SourceCommand<T>>,
    buffer: VecDeque<T>,
    waiting: VecDeque<(T, oneshot::Sender<QueueOfferResult>)>,
    completing: bool,
}

impl<T: Send + 'static> SourceQueueLogic<T> {
    fn offer(
        &mut self,
        ctx: &mut StageContext<'_>,
        element: T,
        reply: oneshot::Sender<QueueOfferResult>,
    ) -> Result<()> {
        if self.completing {
            let _ = reply.send(QueueOfferResult::QueueClosed);
            return Ok(());
        }
        if self.buffer.is_empty() && ctx.is_available(self.shape.out) {
            let _ = reply.send(QueueOfferResult::Enqueued);
            return ctx.push(self.shape.out, element);
        }
        if self.buffer.len() < self.capacity {
            self.buffer.push_back(element);
            let _ = reply.send(QueueOfferResult::Enqueued);
            return Ok(());
        }

        let outcome = match self.strategy {
            OverflowStrategy::Backpressure => {
                self.waiting.push_back((element, reply));
                return Ok(());
            }
            OverflowStrategy::DropHead => {
                self.buffer.pop_front();
                self.buffer.push_back(element);
                QueueOfferResult::Enqueued
            }
            OverflowStrategy::DropTail => {
                self.buffer.pop_back();
                self.buffer.push_back(element);
                QueueOfferResult::Enqueued
            }
            OverflowStrategy::DropBuffer => {
                self.buffer.clear();
                self.buffer.push_back(element);
                QueueOfferResult::Enqueued
            }
            OverflowStrategy::DropNew => QueueOfferResult::Dropped,
            OverflowStrategy::Fail => {
                let error = StreamError::buffer_overflow(self.capacity);
                let _ = reply.send(QueueOfferResult::Failure(error.clone()));
                return ctx.fail_stage(error);
            }
        };
        let _ = reply.send(outcome);
        Ok(())
    }

    fn refill(&mut self) {
        while self.buffer.len() < self.capacity {
            let Some((element, reply)) = self.waiting.pop_front() else {
                break;
            };
            self.buffer.push_back(element);
            let _ = reply.send(QueueOfferResult::Enqueued);
        }
    }

    fn drained(&self) -> bool {
        self.buffer.is_empty() && self.waiting.is_empty()
    }

    fn reject_waiting(&mut self, result: &QueueOfferResult) {
        for (_, reply) in self.waiting.drain(..) {
            let _ = reply.send(result.clone());
        }
    }
}

impl<T: Send + 'static> StageLogic for SourceQueueLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.slot.bind(ctx.async_callback());
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(element) = self.buffer.pop_front() {
            ctx.push(self.shape.out, element)?;
        } else if let Some((element, reply)) = self.waiting.pop_front() {
            let _ = reply.send(QueueOfferResult::Enqueued);
            ctx.push(self.shape.out, element)?;
        }
        self.refill();
        if self.completing && self.drained() {
            ctx.complete_stage()?;
        }
        Ok(())
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.reject_waiting(&QueueOfferResult::QueueClosed);
        ctx.complete_stage()
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<SourceCommand<T>>(event)? {
            SourceCommand::Offer(element, reply) => self.offer(ctx, element, reply),
            SourceCommand::Complete => {
                self.completing = true;
                if self.drained() {
                    ctx.complete_stage()?;
                }
                Ok(())
            }
            SourceCommand::Fail(error) => {
                debug!("{}: failed through its queue: {}", ctx.stage_name(), error);
                self.reject_waiting(&QueueOfferResult::Failure(error.clone()));
                ctx.fail_stage(error)
            }
        }
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        self.slot.close();
        self.reject_waiting(&QueueOfferResult::QueueClosed);
    }
}

pub(crate) fn source_queue<T: Send + 'static>(
    capacity: usize,
    strategy: OverflowStrategy,
) -> Source<T, SourceQueue<T>> {
    source_stage("queue_source", move |_: &Attributes| {
        let slot = CallbackSlot::new();
        let logic = SourceQueueLogic {
            shape: SourceShape::<T>::new(),
            capacity,
            strategy,
            slot: slot.clone(),
            buffer: VecDeque::with_capacity(capacity),
            waiting: VecDeque::new(),
            completing: false,
        };
        Ok((
            Box::new(logic) as Box<dyn StageLogic>,
            SourceQueue { slot },
        ))
    })
}

enum SinkCommand<T> {
    Pull(oneshot::Sender<Result<Option<T>>>),
    Cancel,
}

/// How the stream behind a [`SinkQueue`] ended.
type Terminal = Arc<Mutex<Option<Result<()>>>>;

/// Handle for pulling elements out of a materialized `Sink::queue`.
pub struct SinkQueue<T> {
    slot: CallbackSlot<SinkCommand<T>>,
    terminal: Terminal,
}

impl<T: Send + 'static> SinkQueue<T> {
    /// Request and await the next element.
    ///
    /// Resolves with `Ok(None)` once the stream has completed.
    ///
    /// # Errors
    /// The error the stream failed with.
    pub async fn pull(&self) -> Result<Option<T>> {
        let (reply, result) = oneshot::channel();
        if self.slot.invoke(SinkCommand::Pull(reply)).is_err() {
            return self.terminal_result();
        }
        match result.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => self.terminal_result(),
        }
    }

    /// Cancel the stream. Pending and later pulls resolve with `Ok(None)`.
    pub fn cancel(&self) {
        let _ = self.slot.invoke(SinkCommand::Cancel);
    }

    /// Pull elements until the stream ends, ending with the failure if any.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send {
        async_stream::stream! {
            loop {
                match self.pull().await {
                    Ok(Some(element)) => yield Ok(element),
                    Ok(None) => break,
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                }
            }
        }
    }

    fn terminal_result(&self) -> Result<Option<T>> {
        match &*self.terminal.lock() {
            Some(Ok(())) => Ok(None),
            Some(Err(error)) => Err(error.clone()),
            None => Err(StreamError::abrupt_termination(
                "queue sink stopped without completing",
            )),
        }
    }
}

impl<T> fmt::Debug for SinkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkQueue").finish_non_exhaustive()
    }
}

struct SinkQueueLogic<T> {
    shape: SinkShape<T>,
    slot: CallbackSlot<SinkCommand<T>>,
    terminal: Terminal,
    requests: VecDeque<oneshot::Sender<Result<Option<T>>>>,
}

impl<T: Send + 'static> SinkQueueLogic<T> {
    fn finish(&mut self, outcome: Result<()>) {
        for reply in self.requests.drain(..) {
            let _ = reply.send(outcome.clone().map(|()| None));
        }
        let mut terminal = self.terminal.lock();
        if terminal.is_none() {
            *terminal = Some(outcome);
        }
    }
}

impl<T: Send + 'static> StageLogic for SinkQueueLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.slot.bind(ctx.async_callback());
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if let Some(reply) = self.requests.pop_front() {
            let _ = reply.send(Ok(Some(element)));
        }
        if !self.requests.is_empty() {
            ctx.pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.finish(Ok(()));
        ctx.complete_stage()
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        self.finish(Err(error.clone()));
        ctx.fail_stage(error)
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<SinkCommand<T>>(event)? {
            SinkCommand::Pull(reply) => {
                self.requests.push_back(reply);
                ctx.try_pull(self.shape.inlet)
            }
            SinkCommand::Cancel => {
                self.finish(Ok(()));
                ctx.complete_stage()
            }
        }
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        self.slot.close();
        let outcome = abort_cause.map_or(Ok(()), |cause| Err(cause.clone()));
        self.finish(outcome);
    }
}

pub(crate) fn sink_queue<T: Send + 'static>() -> Sink<T, SinkQueue<T>> {
    sink_stage("queue_sink", |_: &Attributes| {
        let slot = CallbackSlot::new();
        let terminal = Terminal::default();
        let logic = SinkQueueLogic {
            shape: SinkShape::<T>::new(),
            slot: slot.clone(),
            terminal: Arc::clone(&terminal),
            requests: VecDeque::new(),
        };
        Ok((
            Box::new(logic) as Box<dyn StageLogic>,
            SinkQueue { slot, terminal },
        ))
    })
}
