// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Dynamic fan-out.
//!
//! The hub is a sink whose materialized value is a [`Source`]. Every
//! materialization of that source attaches a consumer. Elements are kept in a
//! bounded buffer until every attached consumer has taken them, so the slowest
//! consumer backpressures the hub. While no consumer is attached the hub does
//! not pull at all.
//!
//! A consumer receives the elements offered after it attached. Completion and
//! failure of the hub reach every consumer, including those attaching after the
//! hub stopped.

use crate::logging::debug;
use parking_lot::Mutex;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use sluice_stream::{
    downcast_event, AsyncCallback, CallbackSlot, GraphStage, Sink, SinkShape, Source, SourceShape,
    StageContext, StageLogic,
};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Factory for broadcast hub sinks.
///
/// # Examples
///
/// ```
/// use sluice_hub::BroadcastHub;
/// use sluice_stream::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let materializer = Materializer::new()?;
/// let (queue, consumers) = Source::queue(8, OverflowStrategy::Backpressure)
///     .to_mat(BroadcastHub::sink(8), Keep::both)
///     .run_with(&materializer)?;
///
/// let first = consumers.clone().run_with(Sink::seq(), &materializer)?;
/// let second = consumers.run_with(Sink::seq(), &materializer)?;
/// # tokio::time::sleep(std::time::Duration::from_millis(50)).await;
///
/// for n in 1..=3 {
///     assert!(queue.offer(n).await.is_enqueued());
/// }
/// queue.complete();
///
/// assert_eq!(first.await?, vec![1, 2, 3]);
/// assert_eq!(second.await?, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BroadcastHub;

impl BroadcastHub {
    /// Hub sink buffering up to `buffer` elements not yet taken by every
    /// consumer.
    #[must_use]
    pub fn sink<T: Clone + Send + 'static>(buffer: usize) -> Sink<T, Source<T>> {
        Sink::from_graph_stage(BroadcastHubStage {
            capacity: buffer.max(1),
            _marker: PhantomData,
        })
    }
}

/// Consumer to hub.
enum HubCommand<T> {
    Attach(u64, AsyncCallback<ConsumerEvent<T>>),
    Demand(u64),
    Detach(u64),
}

/// Hub to consumer.
enum ConsumerEvent<T> {
    Element(T),
    Complete,
    Failed(StreamError),
}

/// How the hub ended; written once before the command slot closes.
type Terminal = Arc<Mutex<Option<Result<()>>>>;

struct BroadcastHubStage<T> {
    capacity: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T: Clone + Send + 'static> GraphStage for BroadcastHubStage<T> {
    type Shape = SinkShape<T>;
    type Mat = Source<T>;

    fn shape(&self) -> Self::Shape {
        SinkShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("broadcast_hub")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, Source<T>)> {
        let slot = CallbackSlot::new();
        let terminal = Terminal::default();
        let consumers = Source::from_graph_stage(ConsumerStage {
            slot: slot.clone(),
            terminal: Arc::clone(&terminal),
            next_id: Arc::new(AtomicU64::new(0)),
        });
        let logic = BroadcastHubLogic {
            shape: self.shape(),
            capacity: self.capacity,
            slot,
            terminal,
            buffer: VecDeque::with_capacity(self.capacity),
            head_seq: 0,
            consumers: HashMap::new(),
            finished: false,
        };
        Ok((Box::new(logic), consumers))
    }
}

struct Consumer<T> {
    callback: AsyncCallback<ConsumerEvent<T>>,
    /// Sequence number of the next element this consumer receives.
    next: u64,
    demand: usize,
}

struct BroadcastHubLogic<T> {
    shape: SinkShape<T>,
    capacity: usize,
    slot: CallbackSlot<HubCommand<T>>,
    terminal: Terminal,
    buffer: VecDeque<T>,
    /// Sequence number of `buffer[0]`.
    head_seq: u64,
    consumers: HashMap<u64, Consumer<T>>,
    finished: bool,
}

impl<T: Clone + Send + 'static> BroadcastHubLogic<T> {
    fn tail_seq(&self) -> u64 {
        self.head_seq + self.buffer.len() as u64
    }

    /// Serve demand, drop what everyone has taken, finish caught-up consumers
    /// and pull when there is room.
    fn dispatch(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let tail = self.tail_seq();
        for consumer in self.consumers.values_mut() {
            while consumer.demand > 0 && consumer.next < tail {
                let index = usize::try_from(consumer.next - self.head_seq).map_err(|_| {
                    StreamError::protocol_violation("broadcast hub consumer lost its position")
                })?;
                if let Some(element) = self.buffer.get(index) {
                    consumer.callback.invoke(ConsumerEvent::Element(element.clone()));
                }
                consumer.next += 1;
                consumer.demand -= 1;
            }
        }

        let slowest = self
            .consumers
            .values()
            .map(|consumer| consumer.next)
            .min()
            .unwrap_or(tail);
        while self.head_seq < slowest && self.buffer.pop_front().is_some() {
            self.head_seq += 1;
        }

        if self.finished {
            self.consumers.retain(|_, consumer| {
                if consumer.next < tail {
                    return true;
                }
                consumer.callback.invoke(ConsumerEvent::Complete);
                false
            });
            if self.consumers.is_empty() {
                return ctx.complete_stage();
            }
            return Ok(());
        }

        if !self.consumers.is_empty()
            && self.buffer.len() < self.capacity
            && !ctx.has_been_pulled(self.shape.inlet)
            && !ctx.is_closed(self.shape.inlet)
        {
            ctx.pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<T: Clone + Send + 'static> StageLogic for BroadcastHubLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.set_keep_going(true);
        self.slot.bind(ctx.async_callback());
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        self.buffer.push_back(element);
        self.dispatch(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        debug!("broadcast hub completed with {} consumers", self.consumers.len());
        *self.terminal.lock() = Some(Ok(()));
        self.finished = true;
        if self.consumers.is_empty() {
            self.buffer.clear();
        }
        self.dispatch(ctx)
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        debug!("broadcast hub failed with {} consumers", self.consumers.len());
        *self.terminal.lock() = Some(Err(error.clone()));
        for (_, consumer) in self.consumers.drain() {
            consumer.callback.invoke(ConsumerEvent::Failed(error.clone()));
        }
        self.buffer.clear();
        ctx.fail_stage(error)
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<HubCommand<T>>(event)? {
            HubCommand::Attach(id, callback) => {
                debug!("broadcast hub consumer {} attached", id);
                let next = self.tail_seq();
                self.consumers.insert(
                    id,
                    Consumer {
                        callback,
                        next,
                        demand: 0,
                    },
                );
            }
            HubCommand::Demand(id) => {
                if let Some(consumer) = self.consumers.get_mut(&id) {
                    consumer.demand += 1;
                }
            }
            HubCommand::Detach(id) => {
                debug!("broadcast hub consumer {} detached", id);
                self.consumers.remove(&id);
            }
        }
        self.dispatch(ctx)
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        let outcome = {
            let mut terminal = self.terminal.lock();
            terminal
                .get_or_insert_with(|| {
                    Err(abort_cause.cloned().unwrap_or_else(|| {
                        StreamError::abrupt_termination("broadcast hub stopped")
                    }))
                })
                .clone()
        };
        self.slot.close();
        for (_, consumer) in self.consumers.drain() {
            let event = match &outcome {
                Ok(()) => ConsumerEvent::Complete,
                Err(error) => ConsumerEvent::Failed(error.clone()),
            };
            consumer.callback.invoke(event);
        }
    }
}

struct ConsumerStage<T> {
    slot: CallbackSlot<HubCommand<T>>,
    terminal: Terminal,
    next_id: Arc<AtomicU64>,
}

impl<T: Clone + Send + 'static> GraphStage for ConsumerStage<T> {
    type Shape = SourceShape<T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        SourceShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("broadcast_hub_consumer")
    }

    fn create_logic(
        &self,
        _attributes: &Attributes,
    ) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = ConsumerLogic {
            shape: self.shape(),
            slot: self.slot.clone(),
            terminal: Arc::clone(&self.terminal),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            attached: false,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct ConsumerLogic<T> {
    shape: SourceShape<T>,
    slot: CallbackSlot<HubCommand<T>>,
    terminal: Terminal,
    id: u64,
    attached: bool,
}

impl<T: Clone + Send + 'static> ConsumerLogic<T> {
    /// The hub is gone; end the way it ended.
    fn follow_terminal(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.attached = false;
        let outcome = self.terminal.lock().clone();
        match outcome {
            Some(Ok(())) => ctx.complete_stage(),
            Some(Err(error)) => ctx.fail_stage(error),
            None => ctx.fail_stage(StreamError::abrupt_termination("broadcast hub stopped")),
        }
    }
}

impl<T: Clone + Send + 'static> StageLogic for ConsumerLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        match self
            .slot
            .invoke(HubCommand::Attach(self.id, ctx.async_callback()))
        {
            Ok(()) => {
                self.attached = true;
                Ok(())
            }
            Err(_) => self.follow_terminal(ctx),
        }
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if self.slot.invoke(HubCommand::Demand(self.id)).is_err() {
            return self.follow_terminal(ctx);
        }
        Ok(())
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<ConsumerEvent<T>>(event)? {
            ConsumerEvent::Element(element) => ctx.push(self.shape.out, element),
            ConsumerEvent::Complete => {
                self.attached = false;
                ctx.complete_stage()
            }
            ConsumerEvent::Failed(error) => {
                self.attached = false;
                ctx.fail_stage(error)
            }
        }
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        if self.attached {
            let _ = self.slot.invoke(HubCommand::Detach(self.id));
        }
    }
}
