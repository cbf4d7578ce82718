// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Dynamic fan-in.
//!
//! The hub is a source whose materialized value is a [`Sink`]. Every
//! materialization of that sink becomes a producer feeding the hub. Producers
//! are credit-based: each starts with `per_producer_buffer` credits and spends
//! one per element; the hub hands credits back in batches once a producer's
//! drained count reaches the demand threshold. The hub therefore never holds
//! more than `per_producer_buffer` elements per producer.
//!
//! The hub source does not complete when producers finish. Cancelling it
//! cancels every attached producer, and producers attached afterwards cancel
//! their upstream right away.

use crate::logging::{debug, warn};
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

/// Fraction of the per-producer buffer drained before credits are re-granted.
pub const DEFAULT_DEMAND_THRESHOLD: f64 = 0.5;

/// Factory for merge hub sources.
///
/// # Examples
///
/// ```
/// use sluice_hub::MergeHub;
/// use sluice_stream::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let materializer = Materializer::new()?;
/// let (producer, collected) = MergeHub::source::<u32>(4)
///     .take(6)
///     .to_mat(Sink::seq(), Keep::both)
///     .run_with(&materializer)?;
///
/// Source::from_iter(1..=3).run_with(producer.clone(), &materializer)?;
/// Source::from_iter(4..=6).run_with(producer, &materializer)?;
///
/// let mut all = collected.await?;
/// all.sort_unstable();
/// assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MergeHub;

impl MergeHub {
    /// Hub source granting each producer `per_producer_buffer` credits, with
    /// the default demand threshold.
    #[must_use]
    pub fn source<T: Send + 'static>(per_producer_buffer: usize) -> Source<T, Sink<T>> {
        Self::source_with_threshold(per_producer_buffer, DEFAULT_DEMAND_THRESHOLD)
    }

    /// Hub source re-granting credits once `demand_threshold` (a fraction of
    /// the buffer, clamped to `0.0..=1.0`) of a producer's credits have been
    /// drained.
    #[must_use]
    pub fn source_with_threshold<T: Send + 'static>(
        per_producer_buffer: usize,
        demand_threshold: f64,
    ) -> Source<T, Sink<T>> {
        let buffer = per_producer_buffer.max(1);
        Source::from_graph_stage(MergeHubStage {
            buffer,
            threshold: credit_batch(buffer, demand_threshold),
            _marker: PhantomData,
        })
    }
}

/// Credits granted back in one batch: at least one, at most the whole buffer.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn credit_batch(buffer: usize, fraction: f64) -> usize {
    let fraction = if fraction.is_nan() {
        DEFAULT_DEMAND_THRESHOLD
    } else {
        fraction.clamp(0.0, 1.0)
    };
    ((buffer as f64 * fraction).ceil() as usize).clamp(1, buffer)
}

/// Producer to hub.
enum HubEvent<T> {
    Register(u64, AsyncCallback<ProducerEvent>),
    Element(u64, T),
    Done(u64),
}

/// Hub to producer.
enum ProducerEvent {
    Credit(usize),
    HubClosed,
}

struct MergeHubStage<T> {
    buffer: usize,
    threshold: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + 'static> GraphStage for MergeHubStage<T> {
    type Shape = SourceShape<T>;
    type Mat = Sink<T>;

    fn shape(&self) -> Self::Shape {
        SourceShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("merge_hub")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, Sink<T>)> {
        let slot = CallbackSlot::new();
        let producers = Sink::from_graph_stage(ProducerStage {
            slot: slot.clone(),
            buffer: self.buffer,
            next_id: Arc::new(AtomicU64::new(0)),
            _marker: PhantomData,
        });
        let logic = MergeHubLogic {
            shape: self.shape(),
            threshold: self.threshold,
            slot,
            queue: VecDeque::new(),
            producers: HashMap::new(),
        };
        Ok((Box::new(logic), producers))
    }
}

struct Producer {
    callback: AsyncCallback<ProducerEvent>,
    drained: usize,
}

struct MergeHubLogic<T> {
    shape: SourceShape<T>,
    threshold: usize,
    slot: CallbackSlot<HubEvent<T>>,
    /// Elements not yet demanded, tagged with their producer.
    queue: VecDeque<(u64, T)>,
    producers: HashMap<u64, Producer>,
}

impl<T: Send + 'static> MergeHubLogic<T> {
    fn deliver(&mut self, ctx: &mut StageContext<'_>, id: u64, element: T) -> Result<()> {
        ctx.push(self.shape.out, element)?;
        if let Some(producer) = self.producers.get_mut(&id) {
            producer.drained += 1;
            if producer.drained >= self.threshold {
                producer.callback.invoke(ProducerEvent::Credit(producer.drained));
                producer.drained = 0;
            }
        }
        Ok(())
    }
}

impl<T: Send + 'static> StageLogic for MergeHubLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.slot.bind(ctx.async_callback());
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        match self.queue.pop_front() {
            Some((id, element)) => self.deliver(ctx, id, element),
            None => Ok(()),
        }
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<HubEvent<T>>(event)? {
            HubEvent::Register(id, callback) => {
                debug!("merge hub producer {} attached", id);
                self.producers.insert(id, Producer { callback, drained: 0 });
            }
            HubEvent::Element(id, element) => {
                if self.queue.is_empty() && ctx.is_available(self.shape.out) {
                    self.deliver(ctx, id, element)?;
                } else {
                    self.queue.push_back((id, element));
                }
            }
            HubEvent::Done(id) => {
                debug!("merge hub producer {} detached", id);
                self.producers.remove(&id);
            }
        }
        Ok(())
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        self.slot.close();
        for (_, producer) in self.producers.drain() {
            producer.callback.invoke(ProducerEvent::HubClosed);
        }
    }
}

struct ProducerStage<T> {
    slot: CallbackSlot<HubEvent<T>>,
    buffer: usize,
    next_id: Arc<AtomicU64>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + 'static> GraphStage for ProducerStage<T> {
    type Shape = SinkShape<T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        SinkShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("merge_hub_producer")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = ProducerLogic {
            shape: self.shape(),
            slot: self.slot.clone(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            credits: self.buffer,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct ProducerLogic<T> {
    shape: SinkShape<T>,
    slot: CallbackSlot<HubEvent<T>>,
    id: u64,
    credits: usize,
}

impl<T: Send + 'static> ProducerLogic<T> {
    fn request(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.credits > 0
            && !ctx.has_been_pulled(self.shape.inlet)
            && !ctx.is_closed(self.shape.inlet)
        {
            ctx.pull(self.shape.inlet)?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> StageLogic for ProducerLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self
            .slot
            .invoke(HubEvent::Register(self.id, ctx.async_callback()))
            .is_err()
        {
            debug!("merge hub already stopped, producer {} cancels", self.id);
            return ctx.complete_stage();
        }
        self.request(ctx)
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.slot.invoke(HubEvent::Element(self.id, element)).is_err() {
            return ctx.complete_stage();
        }
        self.credits = self.credits.saturating_sub(1);
        self.request(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        ctx.complete_stage()
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        warn!("merge hub producer {} failed: {}", self.id, error);
        ctx.fail_stage(error)
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<ProducerEvent>(event)? {
            ProducerEvent::Credit(credits) => {
                self.credits += credits;
                self.request(ctx)
            }
            ProducerEvent::HubClosed => ctx.complete_stage(),
        }
    }

    /// Every way out, aborts included, detaches the producer from the hub.
    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        let _ = self.slot.invoke(HubEvent::Done(self.id));
    }
}
