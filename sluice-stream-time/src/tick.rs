// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{Attributes, Result, StreamError};
use sluice_stream::{
    CallbackSlot, GraphStage, Source, SourceShape, StageContext, StageLogic, TimerKey,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TICK_TIMER: TimerKey = 0;

/// Source emitting `element` after `initial_delay` and then every `interval`.
///
/// Ticks that find no downstream demand are dropped rather than queued. The
/// materialized [`TickHandle`] stops the source, which then completes.
///
/// # Examples
///
/// ```
/// use sluice_stream::prelude::*;
/// use sluice_stream_time::tick;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let ticks = tick(Duration::ZERO, Duration::from_millis(10), "tick")
///     .take(3)
///     .run_with(Sink::seq(), &Materializer::new()?)?
///     .await?;
///
/// assert_eq!(ticks, vec!["tick"; 3]);
/// # Ok(())
/// # }
/// ```
pub fn tick<T>(initial_delay: Duration, interval: Duration, element: T) -> Source<T, TickHandle>
where
    T: Clone + Send + Sync + 'static,
{
    Source::from_graph_stage(Tick {
        initial_delay,
        interval,
        element,
    })
}

/// Handle stopping a [`tick`] source.
#[derive(Debug, Clone)]
pub struct TickHandle {
    slot: CallbackSlot<StopTicking>,
    cancelled: Arc<AtomicBool>,
}

impl TickHandle {
    /// Stop the source. Returns `true` for the call that actually stopped it.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.slot.invoke(StopTicking);
        true
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct StopTicking;

struct Tick<T> {
    initial_delay: Duration,
    interval: Duration,
    element: T,
}

impl<T> GraphStage for Tick<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Shape = SourceShape<T>;
    type Mat = TickHandle;

    fn shape(&self) -> Self::Shape {
        SourceShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("tick")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, TickHandle)> {
        let handle = TickHandle {
            slot: CallbackSlot::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        let logic = TickLogic {
            shape: self.shape(),
            initial_delay: self.initial_delay,
            interval: self.interval,
            element: self.element.clone(),
            slot: handle.slot.clone(),
        };
        Ok((Box::new(logic), handle))
    }
}

struct TickLogic<T> {
    shape: SourceShape<T>,
    initial_delay: Duration,
    interval: Duration,
    element: T,
    slot: CallbackSlot<StopTicking>,
}

impl<T: Clone + Send + Sync + 'static> StageLogic for TickLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.slot.bind(ctx.async_callback());
        ctx.schedule_repeatedly(TICK_TIMER, self.initial_delay, self.interval);
        Ok(())
    }

    fn on_pull(&mut self, _ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        if ctx.is_available(self.shape.out) {
            ctx.push(self.shape.out, self.element.clone())?;
        }
        Ok(())
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, _event: Box<dyn Any + Send>) -> Result<()> {
        ctx.complete_stage()
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        self.slot.close();
    }
}
