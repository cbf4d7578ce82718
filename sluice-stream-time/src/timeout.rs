// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Pass-through stages that fail with [`StreamError::TimeoutError`] when a
//! deadline passes.

use crate::logging::debug;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use sluice_stream::{FlowShape, GraphStage, StageContext, StageLogic, TimerKey};
use std::marker::PhantomData;
use std::time::Duration;

const TIMEOUT_TIMER: TimerKey = 0;

/// Which deadline a [`Timeout`] stage watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The first element must arrive within the timeout.
    Initial,
    /// Consecutive elements must be at most the timeout apart.
    Idle,
    /// The stream must complete within the timeout.
    Completion,
}

impl TimeoutKind {
    const fn stage_name(self) -> &'static str {
        match self {
            Self::Initial => "initial_timeout",
            Self::Idle => "idle_timeout",
            Self::Completion => "completion_timeout",
        }
    }

    fn describe(self, timeout: Duration) -> String {
        match self {
            Self::Initial => format!("no element within {timeout:?}"),
            Self::Idle => format!("no element for {timeout:?}"),
            Self::Completion => format!("stream did not complete within {timeout:?}"),
        }
    }
}

/// Timeout stage; build it through [`TimeOps`](crate::TimeOps).
pub struct Timeout<T> {
    kind: TimeoutKind,
    timeout: Duration,
    _marker: PhantomData<fn(T)>,
}

impl<T> Timeout<T> {
    /// Watch `kind` with `timeout`.
    #[must_use]
    pub const fn new(kind: TimeoutKind, timeout: Duration) -> Self {
        Self {
            kind,
            timeout,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for Timeout<T> {
    type Shape = FlowShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name(self.kind.stage_name())
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = TimeoutLogic {
            shape: self.shape(),
            kind: self.kind,
            timeout: self.timeout,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct TimeoutLogic<T> {
    shape: FlowShape<T, T>,
    kind: TimeoutKind,
    timeout: Duration,
}

impl<T: Send + 'static> StageLogic for TimeoutLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.schedule_once(TIMEOUT_TIMER, self.timeout);
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        match self.kind {
            TimeoutKind::Initial => ctx.cancel_timer(TIMEOUT_TIMER),
            TimeoutKind::Idle => ctx.schedule_once(TIMEOUT_TIMER, self.timeout),
            TimeoutKind::Completion => {}
        }
        let element = ctx.grab(self.shape.inlet)?;
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        let context = self.kind.describe(self.timeout);
        debug!("{}: {}", ctx.stage_name(), context);
        ctx.fail_stage(StreamError::timeout_error(context))
    }
}
