// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{Attributes, NotUsed, Result};
use sluice_stream::{FlowShape, GraphStage, StageContext, StageLogic, TimerKey};
use std::marker::PhantomData;
use std::time::Duration;

const WINDOW_TIMER: TimerKey = 0;

/// Pass elements during the first `window` after start, then complete and
/// cancel upstream.
pub struct TakeWithin<T> {
    window: Duration,
    _marker: PhantomData<fn(T)>,
}

impl<T> TakeWithin<T> {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for TakeWithin<T> {
    type Shape = FlowShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("take_within")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = WindowLogic {
            shape: self.shape(),
            window: self.window,
            open: true,
            take: true,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

/// Drop elements arriving during the first `window` after start.
pub struct DropWithin<T> {
    window: Duration,
    _marker: PhantomData<fn(T)>,
}

impl<T> DropWithin<T> {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for DropWithin<T> {
    type Shape = FlowShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("drop_within")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = WindowLogic {
            shape: self.shape(),
            window: self.window,
            open: false,
            take: false,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

/// Shared logic: `take` completes when the window ends, otherwise the window
/// ending opens the gate.
struct WindowLogic<T> {
    shape: FlowShape<T, T>,
    window: Duration,
    open: bool,
    take: bool,
}

impl<T: Send + 'static> StageLogic for WindowLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.schedule_once(WINDOW_TIMER, self.window);
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.open {
            return ctx.push(self.shape.outlet, element);
        }
        ctx.pull(self.shape.inlet)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        if self.take {
            return ctx.complete_stage();
        }
        self.open = true;
        Ok(())
    }
}
