// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::context::StageContext;
use crate::logic::StageLogic;
use crate::shape::UniformFanInShape;
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// Merge `n` inlets into one outlet.
///
/// Every inlet is pulled eagerly. Elements are forwarded in the order their
/// inlets became ready, one per downstream pull.
///
/// # Behavior
///
/// - Completes when all inlets have completed and every buffered element was
///   emitted
/// - With [`eager`](Self::eager), the first completing inlet cancels the others
///   and the stage completes once the already received elements are emitted
/// - Downstream cancellation cancels every inlet
/// - The first upstream failure fails the stage
pub struct Merge<T> {
    inputs: usize,
    eager_complete: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Merge<T> {
    /// Merge completing when all `inputs` have completed.
    #[must_use]
    pub const fn new(inputs: usize) -> Self {
        Self {
            inputs,
            eager_complete: false,
            _marker: PhantomData,
        }
    }

    /// Merge completing as soon as one of `inputs` completes.
    #[must_use]
    pub const fn eager(inputs: usize) -> Self {
        Self {
            inputs,
            eager_complete: true,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for Merge<T> {
    type Shape = UniformFanInShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        UniformFanInShape::new(self.inputs)
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("merge")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = MergeLogic {
            shape: self.shape(),
            eager_complete: self.eager_complete,
            running: self.inputs,
            ready: VecDeque::with_capacity(self.inputs),
            draining: false,
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct MergeLogic<T> {
    shape: UniformFanInShape<T, T>,
    eager_complete: bool,
    running: usize,
    /// Inlets holding an element, in order of arrival.
    ready: VecDeque<usize>,
    /// No further elements are requested.
    draining: bool,
}

impl<T: Send + 'static> MergeLogic<T> {
    fn forward(&mut self, ctx: &mut StageContext<'_>, index: usize) -> Result<()> {
        let inlet = self.shape.inlets[index];
        let element = ctx.grab(inlet)?;
        ctx.push(self.shape.out, element)?;
        if !self.draining {
            ctx.try_pull(inlet)?;
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        (self.draining || self.running == 0) && self.ready.is_empty()
    }
}

impl<T: Send + 'static> StageLogic for MergeLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.shape.inlets.is_empty() {
            return ctx.complete_stage();
        }
        for inlet in self.shape.inlets.clone() {
            ctx.pull(inlet)?;
        }
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        if self.ready.is_empty() && ctx.is_available(self.shape.out) {
            return self.forward(ctx, inlet);
        }
        self.ready.push_back(inlet);
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(index) = self.ready.pop_front() {
            self.forward(ctx, index)?;
        }
        if self.finished() {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        self.running = self.running.saturating_sub(1);
        if self.eager_complete && !self.draining {
            self.draining = true;
            for (index, port) in self.shape.inlets.clone().into_iter().enumerate() {
                if index != inlet && !self.ready.contains(&index) {
                    ctx.cancel(port)?;
                }
            }
        }
        if self.finished() {
            return ctx.complete_stage();
        }
        Ok(())
    }
}
