// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::context::StageContext;
use crate::logic::StageLogic;
use crate::shape::UniformFanInShape;
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Emit all elements of inlet 0, then of inlet 1, and so on.
///
/// Only the inlet currently being drained is pulled; later inlets that
/// complete early are skipped when their turn comes. A later inlet that fails
/// early fails the stage only once every inlet before it has been drained.
pub struct Concat<T> {
    inputs: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Concat<T> {
    /// Concatenation of `inputs` inlets.
    #[must_use]
    pub const fn new(inputs: usize) -> Self {
        Self {
            inputs,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for Concat<T> {
    type Shape = UniformFanInShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        UniformFanInShape::new(self.inputs)
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("concat")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = ConcatLogic {
            shape: self.shape(),
            current: 0,
            failures: HashMap::new(),
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct ConcatLogic<T> {
    shape: UniformFanInShape<T, T>,
    current: usize,
    /// Failures of inlets whose turn has not come yet.
    failures: HashMap<usize, StreamError>,
}

impl<T: Send + 'static> ConcatLogic<T> {
    /// Move to the next inlet that is still open; completes the stage when none
    /// is left.
    fn advance(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        while let Some(&inlet) = self.shape.inlets.get(self.current) {
            if let Some(error) = self.failures.remove(&self.current) {
                return ctx.fail_stage(error);
            }
            if !ctx.is_closed(inlet) {
                if ctx.is_available(self.shape.out) {
                    ctx.try_pull(inlet)?;
                }
                return Ok(());
            }
            self.current += 1;
        }
        ctx.complete_stage()
    }
}

impl<T: Send + 'static> StageLogic for ConcatLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.shape.inlets.is_empty() {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlets[inlet])?;
        ctx.push(self.shape.out, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.advance(ctx)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        if inlet == self.current {
            self.current += 1;
            return self.advance(ctx);
        }
        Ok(())
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        if inlet == self.current {
            return ctx.fail_stage(error);
        }
        self.failures.insert(inlet, error);
        Ok(())
    }
}
