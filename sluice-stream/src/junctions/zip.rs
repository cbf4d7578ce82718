// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::context::StageContext;
use crate::logic::StageLogic;
use crate::shape::{FanInShape2, UniformFanInShape};
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result};
use std::marker::PhantomData;
use std::sync::Arc;

/// Combine one element from each of two inlets with `f`.
///
/// Both inlets are pulled when downstream signals demand. The stage completes
/// as soon as an inlet completes without an element waiting on it.
pub struct ZipWith<A, B, O, F> {
    combine: Arc<F>,
    _marker: PhantomData<fn(A, B) -> O>,
}

impl<A, B, O, F> ZipWith<A, B, O, F>
where
    F: Fn(A, B) -> O + Send + Sync + 'static,
{
    /// Zip combining elements with `combine`.
    pub fn new(combine: F) -> Self {
        Self {
            combine: Arc::new(combine),
            _marker: PhantomData,
        }
    }
}

impl<A, B, O, F> GraphStage for ZipWith<A, B, O, F>
where
    A: Send + 'static,
    B: Send + 'static,
    O: Send + 'static,
    F: Fn(A, B) -> O + Send + Sync + 'static,
{
    type Shape = FanInShape2<A, B, O>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FanInShape2::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("zip_with")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = ZipWithLogic {
            shape: self.shape(),
            combine: Arc::clone(&self.combine),
        };
        Ok((Box::new(logic), NotUsed))
    }
}

/// Pair up elements of two inlets.
pub struct Zip<A, B> {
    _marker: PhantomData<fn() -> (A, B)>,
}

impl<A, B> Zip<A, B> {
    /// Zip emitting `(a, b)` pairs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<A, B> Default for Zip<A, B> {
    fn default() -> Self {
        Self::new()
    }
}

fn pair<A, B>(a: A, b: B) -> (A, B) {
    (a, b)
}

impl<A: Send + 'static, B: Send + 'static> GraphStage for Zip<A, B> {
    type Shape = FanInShape2<A, B, (A, B)>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FanInShape2::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("zip")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = ZipWithLogic {
            shape: self.shape(),
            combine: Arc::new(pair::<A, B> as fn(A, B) -> (A, B)),
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct ZipWithLogic<A, B, O, F> {
    shape: FanInShape2<A, B, O>,
    combine: Arc<F>,
}

impl<A, B, O, F> StageLogic for ZipWithLogic<A, B, O, F>
where
    A: Send + 'static,
    B: Send + 'static,
    O: Send + 'static,
    F: Fn(A, B) -> O + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if !(ctx.is_available(self.shape.in0) && ctx.is_available(self.shape.in1)) {
            return Ok(());
        }
        let a = ctx.grab(self.shape.in0)?;
        let b = ctx.grab(self.shape.in1)?;
        ctx.push(self.shape.out, (self.combine)(a, b))?;
        if ctx.is_closed(self.shape.in0) || ctx.is_closed(self.shape.in1) {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if !ctx.is_available(self.shape.in0) {
            ctx.try_pull(self.shape.in0)?;
        }
        if !ctx.is_available(self.shape.in1) {
            ctx.try_pull(self.shape.in1)?;
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        let waiting = if inlet == self.shape.in0.index() {
            ctx.is_available(self.shape.in0)
        } else {
            ctx.is_available(self.shape.in1)
        };
        if waiting {
            return Ok(());
        }
        ctx.complete_stage()
    }
}

/// Combine one element from each of `n` inlets into a vector, in inlet order.
pub struct ZipN<T> {
    inputs: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ZipN<T> {
    /// Zip over `inputs` inlets.
    #[must_use]
    pub const fn new(inputs: usize) -> Self {
        Self {
            inputs,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> GraphStage for ZipN<T> {
    type Shape = UniformFanInShape<T, Vec<T>>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        UniformFanInShape::new(self.inputs)
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("zip_n")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        Ok((Box::new(ZipNLogic { shape: self.shape() }), NotUsed))
    }
}

struct ZipNLogic<T> {
    shape: UniformFanInShape<T, Vec<T>>,
}

impl<T: Send + 'static> StageLogic for ZipNLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.shape.inlets.is_empty() {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        if !self.shape.inlets.iter().all(|&inlet| ctx.is_available(inlet)) {
            return Ok(());
        }
        let mut round = Vec::with_capacity(self.shape.inlets.len());
        for &inlet in &self.shape.inlets {
            round.push(ctx.grab(inlet)?);
        }
        ctx.push(self.shape.out, round)?;
        if self.shape.inlets.iter().any(|&inlet| ctx.is_closed(inlet)) {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        for &inlet in &self.shape.inlets {
            if !ctx.is_available(inlet) {
                ctx.try_pull(inlet)?;
            }
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, inlet: usize) -> Result<()> {
        if ctx.is_available(self.shape.inlets[inlet]) {
            return Ok(());
        }
        ctx.complete_stage()
    }
}

