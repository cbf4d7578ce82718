// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::context::StageContext;
use crate::logic::StageLogic;
use crate::port::{Inlet, Outlet};
use crate::shape::{FanOutShape2, FanOutShape3};
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result};
use std::marker::PhantomData;
use std::sync::Arc;

/// Pull upstream once every outlet that has not cancelled has demand.
fn pull_when_all_ready<I>(ctx: &mut StageContext<'_>, inlet: Inlet<I>, ready: &[bool]) -> Result<()> {
    if ready.iter().all(|&ready| ready) {
        ctx.try_pull(inlet)?;
    }
    Ok(())
}

fn ready<T>(ctx: &StageContext<'_>, outlet: Outlet<T>) -> bool {
    ctx.is_closed(outlet) || ctx.is_available(outlet)
}

fn push_open<T>(ctx: &mut StageContext<'_>, outlet: Outlet<T>, element: T) -> Result<()>
where
    T: Send + 'static,
{
    if ctx.is_closed(outlet) {
        return Ok(());
    }
    ctx.push(outlet, element)
}

/// Split every element into two projections, one per outlet.
///
/// Upstream is pulled only when all outlets that have not cancelled signal
/// demand. The stage cancels upstream once every outlet has cancelled.
pub struct UnzipWith2<I, A, B, F> {
    split: Arc<F>,
    _marker: PhantomData<fn(I) -> (A, B)>,
}

impl<I, A, B, F> UnzipWith2<I, A, B, F>
where
    F: Fn(I) -> (A, B) + Send + Sync + 'static,
{
    /// Unzip projecting elements with `split`.
    pub fn new(split: F) -> Self {
        Self {
            split: Arc::new(split),
            _marker: PhantomData,
        }
    }
}

impl<I, A, B, F> GraphStage for UnzipWith2<I, A, B, F>
where
    I: Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(I) -> (A, B) + Send + Sync + 'static,
{
    type Shape = FanOutShape2<I, A, B>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FanOutShape2::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("unzip_with")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = Unzip2Logic {
            shape: self.shape(),
            split: Arc::clone(&self.split),
        };
        Ok((Box::new(logic), NotUsed))
    }
}

/// Split `(A, B)` pairs over two outlets.
pub struct Unzip<A, B> {
    _marker: PhantomData<fn() -> (A, B)>,
}

impl<A, B> Unzip<A, B> {
    /// Unzip of pairs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<A, B> Default for Unzip<A, B> {
    fn default() -> Self {
        Self::new()
    }
}

fn unpair<A, B>(pair: (A, B)) -> (A, B) {
    pair
}

impl<A: Send + 'static, B: Send + 'static> GraphStage for Unzip<A, B> {
    type Shape = FanOutShape2<(A, B), A, B>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FanOutShape2::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("unzip")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = Unzip2Logic {
            shape: self.shape(),
            split: Arc::new(unpair::<A, B> as fn((A, B)) -> (A, B)),
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct Unzip2Logic<I, A, B, F> {
    shape: FanOutShape2<I, A, B>,
    split: Arc<F>,
}

impl<I, A, B, F> Unzip2Logic<I, A, B, F>
where
    I: Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
{
    fn all_cancelled(&self, ctx: &StageContext<'_>) -> bool {
        ctx.is_closed(self.shape.out0) && ctx.is_closed(self.shape.out1)
    }

    fn pull_if_ready(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let outlets = [ready(ctx, self.shape.out0), ready(ctx, self.shape.out1)];
        pull_when_all_ready(ctx, self.shape.inlet, &outlets)
    }
}

impl<I, A, B, F> StageLogic for Unzip2Logic<I, A, B, F>
where
    I: Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(I) -> (A, B) + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let (a, b) = (self.split)(element);
        push_open(ctx, self.shape.out0, a)?;
        push_open(ctx, self.shape.out1, b)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.pull_if_ready(ctx)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if self.all_cancelled(ctx) {
            return ctx.complete_stage();
        }
        self.pull_if_ready(ctx)
    }
}

/// Split every element into three projections, one per outlet.
pub struct UnzipWith3<I, A, B, C, F> {
    split: Arc<F>,
    _marker: PhantomData<fn(I) -> (A, B, C)>,
}

impl<I, A, B, C, F> UnzipWith3<I, A, B, C, F>
where
    F: Fn(I) -> (A, B, C) + Send + Sync + 'static,
{
    /// Unzip projecting elements with `split`.
    pub fn new(split: F) -> Self {
        Self {
            split: Arc::new(split),
            _marker: PhantomData,
        }
    }
}

impl<I, A, B, C, F> GraphStage for UnzipWith3<I, A, B, C, F>
where
    I: Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    F: Fn(I) -> (A, B, C) + Send + Sync + 'static,
{
    type Shape = FanOutShape3<I, A, B, C>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FanOutShape3::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("unzip_with3")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = Unzip3Logic {
            shape: self.shape(),
            split: Arc::clone(&self.split),
        };
        Ok((Box::new(logic), NotUsed))
    }
}

struct Unzip3Logic<I, A, B, C, F> {
    shape: FanOutShape3<I, A, B, C>,
    split: Arc<F>,
}

impl<I, A, B, C, F> Unzip3Logic<I, A, B, C, F>
where
    I: Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    fn all_cancelled(&self, ctx: &StageContext<'_>) -> bool {
        ctx.is_closed(self.shape.out0)
            && ctx.is_closed(self.shape.out1)
            && ctx.is_closed(self.shape.out2)
    }

    fn pull_if_ready(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let outlets = [
            ready(ctx, self.shape.out0),
            ready(ctx, self.shape.out1),
            ready(ctx, self.shape.out2),
        ];
        pull_when_all_ready(ctx, self.shape.inlet, &outlets)
    }
}

impl<I, A, B, C, F> StageLogic for Unzip3Logic<I, A, B, C, F>
where
    I: Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    F: Fn(I) -> (A, B, C) + Send + Sync + 'static,
{
    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let (a, b, c) = (self.split)(element);
        push_open(ctx, self.shape.out0, a)?;
        push_open(ctx, self.shape.out1, b)?;
        push_open(ctx, self.shape.out2, c)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.pull_if_ready(ctx)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if self.all_cancelled(ctx) {
            return ctx.complete_stage();
        }
        self.pull_if_ready(ctx)
    }
}
