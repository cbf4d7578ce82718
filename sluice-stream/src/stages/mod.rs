// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Built-in stages behind the `Source`, `Flow` and `Sink` operators.

pub(crate) mod aggregate;
pub(crate) mod buffer;
pub(crate) mod flatten;
pub(crate) mod limit;
pub(crate) mod map_async;
pub mod queue;
pub mod reactive;
pub mod resource;
pub(crate) mod simple;
pub(crate) mod sinks;
pub(crate) mod sources;
pub mod substream;
pub(crate) mod termination;

use crate::dsl::{Flow, Sink, Source};
use crate::logic::StageLogic;
use crate::shape::{FlowShape, Shape, SinkShape, SourceShape};
use crate::stage::GraphStage;
use sluice_core::{Attributes, NotUsed, Result};
use std::marker::PhantomData;

/// Stage whose logic and materialized value come from a factory closure.
pub(crate) struct LogicStage<S, M, F> {
    name: &'static str,
    shape: S,
    factory: F,
    _mat: PhantomData<fn() -> M>,
}

impl<S, M, F> LogicStage<S, M, F> {
    pub(crate) const fn new(name: &'static str, shape: S, factory: F) -> Self {
        Self {
            name,
            shape,
            factory,
            _mat: PhantomData,
        }
    }
}

impl<S, M, F> GraphStage for LogicStage<S, M, F>
where
    S: Shape,
    M: Send + 'static,
    F: Fn(&Attributes) -> Result<(Box<dyn StageLogic>, M)> + Send + Sync + 'static,
{
    type Shape = S;
    type Mat = M;

    fn shape(&self) -> S {
        self.shape.clone()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name(self.name)
    }

    fn create_logic(&self, attributes: &Attributes) -> Result<(Box<dyn StageLogic>, M)> {
        (self.factory)(attributes)
    }
}

/// One-in one-out stage without a materialized value.
pub(crate) fn flow_stage<I, O, L, F>(name: &'static str, factory: F) -> Flow<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    L: StageLogic,
    F: Fn() -> L + Send + Sync + 'static,
{
    Flow::from_graph_stage(LogicStage::new(
        name,
        FlowShape::new(),
        move |_: &Attributes| Ok((Box::new(factory()) as Box<dyn StageLogic>, NotUsed)),
    ))
}

/// One-in one-out stage with a materialized value.
pub(crate) fn flow_stage_mat<I, O, M, F>(name: &'static str, factory: F) -> Flow<I, O, M>
where
    I: Send + 'static,
    O: Send + 'static,
    M: Send + 'static,
    F: Fn(&Attributes) -> Result<(Box<dyn StageLogic>, M)> + Send + Sync + 'static,
{
    Flow::from_graph_stage(LogicStage::new(name, FlowShape::new(), factory))
}

/// Single-outlet stage.
pub(crate) fn source_stage<O, M, F>(name: &'static str, factory: F) -> Source<O, M>
where
    O: Send + 'static,
    M: Send + 'static,
    F: Fn(&Attributes) -> Result<(Box<dyn StageLogic>, M)> + Send + Sync + 'static,
{
    Source::from_graph_stage(LogicStage::new(name, SourceShape::new(), factory))
}

/// Single-inlet stage.
pub(crate) fn sink_stage<I, M, F>(name: &'static str, factory: F) -> Sink<I, M>
where
    I: Send + 'static,
    M: Send + 'static,
    F: Fn(&Attributes) -> Result<(Box<dyn StageLogic>, M)> + Send + Sync + 'static,
{
    Sink::from_graph_stage(LogicStage::new(name, SinkShape::new(), factory))
}
