// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Builder for arbitrary topologies.

use super::{Flow, RunnableGraph, Sink, Source};
use crate::graph::Graph;
use crate::mat::{self, MatFn, MatKey, MatSlots, MatValues};
use crate::port::{Inlet, Outlet};
use crate::shape::{FlowShape, Shape};
use crate::stage::GraphStage;
use sluice_core::{NotUsed, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

type ErasedMat = Arc<dyn Fn(&mut MatSlots, usize) -> Result<Box<dyn Any + Send>> + Send + Sync>;

fn erase<M: Send + 'static>(inner: MatFn<M>) -> ErasedMat {
    Arc::new(move |slots, offset| {
        inner(slots, offset).map(|value| Box::new(value) as Box<dyn Any + Send>)
    })
}

/// Assembles stages and blueprints into a graph by wiring typed ports.
///
/// Every `add_*` call returns the added part's open ports, already placed in
/// this builder, and a [`MatKey`] for its materialized value. The `build_*`
/// methods check nothing themselves; unconnected ports, double connections and
/// illegal cycles are reported when the result is materialized.
///
/// # Examples
///
/// ```
/// use sluice_stream::prelude::*;
/// use sluice_stream::junctions::{Broadcast, Merge};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let mut builder = GraphDsl::new();
/// let (source, _) = builder.add_source(Source::from_iter(1..=3));
/// let (fan_out, _) = builder.add_stage(Broadcast::<i32>::new(2));
/// let (fan_in, _) = builder.add_stage(Merge::<i32>::new(2));
/// let (sink, total) = builder.add_sink(Sink::fold(0, |acc, x| acc + x));
///
/// builder.connect(source, fan_out.inlet);
/// builder.connect(fan_out.outlets[0], fan_in.inlets[0]);
/// builder.connect(fan_out.outlets[1], fan_in.inlets[1]);
/// builder.connect(fan_in.out, sink);
///
/// let graph = builder.build_closed_with(move |values| values.take(total));
/// let sum = graph.run_with(&Materializer::new()?)?.await?;
///
/// assert_eq!(sum, 12);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GraphDsl {
    graph: Graph,
    parts: Vec<(usize, ErasedMat)>,
}

impl fmt::Debug for GraphDsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphDsl")
            .field("stages", &self.graph.nodes.len())
            .field("connections", &self.graph.edges.len())
            .field("parts", &self.parts.len())
            .finish()
    }
}

impl GraphDsl {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_part<M: Send + 'static>(&mut self, graph: Graph, mat: MatFn<M>) -> (usize, MatKey<M>) {
        let offset = self.graph.append(graph);
        self.parts.push((offset, erase(mat)));
        (offset, MatKey::new(self.parts.len() - 1))
    }

    /// Add a single stage and return its shape.
    pub fn add_stage<S: GraphStage>(&mut self, stage: S) -> (S::Shape, MatKey<S::Mat>) {
        let shape = stage.shape();
        let (offset, key) = self.add_part(Graph::single(stage), mat::single::<S::Mat>());
        (shape.shifted(offset), key)
    }

    /// Add a source and return its outlet.
    pub fn add_source<T, M>(&mut self, source: Source<T, M>) -> (Outlet<T>, MatKey<M>)
    where
        T: Send + 'static,
        M: Send + 'static,
    {
        let (offset, key) = self.add_part(source.graph, source.mat);
        (source.outlet.shifted(offset), key)
    }

    /// Add a flow and return its ports.
    pub fn add_flow<I, O, M>(&mut self, flow: Flow<I, O, M>) -> (FlowShape<I, O>, MatKey<M>)
    where
        I: Send + 'static,
        O: Send + 'static,
        M: Send + 'static,
    {
        let (offset, key) = self.add_part(flow.graph, flow.mat);
        (
            FlowShape::of(flow.inlet.shifted(offset), flow.outlet.shifted(offset)),
            key,
        )
    }

    /// Add a sink and return its inlet.
    pub fn add_sink<T, M>(&mut self, sink: Sink<T, M>) -> (Inlet<T>, MatKey<M>)
    where
        T: Send + 'static,
        M: Send + 'static,
    {
        let (offset, key) = self.add_part(sink.graph, sink.mat);
        (sink.inlet.shifted(offset), key)
    }

    /// Wire `from` to `to`.
    pub fn connect<T: 'static>(&mut self, from: Outlet<T>, to: Inlet<T>) {
        self.graph.connect(from.info(), to.info());
    }

    fn finish<M, F>(self, f: F) -> (Graph, MatFn<M>)
    where
        M: 'static,
        F: Fn(&mut MatValues) -> Result<M> + Send + Sync + 'static,
    {
        let parts = Arc::new(self.parts);
        let mat: MatFn<M> = Arc::new(move |slots, offset| {
            let values = parts
                .iter()
                .map(|(node, part)| part(slots, offset + node).map(Some))
                .collect::<Result<Vec<_>>>()?;
            f(&mut MatValues::new(values))
        });
        (self.graph, mat)
    }

    /// A closed graph materializing to [`NotUsed`].
    #[must_use]
    pub fn build_closed(self) -> RunnableGraph<NotUsed> {
        self.build_closed_with(|_| Ok(NotUsed))
    }

    /// A closed graph whose materialized value `f` computes from the parts'.
    pub fn build_closed_with<M, F>(self, f: F) -> RunnableGraph<M>
    where
        M: Send + 'static,
        F: Fn(&mut MatValues) -> Result<M> + Send + Sync + 'static,
    {
        let (graph, mat) = self.finish(f);
        RunnableGraph { graph, mat }
    }

    /// A source exposing `outlet`.
    #[must_use]
    pub fn build_source<T: Send + 'static>(self, outlet: Outlet<T>) -> Source<T> {
        self.build_source_with(outlet, |_| Ok(NotUsed))
    }

    /// A source exposing `outlet` whose materialized value `f` computes.
    pub fn build_source_with<T, M, F>(self, outlet: Outlet<T>, f: F) -> Source<T, M>
    where
        T: Send + 'static,
        M: Send + 'static,
        F: Fn(&mut MatValues) -> Result<M> + Send + Sync + 'static,
    {
        let (graph, mat) = self.finish(f);
        Source { graph, outlet, mat }
    }

    /// A flow exposing `inlet` and `outlet`.
    #[must_use]
    pub fn build_flow<I, O>(self, inlet: Inlet<I>, outlet: Outlet<O>) -> Flow<I, O>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        self.build_flow_with(inlet, outlet, |_| Ok(NotUsed))
    }

    /// A flow exposing `inlet` and `outlet` whose materialized value `f`
    /// computes.
    pub fn build_flow_with<I, O, M, F>(self, inlet: Inlet<I>, outlet: Outlet<O>, f: F) -> Flow<I, O, M>
    where
        I: Send + 'static,
        O: Send + 'static,
        M: Send + 'static,
        F: Fn(&mut MatValues) -> Result<M> + Send + Sync + 'static,
    {
        let (graph, mat) = self.finish(f);
        Flow {
            graph,
            inlet,
            outlet,
            mat,
        }
    }

    /// A sink exposing `inlet`.
    #[must_use]
    pub fn build_sink<T: Send + 'static>(self, inlet: Inlet<T>) -> Sink<T> {
        self.build_sink_with(inlet, |_| Ok(NotUsed))
    }

    /// A sink exposing `inlet` whose materialized value `f` computes.
    pub fn build_sink_with<T, M, F>(self, inlet: Inlet<T>, f: F) -> Sink<T, M>
    where
        T: Send + 'static,
        M: Send + 'static,
        F: Fn(&mut MatValues) -> Result<M> + Send + Sync + 'static,
    {
        let (graph, mat) = self.finish(f);
        Sink { graph, inlet, mat }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::junctions::Merge;

    #[test]
    fn parts_are_placed_after_each_other() {
        // Arrange
        let mut builder = GraphDsl::new();

        // Act
        let (first, first_key) = builder.add_source(Source::single(1));
        let (merge, merge_key) = builder.add_stage(Merge::<i32>::new(2));

        // Assert
        assert_eq!(first.node, 0);
        assert_eq!(merge.out.node, 1);
        assert_eq!(merge.inlets[1].index(), 1);
        assert_eq!(first_key.index, 0);
        assert_eq!(merge_key.index, 1);
    }
}
