// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::{apply_attributes, FlowOps, Sink};
use crate::completion::StreamCompletion;
use crate::graph::Graph;
use crate::mat::{self, MatFn};
use crate::port::{Inlet, Outlet};
use crate::shape::FlowShape;
use crate::stage::GraphStage;
use crate::stages::{simple, termination};
use crate::Keep;
use sluice_core::{Attributes, NotUsed};
use std::fmt;
use std::sync::Arc;

/// A blueprint with one open inlet consuming `In` and one open outlet
/// producing `Out`.
///
/// Flows are built by chaining [`FlowOps`] operators onto [`Flow::new`] and
/// attached to a [`Source`](super::Source) with `via`.
///
/// ```
/// use sluice_stream::prelude::*;
///
/// let evens_doubled: Flow<u32, u32> = Flow::new().filter(|x| x % 2 == 0).map(|x| x * 2);
/// let source = Source::from_iter(1..=10).via(evens_doubled);
/// # let _ = source;
/// ```
pub struct Flow<In, Out = In, Mat = NotUsed> {
    pub(crate) graph: Graph,
    pub(crate) inlet: Inlet<In>,
    pub(crate) outlet: Outlet<Out>,
    pub(crate) mat: MatFn<Mat>,
}

impl<In, Out, Mat> Clone for Flow<In, Out, Mat> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            inlet: self.inlet,
            outlet: self.outlet,
            mat: Arc::clone(&self.mat),
        }
    }
}

impl<In, Out, Mat> fmt::Debug for Flow<In, Out, Mat> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("stages", &self.graph.nodes.len())
            .field("inlet", &self.inlet)
            .field("outlet", &self.outlet)
            .finish()
    }
}

impl<T: Send + 'static> Flow<T> {
    /// Flow passing elements through unchanged; the starting point for
    /// chaining operators.
    #[must_use]
    pub fn new() -> Self {
        simple::identity()
    }
}

impl<T: Send + 'static> Default for Flow<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out, Mat> Flow<In, Out, Mat>
where
    In: Send + 'static,
    Out: Send + 'static,
    Mat: Send + 'static,
{
    /// Wrap a custom [`GraphStage`] with one inlet and one outlet.
    pub fn from_graph_stage<S>(stage: S) -> Self
    where
        S: GraphStage<Shape = FlowShape<In, Out>, Mat = Mat>,
    {
        let shape = stage.shape();
        Self {
            graph: Graph::single(stage),
            inlet: shape.inlet,
            outlet: shape.outlet,
            mat: mat::single(),
        }
    }

    /// Attach `flow` downstream, combining both materialized values.
    pub fn via_mat<T, M2, M3, F>(self, flow: Flow<Out, T, M2>, combine: F) -> Flow<In, T, M3>
    where
        T: Send + 'static,
        M2: Send + 'static,
        M3: Send + 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.append(flow.graph);
        graph.connect(self.outlet.info(), flow.inlet.shifted(offset).info());
        Flow {
            graph,
            inlet: self.inlet,
            outlet: flow.outlet.shifted(offset),
            mat: mat::combine(self.mat, flow.mat, offset, combine),
        }
    }

    /// Terminate the flow in `sink`, keeping the flow's materialized value.
    pub fn to<M2: Send + 'static>(self, sink: Sink<Out, M2>) -> Sink<In, Mat> {
        self.to_mat(sink, Keep::left)
    }

    /// Terminate the flow in `sink`, combining both materialized values.
    pub fn to_mat<M2, M3, F>(self, sink: Sink<Out, M2>, combine: F) -> Sink<In, M3>
    where
        M2: Send + 'static,
        M3: Send + 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.append(sink.graph);
        graph.connect(self.outlet.info(), sink.inlet.shifted(offset).info());
        Sink {
            graph,
            inlet: self.inlet,
            mat: mat::combine(self.mat, sink.mat, offset, combine),
        }
    }

    /// Transform the materialized value.
    pub fn map_materialized_value<M2, F>(self, f: F) -> Flow<In, Out, M2>
    where
        M2: Send + 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        Flow {
            graph: self.graph,
            inlet: self.inlet,
            outlet: self.outlet,
            mat: mat::map(self.mat, f),
        }
    }

    /// Materialize a [`StreamCompletion`] that resolves when the flow's output
    /// terminates.
    pub fn watch_termination<M2, F>(self, combine: F) -> Flow<In, Out, M2>
    where
        M2: Send + 'static,
        F: Fn(Mat, StreamCompletion<()>) -> M2 + Send + Sync + 'static,
    {
        self.via_mat(termination::watch_termination(), combine)
    }
}

impl<In, Out, Mat> FlowOps for Flow<In, Out, Mat>
where
    In: Send + 'static,
    Out: Send + 'static,
    Mat: Send + 'static,
{
    type Out = Out;
    type Repr<T: Send + 'static> = Flow<In, T, Mat>;

    fn via<T, M>(self, flow: Flow<Out, T, M>) -> Flow<In, T, Mat>
    where
        T: Send + 'static,
        M: Send + 'static,
    {
        self.via_mat(flow, Keep::left)
    }

    fn with_attributes(mut self, attributes: Attributes) -> Self {
        apply_attributes(&mut self.graph, &attributes);
        self
    }
}
