// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::{apply_attributes, Flow, FlowOps, GraphDsl, RunnableGraph, Sink};
use crate::completion::StreamCompletion;
use crate::graph::Graph;
use crate::junctions::ZipN;
use crate::mat::{self, MatFn};
use crate::materializer::Materializer;
use crate::port::Outlet;
use crate::shape::SourceShape;
use crate::stage::GraphStage;
use crate::stages::queue::{self, SourceQueue};
use crate::stages::reactive::{self, StreamSubscriber};
use crate::stages::resource::{self, AsyncResource};
use crate::stages::{sources, termination};
use crate::Keep;
use futures::Stream;
use sluice_core::{Attributes, NotUsed, OverflowStrategy, Publisher, Result, StreamError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A blueprint with exactly one open outlet producing `Out`.
///
/// Materializing a graph built from a source yields a value of type `Mat`.
/// Sources are immutable and can be materialized any number of times, except
/// where a constructor documents otherwise.
///
/// # Examples
///
/// ```
/// use sluice_stream::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let materializer = Materializer::new()?;
/// let doubled = Source::from_iter(1..=3)
///     .map(|x| x * 2)
///     .run_with(Sink::seq(), &materializer)?
///     .await?;
///
/// assert_eq!(doubled, vec![2, 4, 6]);
/// # Ok(())
/// # }
/// ```
pub struct Source<Out, Mat = NotUsed> {
    pub(crate) graph: Graph,
    pub(crate) outlet: Outlet<Out>,
    pub(crate) mat: MatFn<Mat>,
}

impl<Out, Mat> Clone for Source<Out, Mat> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            outlet: self.outlet,
            mat: Arc::clone(&self.mat),
        }
    }
}

impl<Out, Mat> fmt::Debug for Source<Out, Mat> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("stages", &self.graph.nodes.len())
            .field("outlet", &self.outlet)
            .finish()
    }
}

impl<Out: Send + 'static> Source<Out> {
    /// Emit `element` once, then complete.
    pub fn single(element: Out) -> Self
    where
        Out: Clone + Sync,
    {
        sources::single(element)
    }

    /// Emit the elements of `iterable` in order, then complete.
    ///
    /// The iterable is cloned for every materialization.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = Out> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        sources::from_iter(iterable)
    }

    /// Emit `element` forever.
    pub fn repeat(element: Out) -> Self
    where
        Out: Clone + Sync,
    {
        sources::repeat(element)
    }

    /// Complete immediately.
    #[must_use]
    pub fn empty() -> Self {
        sources::empty()
    }

    /// Fail immediately with `error`.
    #[must_use]
    pub fn failed(error: StreamError) -> Self {
        sources::failed(error)
    }

    /// Emit the output of `future`, or fail with its error.
    ///
    /// The future runs once; every materialization observes the same outcome.
    pub fn from_future<F>(future: F) -> Self
    where
        Out: Clone + Sync,
        F: Future<Output = Result<Out>> + Send + 'static,
    {
        sources::from_future(future)
    }

    /// Emit elements generated from a state until `f` returns `None`.
    ///
    /// ```
    /// use sluice_stream::prelude::*;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> sluice_core::Result<()> {
    /// let powers = Source::unfold(1u32, |n| (n <= 8).then(|| (n * 2, n)))
    ///     .run_with(Sink::seq(), &Materializer::new()?)?
    ///     .await?;
    ///
    /// assert_eq!(powers, vec![1, 2, 4, 8]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn unfold<S, F>(seed: S, f: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Option<(S, Out)> + Send + Sync + 'static,
    {
        sources::unfold(seed, f)
    }

    /// Like [`unfold`](Self::unfold) with an asynchronous step. An error fails
    /// the stream, subject to supervision.
    pub fn unfold_async<S, F, Fut>(seed: S, f: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<(S, Out)>>> + Send + 'static,
    {
        sources::unfold_async(seed, f)
    }

    /// Emit the items of a [`futures::Stream`].
    ///
    /// The stream is consumed by the first materialization; later ones fail.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Out> + Send + 'static,
    {
        sources::from_stream(stream)
    }

    /// Source fed through the materialized [`SourceQueue`].
    ///
    /// Up to `capacity` offered elements are buffered; `strategy` decides what
    /// happens when the buffer is full.
    #[must_use]
    pub fn queue(capacity: usize, strategy: OverflowStrategy) -> Source<Out, SourceQueue<Out>> {
        queue::source_queue(capacity, strategy)
    }

    /// Source fed by an external publisher through the materialized
    /// [`StreamSubscriber`].
    #[must_use]
    pub fn as_subscriber() -> Source<Out, StreamSubscriber<Out>> {
        reactive::as_subscriber()
    }

    /// Subscribe to `publisher` when materialized and emit what it publishes.
    pub fn from_publisher(publisher: Arc<dyn Publisher<Out>>) -> Self {
        reactive::from_publisher(publisher)
    }

    /// Read from a resource opened synchronously.
    ///
    /// `open` runs when the stage starts, `read` on every pull until it yields
    /// `None`, and `close` exactly once after each successful open.
    pub fn unfold_resource<R, O, Rd, C>(open: O, read: Rd, close: C) -> Self
    where
        R: Send + 'static,
        O: Fn() -> Result<R> + Send + Sync + 'static,
        Rd: Fn(&mut R) -> Result<Option<Out>> + Send + Sync + 'static,
        C: Fn(R) -> Result<()> + Send + Sync + 'static,
    {
        resource::unfold_resource(open, read, close)
    }

    /// Read from an [`AsyncResource`] produced by `open`.
    pub fn unfold_resource_async<R, F, Fut>(open: F) -> Self
    where
        R: AsyncResource<Item = Out>,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        resource::unfold_resource_async(open)
    }

    /// Emit one vector per round, taking one element from each source.
    ///
    /// Completes as soon as any source completes.
    #[must_use]
    pub fn zip_n(sources: Vec<Self>) -> Source<Vec<Out>> {
        let mut builder = GraphDsl::new();
        let (zip, _) = builder.add_stage(ZipN::<Out>::new(sources.len()));
        for (source, inlet) in sources.into_iter().zip(zip.inlets.iter()) {
            let (outlet, _) = builder.add_source(source);
            builder.connect(outlet, *inlet);
        }
        builder.build_source(zip.out)
    }
}

impl<Out: Send + 'static, Mat: Send + 'static> Source<Out, Mat> {
    /// Wrap a custom [`GraphStage`] with a single outlet.
    pub fn from_graph_stage<S>(stage: S) -> Self
    where
        S: GraphStage<Shape = SourceShape<Out>, Mat = Mat>,
    {
        let shape = stage.shape();
        Self {
            graph: Graph::single(stage),
            outlet: shape.out,
            mat: mat::single(),
        }
    }

    /// Attach `flow`, combining both materialized values with `combine`.
    pub fn via_mat<T, M2, M3, F>(self, flow: Flow<Out, T, M2>, combine: F) -> Source<T, M3>
    where
        T: Send + 'static,
        M2: Send + 'static,
        M3: Send + 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.append(flow.graph);
        graph.connect(self.outlet.info(), flow.inlet.shifted(offset).info());
        Source {
            graph,
            outlet: flow.outlet.shifted(offset),
            mat: mat::combine(self.mat, flow.mat, offset, combine),
        }
    }

    /// Close the graph with `sink`, keeping this source's materialized value.
    pub fn to<M2: Send + 'static>(self, sink: Sink<Out, M2>) -> RunnableGraph<Mat> {
        self.to_mat(sink, Keep::left)
    }

    /// Close the graph with `sink`, combining both materialized values.
    pub fn to_mat<M2, M3, F>(self, sink: Sink<Out, M2>, combine: F) -> RunnableGraph<M3>
    where
        M2: Send + 'static,
        M3: Send + 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.append(sink.graph);
        graph.connect(self.outlet.info(), sink.inlet.shifted(offset).info());
        RunnableGraph {
            graph,
            mat: mat::combine(self.mat, sink.mat, offset, combine),
        }
    }

    /// Materialize into `sink` and return the sink's materialized value.
    ///
    /// # Errors
    /// Whatever [`Materializer::materialize`] reports.
    pub fn run_with<M2: Send + 'static>(
        self,
        sink: Sink<Out, M2>,
        materializer: &Materializer,
    ) -> Result<M2> {
        materializer.materialize(&self.to_mat(sink, Keep::right))
    }

    /// Transform the materialized value.
    pub fn map_materialized_value<M2, F>(self, f: F) -> Source<Out, M2>
    where
        M2: Send + 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        Source {
            graph: self.graph,
            outlet: self.outlet,
            mat: mat::map(self.mat, f),
        }
    }

    /// Materialize a [`StreamCompletion`] resolving when this source's stream
    /// terminates, combined with the existing value.
    pub fn watch_termination<M2, F>(self, combine: F) -> Source<Out, M2>
    where
        M2: Send + 'static,
        F: Fn(Mat, StreamCompletion<()>) -> M2 + Send + Sync + 'static,
    {
        self.via_mat(termination::watch_termination(), combine)
    }
}

impl<Out: Send + 'static, Mat: Send + 'static> FlowOps for Source<Out, Mat> {
    type Out = Out;
    type Repr<T: Send + 'static> = Source<T, Mat>;

    fn via<T, M>(self, flow: Flow<Out, T, M>) -> Source<T, Mat>
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
