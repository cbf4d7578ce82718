// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::apply_attributes;
use crate::completion::StreamCompletion;
use crate::graph::Graph;
use crate::mat::{self, MatFn};
use crate::port::Inlet;
use crate::shape::SinkShape;
use crate::stage::GraphStage;
use crate::stages::queue::{self, SinkQueue};
use crate::stages::reactive::{self, StreamPublisher};
use crate::stages::sinks;
use sluice_core::{Attributes, Decider, NotUsed, Result, Subscriber};
use std::fmt;
use std::sync::Arc;

/// A blueprint with exactly one open inlet consuming `In`.
///
/// Most sinks materialize a [`StreamCompletion`] that resolves with the
/// outcome of the stream.
pub struct Sink<In, Mat = NotUsed> {
    pub(crate) graph: Graph,
    pub(crate) inlet: Inlet<In>,
    pub(crate) mat: MatFn<Mat>,
}

impl<In, Mat> Clone for Sink<In, Mat> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            inlet: self.inlet,
            mat: Arc::clone(&self.mat),
        }
    }
}

impl<In, Mat> fmt::Debug for Sink<In, Mat> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("stages", &self.graph.nodes.len())
            .field("inlet", &self.inlet)
            .finish()
    }
}

impl<In: Send + 'static> Sink<In> {
    /// Consume and discard everything.
    #[must_use]
    pub fn ignore() -> Sink<In, StreamCompletion<()>> {
        sinks::ignore()
    }

    /// Call `f` for every element.
    pub fn for_each<F>(f: F) -> Sink<In, StreamCompletion<()>>
    where
        F: Fn(In) + Send + Sync + 'static,
    {
        sinks::for_each(f)
    }

    /// Fold every element into an accumulator and resolve with the result.
    pub fn fold<S, F>(seed: S, f: F) -> Sink<In, StreamCompletion<S>>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S, In) -> S + Send + Sync + 'static,
    {
        sinks::fold(seed, f)
    }

    /// Collect every element.
    #[must_use]
    pub fn seq() -> Sink<In, StreamCompletion<Vec<In>>> {
        sinks::seq()
    }

    /// Resolve with the first element and cancel upstream; fails with
    /// [`EmptyStream`](sluice_core::StreamError::EmptyStream) when there is none.
    #[must_use]
    pub fn head() -> Sink<In, StreamCompletion<In>> {
        sinks::head()
    }

    /// Resolve with the first element, if any.
    #[must_use]
    pub fn head_option() -> Sink<In, StreamCompletion<Option<In>>> {
        sinks::head_option()
    }

    /// Resolve with the last element; fails on an empty stream.
    #[must_use]
    pub fn last() -> Sink<In, StreamCompletion<In>> {
        sinks::last()
    }

    /// Resolve with the last element, if any.
    #[must_use]
    pub fn last_option() -> Sink<In, StreamCompletion<Option<In>>> {
        sinks::last_option()
    }

    /// Cancel upstream immediately.
    #[must_use]
    pub fn cancelled() -> Self {
        sinks::cancelled()
    }

    /// Ignore elements and call `callback` once with the stream's outcome.
    pub fn on_complete<F>(callback: F) -> Self
    where
        F: Fn(Result<()>) + Send + Sync + 'static,
    {
        sinks::on_complete(callback)
    }

    /// Sink drained through the materialized [`SinkQueue`]; demand is exactly
    /// the number of outstanding `pull` calls.
    #[must_use]
    pub fn queue() -> Sink<In, SinkQueue<In>> {
        queue::sink_queue()
    }

    /// Expose the stream as a single-subscription [`StreamPublisher`].
    #[must_use]
    pub fn as_publisher() -> Sink<In, StreamPublisher<In>> {
        reactive::as_publisher()
    }

    /// Publish the stream to `subscriber`.
    pub fn from_subscriber(subscriber: Arc<dyn Subscriber<In>>) -> Self {
        reactive::from_subscriber(subscriber)
    }
}

impl<In: Send + 'static, Mat: Send + 'static> Sink<In, Mat> {
    /// Wrap a custom [`GraphStage`] with a single inlet.
    pub fn from_graph_stage<S>(stage: S) -> Self
    where
        S: GraphStage<Shape = SinkShape<In>, Mat = Mat>,
    {
        let shape = stage.shape();
        Self {
            graph: Graph::single(stage),
            inlet: shape.inlet,
            mat: mat::single(),
        }
    }

    /// Transform the materialized value.
    pub fn map_materialized_value<M2, F>(self, f: F) -> Sink<In, M2>
    where
        M2: Send + 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        Sink {
            graph: self.graph,
            inlet: self.inlet,
            mat: mat::map(self.mat, f),
        }
    }

    /// Apply `attributes` to the sink.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        apply_attributes(&mut self.graph, &attributes);
        self
    }

    /// Name the sink in logs and errors.
    #[must_use]
    pub fn named(self, name: impl Into<String>) -> Self {
        self.with_attributes(Attributes::name(name))
    }

    /// Supervise the sink's stages with `decider`.
    #[must_use]
    pub fn with_supervision(self, decider: Decider) -> Self {
        self.with_attributes(Attributes::supervision(decider))
    }

    /// Run the sink in its own island.
    #[must_use]
    pub fn async_boundary(self) -> Self {
        self.with_attributes(Attributes::async_boundary())
    }
}
