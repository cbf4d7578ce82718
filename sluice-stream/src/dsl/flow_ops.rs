// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Operators shared by [`Source`], [`Flow`] and [`SubFlow`](super::SubFlow).

use super::{Flow, GraphDsl, Sink, Source, SubFlow};
use crate::junctions::{Broadcast, Concat, Merge, ZipWith};
use crate::stages::substream::{self, SubstreamCancelStrategy};
use crate::stages::{aggregate, buffer, flatten, limit, map_async, simple};
use sluice_core::{Attributes, Decider, OverflowStrategy, Result, StreamError};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

/// Stream operators available on every blueprint with an open outlet.
///
/// An operator appends a stage after the open outlet and returns a blueprint
/// of the same kind: a [`Source`] stays a source with the same materialized
/// value, a [`Flow`] stays a flow, and a [`SubFlow`](super::SubFlow) applies
/// the operator to every substream.
///
/// Implementors provide [`via`](Self::via) and
/// [`with_attributes`](Self::with_attributes); everything else is built on
/// those two.
pub trait FlowOps: Sized {
    /// Element type of the open outlet.
    type Out: Send + 'static;

    /// The same kind of blueprint with a different element type.
    type Repr<T: Send + 'static>: FlowOps<Out = T>;

    /// Attach `flow` to the open outlet, keeping this blueprint's materialized
    /// value.
    fn via<T, M>(self, flow: Flow<Self::Out, T, M>) -> Self::Repr<T>
    where
        T: Send + 'static,
        M: Send + 'static;

    /// Apply `attributes`.
    ///
    /// A single stage takes them as its own; a composite receives them as its
    /// outermost layer, so attributes of its stages keep precedence.
    #[must_use]
    fn with_attributes(self, attributes: Attributes) -> Self;

    /// Name the stages in logs and errors.
    #[must_use]
    fn named(self, name: impl Into<String>) -> Self {
        self.with_attributes(Attributes::name(name))
    }

    /// Supervise the stages with `decider`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sluice_core::supervision::resuming_decider;
    /// use sluice_core::StreamError;
    /// use sluice_stream::prelude::*;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> sluice_core::Result<()> {
    /// let parsed = Source::from_iter(vec!["1", "x", "3"])
    ///     .try_map(|s: &str| s.parse::<u32>().map_err(StreamError::user_error))
    ///     .with_supervision(resuming_decider())
    ///     .run_with(Sink::seq(), &Materializer::new()?)?
    ///     .await?;
    ///
    /// assert_eq!(parsed, vec![1, 3]);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    fn with_supervision(self, decider: Decider) -> Self {
        self.with_attributes(Attributes::supervision(decider))
    }

    /// Run everything assembled so far in its own island.
    #[must_use]
    fn async_boundary(self) -> Self {
        self.with_attributes(Attributes::async_boundary())
    }

    /// Transform every element with `f`.
    fn map<T, F>(self, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        F: Fn(Self::Out) -> T + Send + Sync + 'static,
    {
        self.via(simple::map(f))
    }

    /// Transform every element with a fallible `f`; errors are supervised.
    fn try_map<T, F>(self, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        F: Fn(Self::Out) -> Result<T> + Send + Sync + 'static,
    {
        self.via(simple::try_map(f))
    }

    /// Keep the elements matching `predicate`.
    fn filter<P>(self, predicate: P) -> Self::Repr<Self::Out>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        self.via(simple::filter(predicate))
    }

    /// Transform and filter in one step.
    fn filter_map<T, F>(self, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        F: Fn(Self::Out) -> Option<T> + Send + Sync + 'static,
    {
        self.via(simple::filter_map(f))
    }

    /// Expand every element into zero or more elements, emitted one per pull.
    fn map_concat<T, It, F>(self, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        It: IntoIterator<Item = T> + 'static,
        F: Fn(Self::Out) -> It + Send + Sync + 'static,
    {
        self.via(simple::map_concat(f))
    }

    /// Pass the first `n` elements, then complete and cancel upstream.
    fn take(self, n: u64) -> Self::Repr<Self::Out> {
        self.via(limit::take(n))
    }

    /// Pass elements while `predicate` holds; complete on the first that fails.
    fn take_while<P>(self, predicate: P) -> Self::Repr<Self::Out>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        self.via(limit::take_while(predicate, false))
    }

    /// Like [`take_while`](Self::take_while), also emitting the first element
    /// that fails the predicate.
    fn take_while_inclusive<P>(self, predicate: P) -> Self::Repr<Self::Out>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        self.via(limit::take_while(predicate, true))
    }

    /// Drop the first `n` elements.
    fn skip(self, n: u64) -> Self::Repr<Self::Out> {
        self.via(limit::skip(n))
    }

    /// Drop elements while `predicate` holds.
    fn skip_while<P>(self, predicate: P) -> Self::Repr<Self::Out>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        self.via(limit::skip_while(predicate))
    }

    /// Emit `seed`, then every intermediate accumulator.
    ///
    /// # Arguments
    ///
    /// * `seed` - Initial state, emitted first and restored on `Restart`
    /// * `f` - Computes the next state from the current state and an element
    ///
    /// # Examples
    ///
    /// ```
    /// use sluice_stream::prelude::*;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> sluice_core::Result<()> {
    /// let sums = Source::from_iter(1..=3)
    ///     .scan(0, |acc, x| acc + x)
    ///     .run_with(Sink::seq(), &Materializer::new()?)?
    ///     .await?;
    ///
    /// assert_eq!(sums, vec![0, 1, 3, 6]);
    /// # Ok(())
    /// # }
    /// ```
    fn scan<S, F>(self, seed: S, f: F) -> Self::Repr<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&S, Self::Out) -> S + Send + Sync + 'static,
    {
        self.via(aggregate::try_scan(seed, move |state, element| {
            Ok(f(state, element))
        }))
    }

    /// [`scan`](Self::scan) with a fallible step; errors are supervised.
    fn try_scan<S, F>(self, seed: S, f: F) -> Self::Repr<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&S, Self::Out) -> Result<S> + Send + Sync + 'static,
    {
        self.via(aggregate::try_scan(seed, f))
    }

    /// Emit the final accumulator when upstream completes; an empty stream
    /// emits `seed`.
    fn fold<S, F>(self, seed: S, f: F) -> Self::Repr<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S, Self::Out) -> S + Send + Sync + 'static,
    {
        self.via(aggregate::try_fold(seed, move |state, element| {
            Ok(f(state, element))
        }))
    }

    /// [`fold`](Self::fold) with a fallible step.
    fn try_fold<S, F>(self, seed: S, f: F) -> Self::Repr<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S, Self::Out) -> Result<S> + Send + Sync + 'static,
    {
        self.via(aggregate::try_fold(seed, f))
    }

    /// [`fold`](Self::fold) with an asynchronous step, one element at a time.
    ///
    /// # Behavior
    ///
    /// - The next element is pulled only after the previous step resolved
    /// - A failed step is supervised: `Resume` keeps the previous state,
    ///   `Restart` goes back to `seed`, `Stop` fails the stream
    fn fold_async<S, F, Fut>(self, seed: S, f: F) -> Self::Repr<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S, Self::Out) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        self.via(map_async::fold_async(seed, f))
    }

    /// Combine all elements with `f`; fails with `EmptyStream` when there are
    /// none.
    fn reduce<F>(self, f: F) -> Self::Repr<Self::Out>
    where
        Self::Out: Clone,
        F: Fn(Self::Out, Self::Out) -> Self::Out + Send + Sync + 'static,
    {
        self.via(aggregate::reduce(f))
    }

    /// Chunk elements into vectors of `size`; the last may be shorter.
    fn grouped(self, size: usize) -> Self::Repr<Vec<Self::Out>> {
        self.via(aggregate::grouped(size))
    }

    /// Windows of `size` elements, advancing by `step`.
    fn sliding(self, size: usize, step: usize) -> Self::Repr<Vec<Self::Out>>
    where
        Self::Out: Clone,
    {
        self.via(aggregate::sliding(size, step))
    }

    /// Decouple upstream from downstream with a buffer of `capacity` elements.
    ///
    /// When the buffer is full `strategy` decides: backpressure, drop an
    /// element, or fail with `BufferOverflow`.
    fn buffer(self, capacity: usize, strategy: OverflowStrategy) -> Self::Repr<Self::Out> {
        self.via(buffer::buffer(capacity, strategy))
    }

    /// Run up to `parallelism` futures at once and emit their outputs in
    /// upstream order.
    ///
    /// # Arguments
    ///
    /// * `parallelism` - Maximum number of futures in flight
    /// * `f` - Starts the asynchronous work for one element
    ///
    /// # Behavior
    ///
    /// - Outputs are emitted in the order the elements arrived, regardless of
    ///   which future resolves first
    /// - A failed future is supervised; `Resume` and `Restart` drop the element
    ///
    /// # See Also
    ///
    /// - [`map_async_unordered`](Self::map_async_unordered) - Emits in
    ///   completion order
    fn map_async<T, F, Fut>(self, parallelism: usize, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        F: Fn(Self::Out) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.via(map_async::map_async(parallelism, f))
    }

    /// Like [`map_async`](Self::map_async), emitting outputs as soon as their
    /// futures resolve.
    fn map_async_unordered<T, F, Fut>(self, parallelism: usize, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        F: Fn(Self::Out) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.via(map_async::map_async_unordered(parallelism, f))
    }

    /// On upstream failure emit `f(&error)` if it returns an element, then
    /// complete; otherwise fail with the error.
    fn recover<F>(self, f: F) -> Self::Repr<Self::Out>
    where
        F: Fn(&StreamError) -> Option<Self::Out> + Send + Sync + 'static,
    {
        self.via(simple::recover(f))
    }

    /// Transform the error of an upstream failure.
    fn map_error<F>(self, f: F) -> Self::Repr<Self::Out>
    where
        F: Fn(StreamError) -> StreamError + Send + Sync + 'static,
    {
        self.via(simple::map_error(f))
    }

    /// Log elements and termination under `name`, at the levels given by the
    /// `LogLevels` attribute.
    fn log(self, name: impl Into<String>) -> Self::Repr<Self::Out>
    where
        Self::Out: Debug,
    {
        self.via(simple::log(name))
    }

    /// Emit `separator` between consecutive elements.
    fn intersperse(self, separator: Self::Out) -> Self::Repr<Self::Out>
    where
        Self::Out: Clone + Sync,
    {
        self.via(aggregate::intersperse(None, separator, None))
    }

    /// Emit `start` first, `separator` between elements and `end` last. Start
    /// and end are emitted even for an empty stream.
    fn intersperse_with(
        self,
        start: Self::Out,
        separator: Self::Out,
        end: Self::Out,
    ) -> Self::Repr<Self::Out>
    where
        Self::Out: Clone + Sync,
    {
        self.via(aggregate::intersperse(Some(start), separator, Some(end)))
    }

    /// Emit the elements of `other` after this stream completes.
    fn concat<M>(self, other: Source<Self::Out, M>) -> Self::Repr<Self::Out>
    where
        M: Send + 'static,
    {
        self.via(concat_graph(other, false))
    }

    /// Emit the elements of `other` before this stream's.
    fn prepend<M>(self, other: Source<Self::Out, M>) -> Self::Repr<Self::Out>
    where
        M: Send + 'static,
    {
        self.via(concat_graph(other, true))
    }

    /// Interleave this stream with `other` in arrival order; completes when
    /// both have completed.
    fn merge<M>(self, other: Source<Self::Out, M>) -> Self::Repr<Self::Out>
    where
        M: Send + 'static,
    {
        let mut builder = GraphDsl::new();
        let (merge, _) = builder.add_stage(Merge::<Self::Out>::new(2));
        let (other, _) = builder.add_source(other);
        builder.connect(other, merge.inlets[1]);
        self.via(builder.build_flow(merge.inlets[0], merge.out))
    }

    /// Pair elements with those of `other`; completes with the shorter stream.
    fn zip<U, M>(self, other: Source<U, M>) -> Self::Repr<(Self::Out, U)>
    where
        U: Send + 'static,
        M: Send + 'static,
    {
        self.zip_with(other, |a, b| (a, b))
    }

    /// Combine elements with those of `other` through `f`.
    fn zip_with<U, T, M, F>(self, other: Source<U, M>, f: F) -> Self::Repr<T>
    where
        U: Send + 'static,
        T: Send + 'static,
        M: Send + 'static,
        F: Fn(Self::Out, U) -> T + Send + Sync + 'static,
    {
        let mut builder = GraphDsl::new();
        let (zip, _) = builder.add_stage(ZipWith::new(f));
        let (other, _) = builder.add_source(other);
        builder.connect(other, zip.in1);
        self.via(builder.build_flow(zip.in0, zip.out))
    }

    /// Send a clone of every element to `sink` as well; the stream is
    /// backpressured by both.
    fn also_to<M>(self, sink: Sink<Self::Out, M>) -> Self::Repr<Self::Out>
    where
        Self::Out: Clone,
        M: Send + 'static,
    {
        let mut builder = GraphDsl::new();
        let (broadcast, _) = builder.add_stage(Broadcast::<Self::Out>::new(2));
        let (sink, _) = builder.add_sink(sink);
        builder.connect(broadcast.outlets[1], sink);
        self.via(builder.build_flow(broadcast.inlet, broadcast.outlets[0]))
    }

    /// Map every element to a source and emit the sources' elements one source
    /// after another.
    fn flat_map_concat<T, M, F>(self, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        M: Send + 'static,
        F: Fn(Self::Out) -> Source<T, M> + Send + Sync + 'static,
    {
        self.via(flatten::flat_map_concat(f))
    }

    /// Map every element to a source and run up to `breadth` of them at once,
    /// emitting elements in arrival order.
    fn flat_map_merge<T, M, F>(self, breadth: usize, f: F) -> Self::Repr<T>
    where
        T: Send + 'static,
        M: Send + 'static,
        F: Fn(Self::Out) -> Source<T, M> + Send + Sync + 'static,
    {
        self.via(flatten::flat_map_merge(breadth, f))
    }

    /// Start a new substream with every element matching `predicate`.
    ///
    /// The first element always opens a substream. Cancelling a substream
    /// drains the rest of it; see [`split_when_with`](Self::split_when_with).
    ///
    /// # Examples
    ///
    /// ```
    /// use sluice_stream::prelude::*;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> sluice_core::Result<()> {
    /// let chunks = Source::from_iter(vec![1, 2, 3, 4, 5])
    ///     .split_when(|x| x % 2 == 1)
    ///     .grouped(10)
    ///     .concat_substreams()
    ///     .run_with(Sink::seq(), &Materializer::new()?)?
    ///     .await?;
    ///
    /// assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
    /// # Ok(())
    /// # }
    /// ```
    fn split_when<P>(self, predicate: P) -> SubFlow<Self::Out, Self::Out, Self::Repr<Source<Self::Out>>>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        self.split_when_with(SubstreamCancelStrategy::Drain, predicate)
    }

    /// [`split_when`](Self::split_when) with an explicit reaction to a
    /// cancelled substream.
    fn split_when_with<P>(
        self,
        cancel_strategy: SubstreamCancelStrategy,
        predicate: P,
    ) -> SubFlow<Self::Out, Self::Out, Self::Repr<Source<Self::Out>>>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        SubFlow::new(self.via(substream::split_when(predicate, cancel_strategy)))
    }

    /// End the current substream after every element matching `predicate`.
    fn split_after<P>(self, predicate: P) -> SubFlow<Self::Out, Self::Out, Self::Repr<Source<Self::Out>>>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        self.split_after_with(SubstreamCancelStrategy::Drain, predicate)
    }

    /// [`split_after`](Self::split_after) with an explicit reaction to a
    /// cancelled substream.
    fn split_after_with<P>(
        self,
        cancel_strategy: SubstreamCancelStrategy,
        predicate: P,
    ) -> SubFlow<Self::Out, Self::Out, Self::Repr<Source<Self::Out>>>
    where
        P: Fn(&Self::Out) -> bool + Send + Sync + 'static,
    {
        SubFlow::new(self.via(substream::split_after(predicate, cancel_strategy)))
    }

    /// Route elements into one substream per key.
    ///
    /// # Behavior
    ///
    /// - A key seen for the first time opens a substream
    /// - Elements of a key whose substream was cancelled are dropped
    /// - More than `max_substreams` distinct keys fail the stream with
    ///   `TooManySubstreams`
    fn group_by<K, F>(
        self,
        max_substreams: usize,
        key_fn: F,
    ) -> SubFlow<Self::Out, Self::Out, Self::Repr<Source<Self::Out>>>
    where
        K: Clone + Eq + Hash + Send + 'static,
        F: Fn(&Self::Out) -> K + Send + Sync + 'static,
    {
        SubFlow::new(self.via(substream::group_by(max_substreams, key_fn)))
    }
}

/// Flow feeding its input and `other` through a two-input concat, with
/// `other` first when `prepend` is set.
fn concat_graph<T, M>(other: Source<T, M>, prepend: bool) -> Flow<T, T>
where
    T: Send + 'static,
    M: Send + 'static,
{
    let mut builder = GraphDsl::new();
    let (concat, _) = builder.add_stage(Concat::<T>::new(2));
    let (other, _) = builder.add_source(other);
    let (own, theirs) = if prepend { (1, 0) } else { (0, 1) };
    builder.connect(other, concat.inlets[theirs]);
    builder.build_flow(concat.inlets[own], concat.out)
}
