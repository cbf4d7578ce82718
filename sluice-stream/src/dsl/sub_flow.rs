// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::{Flow, FlowOps, Source};
use sluice_core::Attributes;
use std::fmt;

/// Operators applied to every substream of a `split_when`, `split_after` or
/// `group_by`.
///
/// `Outer` is the blueprint emitting the substreams as `Source<In>`. Operators
/// chained on the sub flow are recorded once and attached to each substream;
/// the substreams are brought back together with
/// [`merge_substreams`](Self::merge_substreams),
/// [`concat_substreams`](Self::concat_substreams) or exposed as sources with
/// [`lift`](Self::lift).
pub struct SubFlow<In, Out, Outer> {
    outer: Outer,
    inner: Flow<In, Out>,
}

impl<In, Out, Outer: fmt::Debug> fmt::Debug for SubFlow<In, Out, Outer> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubFlow")
            .field("outer", &self.outer)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<In: Send + 'static, Outer> SubFlow<In, In, Outer> {
    pub(crate) fn new(outer: Outer) -> Self {
        Self {
            outer,
            inner: Flow::new(),
        }
    }
}

impl<In, Out, Outer> SubFlow<In, Out, Outer>
where
    In: Send + 'static,
    Out: Send + 'static,
    Outer: FlowOps<Out = Source<In>>,
{
    /// Run every substream and merge their elements in arrival order, without
    /// limiting how many run at once.
    pub fn merge_substreams(self) -> Outer::Repr<Out> {
        self.merge_substreams_with_parallelism(usize::MAX)
    }

    /// Run up to `parallelism` substreams at once and merge their elements.
    ///
    /// A substream that is not yet running is not consumed, which backpressures
    /// the splitting stage once `parallelism` substreams are open.
    pub fn merge_substreams_with_parallelism(self, parallelism: usize) -> Outer::Repr<Out> {
        let inner = self.inner;
        self.outer
            .flat_map_merge(parallelism, move |source: Source<In>| source.via(inner.clone()))
    }

    /// Run the substreams one after another, in the order they were opened.
    pub fn concat_substreams(self) -> Outer::Repr<Out> {
        let inner = self.inner;
        self.outer
            .flat_map_concat(move |source: Source<In>| source.via(inner.clone()))
    }

    /// Emit every substream, with the sub flow's operators attached, as a
    /// source of its own.
    pub fn lift(self) -> Outer::Repr<Source<Out>> {
        let inner = self.inner;
        self.outer
            .map(move |source: Source<In>| source.via(inner.clone()))
    }
}

impl<In, Out, Outer> FlowOps for SubFlow<In, Out, Outer>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    type Out = Out;
    type Repr<T: Send + 'static> = SubFlow<In, T, Outer>;

    fn via<T, M>(self, flow: Flow<Out, T, M>) -> SubFlow<In, T, Outer>
    where
        T: Send + 'static,
        M: Send + 'static,
    {
        SubFlow {
            outer: self.outer,
            inner: self.inner.via(flow),
        }
    }

    fn with_attributes(self, attributes: Attributes) -> Self {
        SubFlow {
            outer: self.outer,
            inner: self.inner.with_attributes(attributes),
        }
    }
}
