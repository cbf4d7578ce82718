// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Materialized value plumbing.
//!
//! Every stage node yields one value when it is created. A composite keeps a
//! [`MatFn`] that knows which node values to take, relative to where the
//! composite ended up in the final graph, and how to combine them.

use sluice_core::{Result, StreamError};
use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Values produced by the nodes of one materialization, indexed by node.
pub(crate) struct MatSlots {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl MatSlots {
    pub(crate) fn new(slots: Vec<Option<Box<dyn Any + Send>>>) -> Self {
        Self { slots }
    }

    pub(crate) fn take<M: 'static>(&mut self, node: usize) -> Result<M> {
        let value = self
            .slots
            .get_mut(node)
            .and_then(Option::take)
            .ok_or_else(|| {
                StreamError::invalid_graph(format!("materialized value of node {node} is missing"))
            })?;
        value.downcast::<M>().map(|value| *value).map_err(|_| {
            StreamError::invalid_graph(format!(
                "materialized value of node {node} is not a {}",
                type_name::<M>()
            ))
        })
    }
}

/// Computes a composite's materialized value from the node slots, given the
/// offset of the composite's first node.
pub(crate) type MatFn<M> = Arc<dyn Fn(&mut MatSlots, usize) -> Result<M> + Send + Sync>;

/// Value of the single node at the composite's start.
pub(crate) fn single<M: Send + 'static>() -> MatFn<M> {
    Arc::new(|slots, offset| slots.take::<M>(offset))
}

/// Combine two composites placed `right_offset` nodes apart.
pub(crate) fn combine<A, B, C, F>(
    left: MatFn<A>,
    right: MatFn<B>,
    right_offset: usize,
    combine: F,
) -> MatFn<C>
where
    A: 'static,
    B: 'static,
    C: 'static,
    F: Fn(A, B) -> C + Send + Sync + 'static,
{
    Arc::new(move |slots, offset| {
        let a = left(slots, offset)?;
        let b = right(slots, offset + right_offset)?;
        Ok(combine(a, b))
    })
}

/// Transform a composite's value.
pub(crate) fn map<A, B, F>(inner: MatFn<A>, f: F) -> MatFn<B>
where
    A: 'static,
    B: 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    Arc::new(move |slots, offset| inner(slots, offset).map(&f))
}

/// Combinators choosing which materialized value a composition keeps.
///
/// ```
/// use sluice_stream::Keep;
///
/// assert_eq!(Keep::left(1, "a"), 1);
/// assert_eq!(Keep::right(1, "a"), "a");
/// assert_eq!(Keep::both(1, "a"), (1, "a"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Keep;

impl Keep {
    /// Keep the value of the left-hand side.
    pub fn left<A, B>(left: A, _right: B) -> A {
        left
    }

    /// Keep the value of the right-hand side.
    pub fn right<A, B>(_left: A, right: B) -> B {
        right
    }

    /// Keep both values as a pair.
    pub fn both<A, B>(left: A, right: B) -> (A, B) {
        (left, right)
    }

    /// Keep neither value.
    pub fn none<A, B>(_left: A, _right: B) -> sluice_core::NotUsed {
        sluice_core::NotUsed
    }
}

/// Typed handle to the materialized value of a part added to a
/// [`GraphDsl`](crate::GraphDsl).
pub struct MatKey<M> {
    pub(crate) index: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M> MatKey<M> {
    pub(crate) const fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }
}

impl<M> Clone for MatKey<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for MatKey<M> {}

impl<M> fmt::Debug for MatKey<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatKey<{}>({})", type_name::<M>(), self.index)
    }
}

/// Materialized values of the parts of a [`GraphDsl`](crate::GraphDsl), handed
/// to the closure that computes the graph's own value.
pub struct MatValues {
    values: Vec<Option<Box<dyn Any + Send>>>,
}

impl MatValues {
    pub(crate) fn new(values: Vec<Option<Box<dyn Any + Send>>>) -> Self {
        Self { values }
    }

    /// Take the value behind `key`. Each value can be taken once.
    ///
    /// # Errors
    /// Returns [`StreamError::InvalidGraph`] when the value was already taken or
    /// the key belongs to another builder.
    pub fn take<M: 'static>(&mut self, key: MatKey<M>) -> Result<M> {
        let value = self
            .values
            .get_mut(key.index)
            .and_then(Option::take)
            .ok_or_else(|| {
                StreamError::invalid_graph(format!(
                    "materialized value {} is missing or already taken",
                    key.index
                ))
            })?;
        value.downcast::<M>().map(|value| *value).map_err(|_| {
            StreamError::invalid_graph(format!(
                "materialized value {} is not a {}",
                key.index,
                type_name::<M>()
            ))
        })
    }
}

impl fmt::Debug for MatValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatValues")
            .field("len", &self.values.len())
            .finish()
    }
}
