// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::apply_attributes;
use crate::graph::Graph;
use crate::mat::{self, MatFn};
use crate::materializer::Materializer;
use sluice_core::{Attributes, Result};
use std::fmt;
use std::sync::Arc;

/// A closed graph, ready to be materialized.
///
/// Each materialization starts an independent running instance and returns a
/// fresh materialized value.
pub struct RunnableGraph<Mat> {
    pub(crate) graph: Graph,
    pub(crate) mat: MatFn<Mat>,
}

impl<Mat> Clone for RunnableGraph<Mat> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            mat: Arc::clone(&self.mat),
        }
    }
}

impl<Mat> fmt::Debug for RunnableGraph<Mat> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnableGraph")
            .field("stages", &self.graph.nodes.len())
            .field("connections", &self.graph.edges.len())
            .finish()
    }
}

impl<Mat: Send + 'static> RunnableGraph<Mat> {
    /// Materialize on `materializer`.
    ///
    /// # Errors
    /// Whatever [`Materializer::materialize`] reports.
    pub fn run_with(&self, materializer: &Materializer) -> Result<Mat> {
        materializer.materialize(self)
    }

    /// Materialize on a fresh [`Materializer`] bound to the current tokio
    /// runtime.
    ///
    /// # Errors
    /// Fails outside a tokio runtime, and with whatever
    /// [`Materializer::materialize`] reports.
    pub fn run(&self) -> Result<Mat> {
        Materializer::new()?.materialize(self)
    }

    /// Transform the materialized value.
    pub fn map_materialized_value<M2, F>(self, f: F) -> RunnableGraph<M2>
    where
        M2: Send + 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        RunnableGraph {
            graph: self.graph,
            mat: mat::map(self.mat, f),
        }
    }

    /// Apply `attributes` to every stage; attributes set on the stages win.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        apply_attributes(&mut self.graph, &attributes);
        self
    }

    /// Name the graph in logs and errors.
    #[must_use]
    pub fn named(self, name: impl Into<String>) -> Self {
        self.with_attributes(Attributes::name(name))
    }
}
