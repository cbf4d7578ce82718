// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Construction API: immutable, reusable blueprints of stream graphs.
//!
//! A [`Source`], [`Flow`] or [`Sink`] is a graph with one open port on each
//! end, together with the recipe for its materialized value. Composing two
//! blueprints appends their graphs and wires the open ports; nothing runs until
//! a [`RunnableGraph`] is handed to a [`Materializer`](crate::Materializer).
//! Arbitrary topologies are built with [`GraphDsl`].

mod flow;
mod flow_ops;
mod graph_dsl;
mod runnable;
mod sink;
mod source;
mod sub_flow;

pub use self::flow::Flow;
pub use self::flow_ops::FlowOps;
pub use self::graph_dsl::GraphDsl;
pub use self::runnable::RunnableGraph;
pub use self::sink::Sink;
pub use self::source::Source;
pub use self::sub_flow::SubFlow;

use crate::graph::Graph;
use sluice_core::Attributes;

/// Apply `attributes` to a blueprint's graph.
///
/// A single stage takes them as its own, overriding what it carries already. A
/// composite receives them as the outermost layer, so attributes set on its
/// stages keep precedence.
pub(crate) fn apply_attributes(graph: &mut Graph, attributes: &Attributes) {
    if let [node] = graph.nodes.as_mut_slice() {
        node.attributes = node.attributes.clone().and(attributes.clone());
    } else {
        graph.add_attributes(attributes);
    }
    if attributes.is_async_boundary() {
        graph.seal_island();
    }
}
