// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Immutable graph assembly: stage nodes plus the wires between their ports.

use crate::port::PortInfo;
use crate::stage::{ErasedStage, GraphStage};
use sluice_core::{Attributes, Result, StreamError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static ISLAND_IDS: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub(crate) struct StageNode {
    pub(crate) stage: Arc<dyn ErasedStage>,
    pub(crate) attributes: Attributes,
    /// Async boundaries this node sits behind; equal lists share an island.
    pub(crate) islands: Vec<u64>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Edge {
    pub(crate) from: PortInfo,
    pub(crate) to: PortInfo,
}

#[derive(Clone, Default)]
pub(crate) struct Graph {
    pub(crate) nodes: Vec<StageNode>,
    pub(crate) edges: Vec<Edge>,
}

impl Graph {
    pub(crate) fn single<S: GraphStage>(stage: S) -> Self {
        let attributes = GraphStage::initial_attributes(&stage);
        Self {
            nodes: vec![StageNode {
                stage: Arc::new(stage),
                attributes,
                islands: Vec::new(),
            }],
            edges: Vec::new(),
        }
    }

    /// Add `other`'s nodes and edges; returns the offset applied to its nodes.
    pub(crate) fn append(&mut self, other: Self) -> usize {
        let offset = self.nodes.len();
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges.into_iter().map(|edge| Edge {
            from: edge.from.shifted(offset),
            to: edge.to.shifted(offset),
        }));
        offset
    }

    pub(crate) fn connect(&mut self, from: PortInfo, to: PortInfo) {
        self.edges.push(Edge { from, to });
    }

    /// Wrap every node in `attributes`; attributes already on a node win.
    pub(crate) fn add_attributes(&mut self, attributes: &Attributes) {
        for node in &mut self.nodes {
            node.attributes = node.attributes.nested_under(attributes);
        }
    }

    /// Mark everything assembled so far as running apart from what is added later.
    pub(crate) fn seal_island(&mut self) {
        let id = ISLAND_IDS.fetch_add(1, Ordering::Relaxed);
        for node in &mut self.nodes {
            node.islands.push(id);
        }
    }

    fn node_label(&self, node: usize) -> String {
        let Some(stage) = self.nodes.get(node) else {
            return format!("#{node}");
        };
        stage.attributes.get_name().map_or_else(
            || format!("{}#{node}", stage.stage.label()),
            |name| format!("{name}#{node}"),
        )
    }

    /// Check that the graph is closed, well typed and free of illegal cycles.
    pub(crate) fn validate(&self) -> Result<()> {
        let mut inlets: HashMap<(usize, usize), (PortInfo, usize)> = HashMap::new();
        let mut outlets: HashMap<(usize, usize), (PortInfo, usize)> = HashMap::new();
        for (node, stage_node) in self.nodes.iter().enumerate() {
            for port in stage_node.stage.inlets() {
                inlets.insert((node, port.index), (port.shifted(node), 0));
            }
            for port in stage_node.stage.outlets() {
                outlets.insert((node, port.index), (port.shifted(node), 0));
            }
        }

        for edge in &self.edges {
            let (from_port, from_count) = outlets
                .get_mut(&(edge.from.node, edge.from.index))
                .ok_or_else(|| {
                    StreamError::invalid_graph(format!(
                        "outlet {} of {} does not exist",
                        edge.from.index,
                        self.node_label(edge.from.node)
                    ))
                })?;
            *from_count += 1;
            let from_type = from_port.type_id;
            let from_name = from_port.type_name;

            let (to_port, to_count) = inlets
                .get_mut(&(edge.to.node, edge.to.index))
                .ok_or_else(|| {
                    StreamError::invalid_graph(format!(
                        "inlet {} of {} does not exist",
                        edge.to.index,
                        self.node_label(edge.to.node)
                    ))
                })?;
            *to_count += 1;

            if from_type != to_port.type_id
                || edge.from.type_id != from_type
                || edge.to.type_id != to_port.type_id
            {
                return Err(StreamError::invalid_graph(format!(
                    "type mismatch: outlet {} of {} produces {} but inlet {} of {} expects {}",
                    edge.from.index,
                    self.node_label(edge.from.node),
                    from_name,
                    edge.to.index,
                    self.node_label(edge.to.node),
                    to_port.type_name
                )));
            }
        }

        let mut problems = Vec::new();
        for (direction, ports) in [("outlet", &outlets), ("inlet", &inlets)] {
            for (&(node, index), &(_, count)) in ports {
                let label = self.node_label(node);
                match count {
                    1 => {}
                    0 => problems.push((
                        node,
                        format!("{direction} {index} of {label} is not connected"),
                    )),
                    _ => problems.push((
                        node,
                        format!("{direction} {index} of {label} is connected {count} times"),
                    )),
                }
            }
        }
        if let Some((_, message)) = problems.into_iter().min_by_key(|(node, _)| *node) {
            return Err(StreamError::invalid_graph(message));
        }

        self.check_cycles()
    }

    /// Depth-first search over stage-to-stage wires, skipping stages that may
    /// sit on a cycle.
    fn check_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        let breaks: Vec<bool> = self
            .nodes
            .iter()
            .map(|node| node.stage.breaks_cycles())
            .collect();
        let mut successors = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            if !breaks[edge.from.node] && !breaks[edge.to.node] {
                successors[edge.from.node].push(edge.to.node);
            }
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::Active;
            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&successor) = successors[node].get(top.1) {
                    top.1 += 1;
                    match marks[successor] {
                        Mark::Active => {
                            return Err(StreamError::invalid_graph(format!(
                                "cycle through {} without a cycle-breaking stage",
                                self.node_label(successor)
                            )));
                        }
                        Mark::Unvisited => {
                            marks[successor] = Mark::Active;
                            stack.push((successor, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}
