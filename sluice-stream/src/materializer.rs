// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Turning graph blueprints into running islands.
//!
//! [`Materializer::materialize`] validates a closed graph, creates one logic per
//! stage, groups the stages into islands at async boundaries, wires the
//! connections (inserting a publisher/subscriber pair wherever a connection
//! crosses islands) and spawns one tokio task per island. Every call yields an
//! independent running instance.

use crate::connection::Endpoint;
use crate::dsl::RunnableGraph;
use crate::graph::Graph;
use crate::interpreter::InterpreterBuilder;
use crate::island::Island;
use crate::logging::debug;
use crate::mat::{MatFn, MatSlots};
use crate::stages::reactive::async_boundary;
use futures::channel::mpsc;
use sluice_core::supervision::{self, Decider};
use sluice_core::{
    Attributes, CancellationToken, Result, StreamError, SubscriptionTimeoutMode,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Defaults applied to every stage a [`Materializer`] starts.
///
/// The settings become the outermost attributes of each materialization, so
/// attributes set on a graph or stage take precedence.
///
/// ```
/// use sluice_stream::MaterializerSettings;
///
/// let settings = MaterializerSettings::default()
///     .with_input_buffer(1, 8)
///     .with_event_limit(64);
///
/// assert_eq!(settings.max_input_buffer_size, 8);
/// assert_eq!(settings.event_limit, 64);
/// ```
#[derive(Clone)]
pub struct MaterializerSettings {
    /// Elements an async boundary requests up front.
    pub initial_input_buffer_size: usize,
    /// Elements an async boundary buffers at most.
    pub max_input_buffer_size: usize,
    /// Events processed per run-loop pass before an island yields.
    pub event_limit: usize,
    /// Reaction to substreams and publishers that are not subscribed in time.
    pub subscription_timeout_mode: SubscriptionTimeoutMode,
    /// Time allowed before the subscription timeout applies.
    pub subscription_timeout: Duration,
    /// Supervision policy for stages that do not set their own.
    pub decider: Decider,
    /// Prefix of island names in logs.
    pub name_prefix: String,
}

impl MaterializerSettings {
    /// Set the async boundary buffer.
    #[must_use]
    pub fn with_input_buffer(mut self, initial: usize, max: usize) -> Self {
        self.initial_input_buffer_size = initial.max(1);
        self.max_input_buffer_size = max.max(self.initial_input_buffer_size);
        self
    }

    /// Set the number of events processed per run-loop pass.
    #[must_use]
    pub fn with_event_limit(mut self, event_limit: usize) -> Self {
        self.event_limit = event_limit.max(1);
        self
    }

    /// Set the subscription timeout.
    #[must_use]
    pub const fn with_subscription_timeout(
        mut self,
        mode: SubscriptionTimeoutMode,
        timeout: Duration,
    ) -> Self {
        self.subscription_timeout_mode = mode;
        self.subscription_timeout = timeout;
        self
    }

    /// Set the default supervision decider.
    #[must_use]
    pub fn with_decider(mut self, decider: Decider) -> Self {
        self.decider = decider;
        self
    }

    /// Set the island name prefix.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// The settings expressed as attributes.
    #[must_use]
    pub fn to_attributes(&self) -> Attributes {
        Attributes::input_buffer(self.initial_input_buffer_size, self.max_input_buffer_size)
            .and(Attributes::subscription_timeout(
                self.subscription_timeout_mode,
                self.subscription_timeout,
            ))
            .and(Attributes::supervision(self.decider.clone()))
    }
}

impl Default for MaterializerSettings {
    fn default() -> Self {
        Self {
            initial_input_buffer_size: 4,
            max_input_buffer_size: 16,
            event_limit: 1000,
            subscription_timeout_mode: SubscriptionTimeoutMode::Cancel,
            subscription_timeout: Duration::from_secs(5),
            decider: supervision::stopping_decider(),
            name_prefix: "sluice".to_string(),
        }
    }
}

impl fmt::Debug for MaterializerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializerSettings")
            .field("initial_input_buffer_size", &self.initial_input_buffer_size)
            .field("max_input_buffer_size", &self.max_input_buffer_size)
            .field("event_limit", &self.event_limit)
            .field("subscription_timeout_mode", &self.subscription_timeout_mode)
            .field("subscription_timeout", &self.subscription_timeout)
            .field("name_prefix", &self.name_prefix)
            .finish_non_exhaustive()
    }
}

struct Inner {
    settings: MaterializerSettings,
    handle: Handle,
    shutdown: CancellationToken,
    island_seq: AtomicU64,
}

/// Starts graphs on a tokio runtime. Cheap to clone; clones share shutdown.
#[derive(Clone)]
pub struct Materializer {
    inner: Arc<Inner>,
}

impl Materializer {
    /// Materializer with default settings on the current tokio runtime.
    ///
    /// # Errors
    /// Fails when called outside of a tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_settings(MaterializerSettings::default())
    }

    /// Materializer with `settings` on the current tokio runtime.
    ///
    /// # Errors
    /// Fails when called outside of a tokio runtime.
    pub fn with_settings(settings: MaterializerSettings) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| StreamError::stream_error(format!("no tokio runtime available: {e}")))?;
        Ok(Self::from_handle(handle, settings))
    }

    /// Materializer spawning its islands through `handle`.
    #[must_use]
    pub fn from_handle(handle: Handle, settings: MaterializerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                handle,
                shutdown: CancellationToken::new(),
                island_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Settings applied to every materialization.
    #[must_use]
    pub fn settings(&self) -> &MaterializerSettings {
        &self.inner.settings
    }

    /// Start `graph` and return its materialized value.
    ///
    /// # Errors
    /// [`StreamError::InvalidGraph`] for unconnected or doubly connected ports,
    /// type mismatches and illegal cycles; [`StreamError::AbruptTermination`]
    /// after [`shutdown`](Self::shutdown); and any error a stage raises while
    /// being created.
    pub fn materialize<M: 'static>(&self, graph: &RunnableGraph<M>) -> Result<M> {
        self.run(&graph.graph, &graph.mat)
    }

    /// Abort every island started by this materializer.
    ///
    /// Stages see `post_stop` with an abrupt termination cause; further
    /// materializations fail.
    pub fn shutdown(&self) {
        debug!("materializer {} shutting down", self.inner.settings.name_prefix);
        self.inner.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub(crate) fn run<M: 'static>(&self, graph: &Graph, mat: &MatFn<M>) -> Result<M> {
        if self.is_shutdown() {
            return Err(StreamError::abrupt_termination(
                "materializer has been shut down",
            ));
        }
        graph.validate()?;

        let settings = &self.inner.settings;
        let defaults = settings.to_attributes();

        let mut islands: HashMap<&[u64], usize> = HashMap::new();
        let mut builders: Vec<InterpreterBuilder> = Vec::new();
        let mut placement = Vec::with_capacity(graph.nodes.len());
        let mut slots = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            let island = *islands.entry(node.islands.as_slice()).or_insert_with(|| {
                builders.push(InterpreterBuilder::new());
                builders.len() - 1
            });
            let attributes = node.attributes.nested_under(&defaults);
            let (logic, value) = node.stage.create(&attributes)?;
            let name = attributes
                .get_name()
                .map_or_else(|| node.stage.label().to_string(), str::to_string);
            let local = builders[island].add_stage(
                logic,
                attributes,
                name,
                node.stage.inlets().len(),
                node.stage.outlets().len(),
            );
            placement.push((island, local));
            slots.push(Some(value));
        }

        for edge in &graph.edges {
            let (from_island, from_stage) = placement[edge.from.node];
            let (to_island, to_stage) = placement[edge.to.node];
            let from = Endpoint {
                stage: from_stage,
                port: edge.from.index,
            };
            let to = Endpoint {
                stage: to_stage,
                port: edge.to.index,
            };
            if from_island == to_island {
                builders[from_island].connect(from, to);
                continue;
            }

            let (initial, max) = graph.nodes[edge.to.node]
                .attributes
                .nested_under(&defaults)
                .get_input_buffer()
                .unwrap_or((
                    settings.initial_input_buffer_size,
                    settings.max_input_buffer_size,
                ));
            let (publisher, subscriber) = async_boundary(initial, max);
            let upstream = builders[from_island].add_stage(
                publisher,
                defaults.clone(),
                "boundary-out".to_string(),
                1,
                0,
            );
            builders[from_island].connect(
                from,
                Endpoint {
                    stage: upstream,
                    port: 0,
                },
            );
            let downstream = builders[to_island].add_stage(
                subscriber,
                defaults.clone(),
                "boundary-in".to_string(),
                0,
                1,
            );
            builders[to_island].connect(
                Endpoint {
                    stage: downstream,
                    port: 0,
                },
                to,
            );
        }

        let mut runnable = Vec::with_capacity(builders.len());
        for builder in builders {
            let seq = self.inner.island_seq.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = mpsc::unbounded();
            let name = format!("{}-{seq}", settings.name_prefix);
            runnable.push((builder.build(sender, self.clone(), name), receiver));
        }

        // Unspawned interpreters abort their stages when dropped.
        let value = mat(&mut MatSlots::new(slots), 0)?;

        debug!(
            "materialized {} stages into {} islands",
            graph.nodes.len(),
            runnable.len()
        );
        for (interpreter, receiver) in runnable {
            let island = Island::new(interpreter, receiver, self.inner.shutdown.clone());
            self.inner.handle.spawn(island.run());
        }
        Ok(value)
    }
}

impl fmt::Debug for Materializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materializer")
            .field("settings", &self.inner.settings)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
