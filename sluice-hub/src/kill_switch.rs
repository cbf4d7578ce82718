// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! External handles that stop running flows.
//!
//! A kill switch flow passes elements through unchanged. Triggering the switch
//! completes (shutdown) or fails (abort) downstream and cancels upstream of
//! every flow bound to it. A flow bound after the switch was triggered stops
//! as soon as it starts. Only the first trigger counts.

use crate::logging::debug;
use parking_lot::Mutex;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use sluice_stream::{
    downcast_event, AsyncCallback, Flow, FlowShape, GraphStage, StageContext, StageLogic,
};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Something that can stop the flows it controls.
pub trait KillSwitch {
    /// Complete downstream and cancel upstream.
    fn shutdown(&self);

    /// Fail downstream with `error` and cancel upstream.
    fn abort(&self, error: StreamError);
}

/// Factory for kill switch flows.
///
/// # Examples
///
/// ```
/// use sluice_hub::{KillSwitch, KillSwitches};
/// use sluice_stream::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let (switch, done) = Source::repeat(1)
///     .via_mat(KillSwitches::single(), Keep::right)
///     .to_mat(Sink::ignore(), Keep::both)
///     .run_with(&Materializer::new()?)?;
///
/// switch.shutdown();
/// done.await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct KillSwitches;

impl KillSwitches {
    /// Flow materializing its own [`UniqueKillSwitch`].
    #[must_use]
    pub fn single<T: Send + 'static>() -> Flow<T, T, UniqueKillSwitch> {
        Flow::from_graph_stage(UniqueSwitchStage {
            _marker: PhantomData,
        })
    }

    /// Switch that any number of flows can be bound to through
    /// [`SharedKillSwitch::flow`].
    #[must_use]
    pub fn shared(name: impl Into<String>) -> SharedKillSwitch {
        SharedKillSwitch::new(name)
    }
}

type Trigger = Result<()>;

struct SwitchState {
    outcome: Option<Trigger>,
    bound: HashMap<u64, AsyncCallback<Trigger>>,
    next_id: u64,
}

/// Shared state behind a switch. The first trigger wins a compare-and-swap on
/// `triggered`; binding and the hand-over of bound flows share one lock, so a
/// flow never misses a trigger.
#[derive(Clone)]
struct SwitchCore {
    name: Arc<str>,
    triggered: Arc<AtomicBool>,
    state: Arc<Mutex<SwitchState>>,
}

impl SwitchCore {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            triggered: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(SwitchState {
                outcome: None,
                bound: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Returns whether this call triggered the switch.
    fn trigger(&self, outcome: Trigger) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let bound = {
            let mut state = self.state.lock();
            state.outcome = Some(outcome.clone());
            mem::take(&mut state.bound)
        };
        debug!("kill switch {} triggered for {} flows", self.name, bound.len());
        for callback in bound.into_values() {
            callback.invoke(outcome.clone());
        }
        true
    }

    /// Bind a flow; hands back the outcome instead when already triggered.
    fn bind(&self, callback: AsyncCallback<Trigger>) -> std::result::Result<u64, Trigger> {
        let mut state = self.state.lock();
        if let Some(outcome) = &state.outcome {
            return Err(outcome.clone());
        }
        let id = state.next_id;
        state.next_id += 1;
        state.bound.insert(id, callback);
        Ok(id)
    }

    fn unbind(&self, id: u64) {
        self.state.lock().bound.remove(&id);
    }

    fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    fn bound_flows(&self) -> usize {
        self.state.lock().bound.len()
    }
}

/// Kill switch controlling exactly one materialized flow.
#[derive(Clone)]
pub struct UniqueKillSwitch {
    core: SwitchCore,
}

impl UniqueKillSwitch {
    /// Whether shutdown or abort was called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.core.is_triggered()
    }
}

impl KillSwitch for UniqueKillSwitch {
    fn shutdown(&self) {
        self.core.trigger(Ok(()));
    }

    fn abort(&self, error: StreamError) {
        self.core.trigger(Err(error));
    }
}

impl fmt::Debug for UniqueKillSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueKillSwitch")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

/// Kill switch that any number of flows can bind to, before or after it is
/// triggered.
///
/// # Examples
///
/// ```
/// use sluice_core::StreamError;
/// use sluice_hub::{KillSwitch, SharedKillSwitch};
/// use sluice_stream::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sluice_core::Result<()> {
/// let materializer = Materializer::new()?;
/// let switch = SharedKillSwitch::new("ingest");
/// let first = Source::repeat(1).via(switch.flow()).run_with(Sink::ignore(), &materializer)?;
/// let second = Source::repeat(2).via(switch.flow()).run_with(Sink::ignore(), &materializer)?;
///
/// switch.abort(StreamError::stream_error("stop"));
/// assert!(first.await.is_err());
/// assert!(second.await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SharedKillSwitch {
    core: SwitchCore,
}

impl SharedKillSwitch {
    /// Untriggered switch named `name` in logs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: SwitchCore::new(&name.into()),
        }
    }

    /// Pass-through flow bound to this switch each time it is materialized.
    #[must_use]
    pub fn flow<T: Send + 'static>(&self) -> Flow<T, T> {
        Flow::from_graph_stage(SharedSwitchStage {
            core: self.core.clone(),
            _marker: PhantomData,
        })
    }

    /// Name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Whether shutdown or abort was called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.core.is_triggered()
    }

    /// Number of running flows currently bound.
    #[must_use]
    pub fn bound_flows(&self) -> usize {
        self.core.bound_flows()
    }
}

impl KillSwitch for SharedKillSwitch {
    fn shutdown(&self) {
        self.core.trigger(Ok(()));
    }

    fn abort(&self, error: StreamError) {
        self.core.trigger(Err(error));
    }
}

impl fmt::Debug for SharedKillSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKillSwitch")
            .field("name", &self.name())
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

struct UniqueSwitchStage<T> {
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + 'static> GraphStage for UniqueSwitchStage<T> {
    type Shape = FlowShape<T, T>;
    type Mat = UniqueKillSwitch;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name("kill_switch")
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, UniqueKillSwitch)> {
        let core = SwitchCore::new("unique");
        let logic = SwitchLogic::new(self.shape(), core.clone());
        Ok((Box::new(logic), UniqueKillSwitch { core }))
    }
}

struct SharedSwitchStage<T> {
    core: SwitchCore,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + 'static> GraphStage for SharedSwitchStage<T> {
    type Shape = FlowShape<T, T>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        FlowShape::new()
    }

    fn initial_attributes(&self) -> Attributes {
        Attributes::name(format!("kill_switch-{}", self.core.name))
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        let logic = SwitchLogic::new(self.shape(), self.core.clone());
        Ok((Box::new(logic), NotUsed))
    }
}

struct SwitchLogic<T> {
    shape: FlowShape<T, T>,
    core: SwitchCore,
    binding: Option<u64>,
}

impl<T: Send + 'static> SwitchLogic<T> {
    const fn new(shape: FlowShape<T, T>, core: SwitchCore) -> Self {
        Self {
            shape,
            core,
            binding: None,
        }
    }

    fn apply(ctx: &mut StageContext<'_>, outcome: Trigger) -> Result<()> {
        match outcome {
            Ok(()) => ctx.complete_stage(),
            Err(error) => ctx.fail_stage(error),
        }
    }
}

impl<T: Send + 'static> StageLogic for SwitchLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        match self.core.bind(ctx.async_callback()) {
            Ok(id) => {
                self.binding = Some(id);
                Ok(())
            }
            Err(outcome) => Self::apply(ctx, outcome),
        }
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        ctx.push(self.shape.outlet, element)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.pull(self.shape.inlet)
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        self.binding = None;
        let outcome = downcast_event::<Trigger>(event)?;
        Self::apply(ctx, outcome)
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        if let Some(id) = self.binding.take() {
            self.core.unbind(id);
        }
    }
}
