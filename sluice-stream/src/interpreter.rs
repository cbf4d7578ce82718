// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Single-threaded scheduling core of one island.
//!
//! Port operations performed by a stage update the connection immediately and
//! enqueue an event for the stage at the other end. [`GraphInterpreter::execute`]
//! delivers queued events in FIFO order, invoking one stage callback per event,
//! and applies supervision to whatever the callback returns.

use crate::async_callback::{IslandEvent, Mailbox};
use crate::connection::{Connection, Endpoint};
use crate::context::StageContext;
use crate::logging::{debug, error, trace, warn};
use crate::logic::{StageLogic, TimerKey};
use crate::materializer::Materializer;
use crate::port::Element;
use sluice_core::supervision::{self, Directive};
use sluice_core::{Attributes, Result, StreamError, StreamTask};
use sluice_runtime::timer::Timer;
use sluice_runtime::TokioTimer;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

pub(crate) enum Event {
    Push(usize),
    Pull(usize),
    Complete(usize),
    Fail(usize, StreamError),
    Cancel(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Created,
    Starting,
    Running,
    Completing,
    Failing,
    Stopped,
}

pub(crate) struct TimerEntry {
    generation: u64,
    repeating: bool,
    _task: StreamTask,
}

pub(crate) struct StageState {
    pub(crate) inlets: Vec<usize>,
    pub(crate) outlets: Vec<usize>,
    pub(crate) attributes: Attributes,
    pub(crate) name: String,
    pub(crate) keep_going: bool,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) timers: HashMap<TimerKey, TimerEntry>,
    pub(crate) tasks: HashMap<u64, StreamTask>,
}

/// Everything a [`StageContext`] may touch: connections, stage bookkeeping and
/// the event queue. Kept apart from the logics so a callback can borrow both.
pub(crate) struct InterpreterCore {
    pub(crate) connections: Vec<Connection>,
    pub(crate) stages: Vec<StageState>,
    pub(crate) events: VecDeque<Event>,
    pub(crate) mailbox: Mailbox,
    pub(crate) materializer: Materializer,
    pub(crate) island: String,
    next_id: u64,
}

impl InterpreterCore {
    pub(crate) fn inlet(&self, stage: usize, index: usize) -> Option<&Connection> {
        let conn = *self.stages.get(stage)?.inlets.get(index)?;
        self.connections.get(conn)
    }

    pub(crate) fn outlet(&self, stage: usize, index: usize) -> Option<&Connection> {
        let conn = *self.stages.get(stage)?.outlets.get(index)?;
        self.connections.get(conn)
    }

    fn inlet_conn(&self, stage: usize, index: usize) -> Result<usize> {
        self.stages[stage].inlets.get(index).copied().ok_or_else(|| {
            StreamError::protocol_violation(format!(
                "stage {} has no inlet {index}",
                self.stages[stage].name
            ))
        })
    }

    fn outlet_conn(&self, stage: usize, index: usize) -> Result<usize> {
        self.stages[stage].outlets.get(index).copied().ok_or_else(|| {
            StreamError::protocol_violation(format!(
                "stage {} has no outlet {index}",
                self.stages[stage].name
            ))
        })
    }

    fn violation(&self, stage: usize, error: StreamError) -> StreamError {
        match error {
            StreamError::ProtocolViolation { context } => StreamError::protocol_violation(
                format!("{context} (stage {})", self.stages[stage].name),
            ),
            other => other,
        }
    }

    pub(crate) fn pull(&mut self, stage: usize, inlet: usize) -> Result<()> {
        let conn = self.inlet_conn(stage, inlet)?;
        match self.connections[conn].pull() {
            Ok(true) => {
                self.events.push_back(Event::Pull(conn));
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(self.violation(stage, e)),
        }
    }

    pub(crate) fn grab(&mut self, stage: usize, inlet: usize) -> Result<Element> {
        let conn = self.inlet_conn(stage, inlet)?;
        self.connections[conn]
            .grab()
            .map_err(|e| self.violation(stage, e))
    }

    pub(crate) fn push(&mut self, stage: usize, outlet: usize, element: Element) -> Result<()> {
        let conn = self.outlet_conn(stage, outlet)?;
        if !self.connections[conn].emit_queue.is_empty() {
            return Err(self.violation(
                stage,
                StreamError::protocol_violation("push on an outlet with queued emissions"),
            ));
        }
        match self.connections[conn].push(element) {
            Ok(true) => {
                self.events.push_back(Event::Push(conn));
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(self.violation(stage, e)),
        }
    }

    pub(crate) fn emit(&mut self, stage: usize, outlet: usize, element: Element) -> Result<()> {
        let conn = self.outlet_conn(stage, outlet)?;
        let connection = &mut self.connections[conn];
        if connection.is_out_closed() || connection.complete_after_emit {
            return Err(self.violation(
                stage,
                StreamError::protocol_violation("emit on a completed outlet"),
            ));
        }
        if connection.is_cancelled() {
            return Ok(());
        }
        if connection.outlet_available() {
            return self.push(stage, outlet, element);
        }
        connection.emit_queue.push_back(element);
        Ok(())
    }

    pub(crate) fn complete(&mut self, stage: usize, outlet: usize) -> Result<()> {
        let conn = self.outlet_conn(stage, outlet)?;
        let connection = &mut self.connections[conn];
        if !connection.emit_queue.is_empty() && !connection.is_out_closed() {
            connection.complete_after_emit = true;
            return Ok(());
        }
        match connection.close_out() {
            Ok(true) => {
                self.events.push_back(Event::Complete(conn));
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(self.violation(stage, e)),
        }
    }

    pub(crate) fn fail(&mut self, stage: usize, outlet: usize, error: StreamError) -> Result<()> {
        let conn = self.outlet_conn(stage, outlet)?;
        match self.connections[conn].close_out() {
            Ok(true) => {
                self.events.push_back(Event::Fail(conn, error));
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(self.violation(stage, e)),
        }
    }

    pub(crate) fn cancel(&mut self, stage: usize, inlet: usize) -> Result<()> {
        let conn = self.inlet_conn(stage, inlet)?;
        if self.connections[conn].cancel() {
            self.events.push_back(Event::Cancel(conn));
        }
        Ok(())
    }

    pub(crate) fn complete_stage(&mut self, stage: usize) {
        for index in 0..self.stages[stage].outlets.len() {
            let conn = self.stages[stage].outlets[index];
            if self.connections[conn].is_out_closed() {
                continue;
            }
            // Cannot fail: the outlet is still open.
            let _ = self.complete(stage, index);
        }
        for index in 0..self.stages[stage].inlets.len() {
            let _ = self.cancel(stage, index);
        }
        let state = &mut self.stages[stage];
        if matches!(state.lifecycle, Lifecycle::Starting | Lifecycle::Running) {
            state.lifecycle = Lifecycle::Completing;
        }
    }

    pub(crate) fn fail_stage(&mut self, stage: usize, error: StreamError) {
        for index in 0..self.stages[stage].outlets.len() {
            let conn = self.stages[stage].outlets[index];
            if self.connections[conn].is_out_closed() {
                continue;
            }
            let _ = self.fail(stage, index, error.clone());
        }
        for index in 0..self.stages[stage].inlets.len() {
            let _ = self.cancel(stage, index);
        }
        let state = &mut self.stages[stage];
        if state.lifecycle != Lifecycle::Stopped {
            state.lifecycle = Lifecycle::Failing;
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn run_future<F>(&mut self, stage: usize, future: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = self.next_id();
        let mailbox = self.mailbox.clone();
        let task = StreamTask::spawn_cancellable(async move {
            let output = future.await;
            let _ = mailbox.unbounded_send(IslandEvent::Async {
                stage,
                task: Some(id),
                payload: Box::new(output),
            });
        });
        self.stages[stage].tasks.insert(id, task);
    }

    pub(crate) fn schedule(
        &mut self,
        stage: usize,
        key: TimerKey,
        initial_delay: Duration,
        interval: Option<Duration>,
    ) {
        let generation = self.next_id();
        let mailbox = self.mailbox.clone();
        let timer = TokioTimer;
        let task = StreamTask::spawn_cancellable(async move {
            timer.sleep_future(initial_delay).await;
            let fire = IslandEvent::Timer {
                stage,
                key,
                generation,
            };
            if mailbox.unbounded_send(fire).is_err() {
                return;
            }
            if let Some(interval) = interval {
                loop {
                    timer.sleep_future(interval).await;
                    let fire = IslandEvent::Timer {
                        stage,
                        key,
                        generation,
                    };
                    if mailbox.unbounded_send(fire).is_err() {
                        return;
                    }
                }
            }
        });
        self.stages[stage].timers.insert(
            key,
            TimerEntry {
                generation,
                repeating: interval.is_some(),
                _task: task,
            },
        );
    }

    pub(crate) fn directive(&self, stage: usize, error: &StreamError) -> Directive {
        let decider = self.stages[stage]
            .attributes
            .get_decider()
            .unwrap_or_else(supervision::stopping_decider);
        decider(error)
    }

    fn ports_closed(&self, stage: usize) -> bool {
        let state = &self.stages[stage];
        state
            .inlets
            .iter()
            .all(|&conn| self.connections[conn].inlet_closed())
            && state
                .outlets
                .iter()
                .all(|&conn| self.connections[conn].outlet_closed())
    }
}

/// Which event a callback was reacting to, for supervision.
#[derive(Clone, Copy)]
enum Origin {
    PreStart,
    Push(usize),
    Pull(usize),
    Signal,
}

/// Assembles the stages and connections of one island.
pub(crate) struct InterpreterBuilder {
    logics: Vec<Box<dyn StageLogic>>,
    stages: Vec<StageState>,
    connections: Vec<Connection>,
}

impl InterpreterBuilder {
    pub(crate) const fn new() -> Self {
        Self {
            logics: Vec::new(),
            stages: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub(crate) fn add_stage(
        &mut self,
        logic: Box<dyn StageLogic>,
        attributes: Attributes,
        name: String,
        inlets: usize,
        outlets: usize,
    ) -> usize {
        self.logics.push(logic);
        self.stages.push(StageState {
            inlets: vec![usize::MAX; inlets],
            outlets: vec![usize::MAX; outlets],
            attributes,
            name,
            keep_going: false,
            lifecycle: Lifecycle::Created,
            timers: HashMap::new(),
            tasks: HashMap::new(),
        });
        self.stages.len() - 1
    }

    pub(crate) fn connect(&mut self, from: Endpoint, to: Endpoint) {
        let id = self.connections.len();
        self.connections.push(Connection::new(from, to));
        self.stages[from.stage].outlets[from.port] = id;
        self.stages[to.stage].inlets[to.port] = id;
    }

    pub(crate) fn build(
        self,
        mailbox: Mailbox,
        materializer: Materializer,
        island: String,
    ) -> GraphInterpreter {
        let event_limit = materializer.settings().event_limit.max(1);
        GraphInterpreter {
            logics: self.logics,
            core: InterpreterCore {
                connections: self.connections,
                stages: self.stages,
                events: VecDeque::new(),
                mailbox,
                materializer,
                island,
                next_id: 0,
            },
            event_limit,
        }
    }
}

/// Runs the stages of one island.
pub(crate) struct GraphInterpreter {
    logics: Vec<Box<dyn StageLogic>>,
    core: InterpreterCore,
    event_limit: usize,
}

impl GraphInterpreter {
    pub(crate) fn island(&self) -> &str {
        &self.core.island
    }

    pub(crate) fn stage_count(&self) -> usize {
        self.logics.len()
    }

    /// Run `pre_start` of every stage.
    pub(crate) fn start(&mut self) {
        for stage in 0..self.logics.len() {
            if self.core.stages[stage].lifecycle != Lifecycle::Created {
                continue;
            }
            self.core.stages[stage].lifecycle = Lifecycle::Starting;
            self.invoke(stage, Origin::PreStart, |logic, ctx| logic.pre_start(ctx));
            let state = &mut self.core.stages[stage];
            if state.lifecycle == Lifecycle::Starting {
                state.lifecycle = Lifecycle::Running;
            }
        }
    }

    /// Deliver up to `event_limit` queued events. Returns whether more are queued.
    pub(crate) fn execute(&mut self) -> bool {
        for _ in 0..self.event_limit {
            let Some(event) = self.core.events.pop_front() else {
                break;
            };
            self.dispatch(event);
        }
        !self.core.events.is_empty()
    }

    /// Most events handled between two yields to the executor.
    pub(crate) const fn event_limit(&self) -> usize {
        self.event_limit
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.core
            .stages
            .iter()
            .all(|state| state.lifecycle == Lifecycle::Stopped)
    }

    pub(crate) fn handle_island_event(&mut self, event: IslandEvent) {
        match event {
            IslandEvent::Async {
                stage,
                task,
                payload,
            } => {
                let Some(state) = self.core.stages.get_mut(stage) else {
                    return;
                };
                if let Some(task) = task {
                    if state.tasks.remove(&task).is_none() {
                        return;
                    }
                }
                if state.lifecycle == Lifecycle::Stopped {
                    return;
                }
                self.invoke(stage, Origin::Signal, move |logic, ctx| {
                    logic.on_async(ctx, payload)
                });
            }
            IslandEvent::Timer {
                stage,
                key,
                generation,
            } => {
                let Some(state) = self.core.stages.get_mut(stage) else {
                    return;
                };
                let repeating = match state.timers.get(&key) {
                    Some(entry) if entry.generation == generation => entry.repeating,
                    _ => return,
                };
                if !repeating {
                    state.timers.remove(&key);
                }
                if state.lifecycle == Lifecycle::Stopped {
                    return;
                }
                self.invoke(stage, Origin::Signal, |logic, ctx| logic.on_timer(ctx, key));
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Push(conn) => {
                let connection = &mut self.core.connections[conn];
                if !connection.deliver_push() {
                    return;
                }
                let Endpoint { stage, port } = connection.to;
                if self.is_stopped(stage) {
                    return;
                }
                trace!("{}: push to {} inlet {}", self.core.island, self.core.stages[stage].name, port);
                self.invoke(stage, Origin::Push(conn), |logic, ctx| {
                    logic.on_push(ctx, port)
                });
            }
            Event::Pull(conn) => {
                let connection = &mut self.core.connections[conn];
                if !connection.deliver_pull() {
                    return;
                }
                let Endpoint { stage, port } = connection.from;
                if self.is_stopped(stage) {
                    return;
                }
                if self.core.connections[conn].can_drain_emit() {
                    self.drain_emit(conn);
                    self.maybe_finalize(stage);
                    return;
                }
                trace!("{}: pull from {} outlet {}", self.core.island, self.core.stages[stage].name, port);
                self.invoke(stage, Origin::Pull(conn), |logic, ctx| {
                    logic.on_pull(ctx, port)
                });
            }
            Event::Complete(conn) => {
                let connection = &mut self.core.connections[conn];
                if !connection.deliver_finish() {
                    return;
                }
                let Endpoint { stage, port } = connection.to;
                if self.is_stopped(stage) {
                    return;
                }
                self.invoke(stage, Origin::Signal, |logic, ctx| {
                    logic.on_upstream_finish(ctx, port)
                });
            }
            Event::Fail(conn, error) => {
                let connection = &mut self.core.connections[conn];
                if !connection.deliver_finish() {
                    return;
                }
                let Endpoint { stage, port } = connection.to;
                if self.is_stopped(stage) {
                    return;
                }
                self.invoke(stage, Origin::Signal, move |logic, ctx| {
                    logic.on_upstream_failure(ctx, port, error)
                });
            }
            Event::Cancel(conn) => {
                let connection = &mut self.core.connections[conn];
                if !connection.deliver_cancel() {
                    return;
                }
                let Endpoint { stage, port } = connection.from;
                if self.is_stopped(stage) {
                    return;
                }
                self.invoke(stage, Origin::Signal, |logic, ctx| {
                    logic.on_downstream_finish(ctx, port)
                });
            }
        }
    }

    /// Answer a delivered pull from the outlet's emission queue.
    fn drain_emit(&mut self, conn: usize) {
        let connection = &mut self.core.connections[conn];
        let Some(element) = connection.emit_queue.pop_front() else {
            return;
        };
        let drained = connection.emit_queue.is_empty();
        let complete = drained && connection.complete_after_emit;
        match connection.push(element) {
            Ok(true) => self.core.events.push_back(Event::Push(conn)),
            Ok(false) => {}
            Err(e) => {
                self.abort(e);
                return;
            }
        }
        if complete {
            let connection = &mut self.core.connections[conn];
            connection.complete_after_emit = false;
            if let Ok(true) = connection.close_out() {
                self.core.events.push_back(Event::Complete(conn));
            }
        }
    }

    fn is_stopped(&self, stage: usize) -> bool {
        self.core.stages[stage].lifecycle == Lifecycle::Stopped
    }

    fn invoke<F>(&mut self, stage: usize, origin: Origin, callback: F)
    where
        F: FnOnce(&mut dyn StageLogic, &mut StageContext<'_>) -> Result<()>,
    {
        let Self { logics, core, .. } = self;
        let logic = logics[stage].as_mut();
        let mut ctx = StageContext::new(core, stage);
        let result = catch_unwind(AssertUnwindSafe(|| callback(logic, &mut ctx)))
            .unwrap_or_else(|panic| Err(panic_error(panic.as_ref())));

        if let Err(error) = result {
            self.handle_failure(stage, origin, error);
        }
        self.maybe_finalize(stage);
    }

    fn handle_failure(&mut self, stage: usize, origin: Origin, error: StreamError) {
        if error.is_fatal() {
            self.abort(error);
            return;
        }
        if matches!(origin, Origin::PreStart | Origin::Signal) {
            debug!("stage {} failed: {}", self.core.stages[stage].name, error);
            self.core.fail_stage(stage, error);
            return;
        }

        let directive = self.core.directive(stage, &error);
        match directive {
            Directive::Stop => {
                warn!("stopping stage {}: {}", self.core.stages[stage].name, error);
                self.core.fail_stage(stage, error);
            }
            Directive::Resume | Directive::Restart => {
                debug!(
                    "stage {}: {:?} after error: {}",
                    self.core.stages[stage].name,
                    directive,
                    error
                );
                if directive == Directive::Restart {
                    let logic = &mut self.logics[stage];
                    if catch_unwind(AssertUnwindSafe(|| logic.restart())).is_err() {
                        self.core
                            .fail_stage(stage, StreamError::stream_error("restart panicked"));
                        return;
                    }
                }
                self.recover(stage, origin);
            }
        }
    }

    /// Continue after a dropped element: re-request on the failing port.
    fn recover(&mut self, stage: usize, origin: Origin) {
        match origin {
            Origin::Push(conn) => {
                let connection = &mut self.core.connections[conn];
                connection.discard_pushed();
                if connection.inlet_closed() || connection.has_been_pulled() {
                    return;
                }
                let port = connection.to.port;
                if let Err(e) = self.core.pull(stage, port) {
                    self.abort(e);
                }
            }
            Origin::Pull(conn) => {
                if self.core.connections[conn].outlet_available() {
                    self.core.events.push_back(Event::Pull(conn));
                }
            }
            Origin::PreStart | Origin::Signal => {}
        }
    }

    fn maybe_finalize(&mut self, stage: usize) {
        let state = &self.core.stages[stage];
        if state.lifecycle == Lifecycle::Stopped {
            return;
        }
        let requested = matches!(state.lifecycle, Lifecycle::Completing | Lifecycle::Failing);
        if state.keep_going && !requested {
            return;
        }
        if self.core.ports_closed(stage) {
            self.stop_stage(stage, None);
        }
    }

    fn stop_stage(&mut self, stage: usize, abort_cause: Option<&StreamError>) {
        let state = &mut self.core.stages[stage];
        state.lifecycle = Lifecycle::Stopped;
        state.timers.clear();
        state.tasks.clear();
        trace!("{}: stage {} stopped", self.core.island, state.name);

        let logic = &mut self.logics[stage];
        if catch_unwind(AssertUnwindSafe(|| logic.post_stop(abort_cause))).is_err() {
            error!("post_stop of stage {} panicked", self.core.stages[stage].name);
        }
    }

    /// Stop every remaining stage with `cause`; queued events are discarded.
    pub(crate) fn abort(&mut self, cause: StreamError) {
        if cause.is_abrupt_termination() {
            debug!("aborting island {}: {}", self.core.island, cause);
        } else {
            error!("aborting island {}: {}", self.core.island, cause);
        }
        self.core.events.clear();
        for stage in 0..self.logics.len() {
            if !self.is_stopped(stage) {
                self.stop_stage(stage, Some(&cause));
            }
        }
    }
}

impl Drop for GraphInterpreter {
    fn drop(&mut self) {
        if !self.is_finished() {
            self.abort(StreamError::abrupt_termination(format!(
                "island {} was dropped",
                self.core.island
            )));
        }
    }
}

fn panic_error(panic: &(dyn Any + Send)) -> StreamError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    StreamError::CallbackPanic { context: message }
}
