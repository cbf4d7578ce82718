// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The view a running stage has of its ports, timers and island.

use crate::async_callback::AsyncCallback;
use crate::interpreter::InterpreterCore;
use crate::logic::TimerKey;
use crate::materializer::Materializer;
use crate::port::{Element, Inlet, Outlet, PortHandle, PortId};
use sluice_core::supervision::Directive;
use sluice_core::{Attributes, Result, StreamError};
use std::any::type_name;
use std::future::Future;
use std::time::Duration;

/// Handle passed to every [`StageLogic`](crate::StageLogic) callback.
///
/// All port operations follow the demand protocol: an outlet may be pushed once
/// per pull it received, an inlet may be pulled once per element. Breaking these
/// rules returns [`StreamError::ProtocolViolation`], which aborts the region.
pub struct StageContext<'a> {
    core: &'a mut InterpreterCore,
    stage: usize,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(core: &'a mut InterpreterCore, stage: usize) -> Self {
        Self { core, stage }
    }

    /// Request one element on `inlet`. Pulling a closed inlet does nothing.
    ///
    /// # Errors
    /// Protocol violation when the inlet was already pulled.
    pub fn pull<T>(&mut self, inlet: Inlet<T>) -> Result<()> {
        self.core.pull(self.stage, inlet.index)
    }

    /// Pull `inlet` unless it is closed or already pulled.
    ///
    /// # Errors
    /// Only when the inlet index is unknown to the stage.
    pub fn try_pull<T>(&mut self, inlet: Inlet<T>) -> Result<()> {
        if self.is_closed(inlet) || self.has_been_pulled(inlet) {
            return Ok(());
        }
        self.pull(inlet)
    }

    /// Take the element pushed to `inlet`.
    ///
    /// # Errors
    /// Protocol violation when no element is available or the element has an
    /// unexpected type.
    pub fn grab<T: Send + 'static>(&mut self, inlet: Inlet<T>) -> Result<T> {
        let element = self.core.grab(self.stage, inlet.index)?;
        element.downcast::<T>().map(|element| *element).map_err(|_| {
            StreamError::protocol_violation(format!(
                "element on inlet {} is not a {}",
                inlet.index,
                type_name::<T>()
            ))
        })
    }

    /// Send `element` downstream. Requires demand on `outlet`.
    ///
    /// # Errors
    /// Protocol violation without demand or after the outlet was closed.
    pub fn push<T: Send + 'static>(&mut self, outlet: Outlet<T>, element: T) -> Result<()> {
        self.core.push(self.stage, outlet.index, Box::new(element))
    }

    /// Push `element` now if there is demand, otherwise queue it until there is.
    ///
    /// While emissions are queued the outlet reports itself unavailable and pulls
    /// are answered from the queue without calling `on_pull`.
    ///
    /// # Errors
    /// Protocol violation when the outlet was already closed.
    pub fn emit<T: Send + 'static>(&mut self, outlet: Outlet<T>, element: T) -> Result<()> {
        self.core.emit(self.stage, outlet.index, Box::new(element))
    }

    /// [`emit`](Self::emit) every element of `elements` in order.
    ///
    /// # Errors
    /// Protocol violation when the outlet was already closed.
    pub fn emit_multiple<T, I>(&mut self, outlet: Outlet<T>, elements: I) -> Result<()>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
    {
        for element in elements {
            self.emit(outlet, element)?;
        }
        Ok(())
    }

    /// Complete `outlet`, after any queued emissions.
    ///
    /// # Errors
    /// Protocol violation when the outlet was already completed or failed.
    pub fn complete<T>(&mut self, outlet: Outlet<T>) -> Result<()> {
        self.core.complete(self.stage, outlet.index)
    }

    /// Fail `outlet` with `error`, discarding queued emissions.
    ///
    /// # Errors
    /// Protocol violation when the outlet was already completed or failed.
    pub fn fail<T>(&mut self, outlet: Outlet<T>, error: StreamError) -> Result<()> {
        self.core.fail(self.stage, outlet.index, error)
    }

    /// Cancel `inlet`. Idempotent.
    ///
    /// # Errors
    /// Only when the inlet index is unknown to the stage.
    pub fn cancel<T>(&mut self, inlet: Inlet<T>) -> Result<()> {
        self.core.cancel(self.stage, inlet.index)
    }

    /// For an inlet: an element can be grabbed. For an outlet: it can be pushed.
    pub fn is_available(&self, port: impl PortHandle) -> bool {
        match port.port_id() {
            PortId::In(index) => self
                .core
                .inlet(self.stage, index)
                .is_some_and(|conn| conn.inlet_available()),
            PortId::Out(index) => self
                .core
                .outlet(self.stage, index)
                .is_some_and(|conn| conn.outlet_available()),
        }
    }

    /// Whether the port will see no further elements or demand.
    pub fn is_closed(&self, port: impl PortHandle) -> bool {
        match port.port_id() {
            PortId::In(index) => self
                .core
                .inlet(self.stage, index)
                .map_or(true, |conn| conn.inlet_closed()),
            PortId::Out(index) => self
                .core
                .outlet(self.stage, index)
                .map_or(true, |conn| conn.outlet_closed()),
        }
    }

    /// Whether `inlet` was pulled and its element has not arrived yet.
    pub fn has_been_pulled<T>(&self, inlet: Inlet<T>) -> bool {
        self.core
            .inlet(self.stage, inlet.index)
            .is_some_and(|conn| conn.has_been_pulled())
    }

    /// Complete every outlet (after queued emissions) and cancel every inlet.
    ///
    /// # Errors
    /// Never fails; returns `Result` so callbacks can end with it.
    pub fn complete_stage(&mut self) -> Result<()> {
        self.core.complete_stage(self.stage);
        Ok(())
    }

    /// Fail every outlet with `error` and cancel every inlet.
    ///
    /// # Errors
    /// Never fails; returns `Result` so callbacks can end with it.
    pub fn fail_stage(&mut self, error: StreamError) -> Result<()> {
        self.core.fail_stage(self.stage, error);
        Ok(())
    }

    /// Keep the stage alive after all of its ports have closed, until it calls
    /// [`complete_stage`](Self::complete_stage) or
    /// [`fail_stage`](Self::fail_stage).
    pub fn set_keep_going(&mut self, keep_going: bool) {
        self.core.stages[self.stage].keep_going = keep_going;
    }

    /// Callback that feeds events of type `E` into this stage's `on_async`.
    pub fn async_callback<E: Send + 'static>(&self) -> AsyncCallback<E> {
        AsyncCallback::new(self.stage, self.core.mailbox.clone())
    }

    /// Run `future` on the runtime and deliver its output to `on_async`.
    ///
    /// The future is dropped if the stage stops first.
    pub fn run_future<F>(&mut self, future: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.core.run_future(self.stage, future);
    }

    /// Fire `on_timer(key)` once after `delay`, replacing a timer with the same key.
    pub fn schedule_once(&mut self, key: TimerKey, delay: Duration) {
        self.core.schedule(self.stage, key, delay, None);
    }

    /// Fire `on_timer(key)` after `initial_delay` and then every `interval`.
    pub fn schedule_repeatedly(&mut self, key: TimerKey, initial_delay: Duration, interval: Duration) {
        self.core
            .schedule(self.stage, key, initial_delay, Some(interval));
    }

    /// Cancel timer `key`. A firing that is already queued is discarded.
    pub fn cancel_timer(&mut self, key: TimerKey) {
        self.core.stages[self.stage].timers.remove(&key);
    }

    /// Whether timer `key` is scheduled.
    pub fn is_timer_active(&self, key: TimerKey) -> bool {
        self.core.stages[self.stage].timers.contains_key(&key)
    }

    /// Effective attributes of the stage.
    pub fn attributes(&self) -> &Attributes {
        &self.core.stages[self.stage].attributes
    }

    /// Ask the stage's supervision decider about `error`.
    ///
    /// Stages that finish work asynchronously use this to apply supervision to
    /// failures the interpreter never sees.
    pub fn supervision_directive(&self, error: &StreamError) -> Directive {
        self.core.directive(self.stage, error)
    }

    /// Materializer that started this stage; used to run nested streams.
    pub fn materializer(&self) -> &Materializer {
        &self.core.materializer
    }

    /// Name used for this stage in logs.
    pub fn stage_name(&self) -> &str {
        &self.core.stages[self.stage].name
    }

    pub(crate) fn grab_erased(&mut self, inlet: usize) -> Result<Element> {
        self.core.grab(self.stage, inlet)
    }

    pub(crate) fn push_erased(&mut self, outlet: usize, element: Element) -> Result<()> {
        self.core.push(self.stage, outlet, element)
    }
}
