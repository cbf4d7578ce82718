// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Stages that turn one stream into a stream of substreams.
//!
//! Every substream is emitted as a [`Source`] that can be materialized exactly
//! once, usually by `merge_substreams`, `concat_substreams` or a `flat_map_*`
//! stage. The emitting stage and the substream source talk through async
//! callbacks, so a substream may run in any island.
//!
//! A substream that is not materialized within the subscription timeout is
//! cancelled ([`SubscriptionTimeoutMode::Cancel`]): materializing it later fails
//! with [`StreamError::SubscriptionTimeout`].

use super::{flow_stage, source_stage};
use crate::async_callback::{AsyncCallback, CallbackSlot};
use crate::context::StageContext;
use crate::dsl::{Flow, Source};
use crate::logging::{debug, warn};
use crate::logic::{downcast_event, StageLogic, TimerKey};
use crate::shape::{FlowShape, SourceShape};
use sluice_core::{Attributes, NotUsed, Result, StreamError, SubscriptionTimeoutMode};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a splitting stage does when the current substream is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubstreamCancelStrategy {
    /// Keep consuming upstream and drop elements until the next substream starts.
    #[default]
    Drain,
    /// Cancel upstream and complete the stream of substreams.
    Propagate,
}

/// Signals a substream source sends back to the stage that emitted it.
#[derive(Clone, Copy)]
enum SubstreamSignal {
    Started(u64),
    Pulled(u64),
    Cancelled(u64),
}

enum SubSourceEvent<T> {
    Push(T),
    Complete,
    Fail(StreamError),
}

struct SubSourceLogic<T> {
    shape: SourceShape<T>,
    id: u64,
    slot: CallbackSlot<SubSourceEvent<T>>,
    parent: AsyncCallback<SubstreamSignal>,
    finished: bool,
}

impl<T: Send + 'static> SubSourceLogic<T> {
    fn signal(&mut self, ctx: &mut StageContext<'_>, signal: SubstreamSignal) -> Result<()> {
        if self.parent.invoke(signal) {
            return Ok(());
        }
        self.finished = true;
        ctx.fail_stage(StreamError::abrupt_termination(
            "the stage feeding this substream has stopped",
        ))
    }
}

impl<T: Send + 'static> StageLogic for SubSourceLogic<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.slot.bind(ctx.async_callback());
        self.signal(ctx, SubstreamSignal::Started(self.id))
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.signal(ctx, SubstreamSignal::Pulled(self.id))
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.finished = true;
        self.parent.invoke(SubstreamSignal::Cancelled(self.id));
        ctx.complete_stage()
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<SubSourceEvent<T>>(event)? {
            SubSourceEvent::Push(element) => ctx.push(self.shape.out, element),
            SubSourceEvent::Complete => {
                self.finished = true;
                ctx.complete_stage()
            }
            SubSourceEvent::Fail(error) => {
                self.finished = true;
                ctx.fail_stage(error)
            }
        }
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        self.slot.close();
        if !self.finished {
            self.parent.invoke(SubstreamSignal::Cancelled(self.id));
        }
    }
}

fn sub_source<T: Send + 'static>(
    id: u64,
    slot: CallbackSlot<SubSourceEvent<T>>,
    parent: AsyncCallback<SubstreamSignal>,
) -> Source<T> {
    let materialized = Arc::new(AtomicBool::new(false));
    source_stage("sub_source", move |_: &Attributes| {
        if materialized.swap(true, Ordering::AcqRel) {
            return Err(StreamError::stream_error(
                "a substream source can only be materialized once",
            ));
        }
        let logic = SubSourceLogic {
            shape: SourceShape::<T>::new(),
            id,
            slot: slot.clone(),
            parent: parent.clone(),
            finished: false,
        };
        Ok((Box::new(logic) as Box<dyn StageLogic>, NotUsed))
    })
}

/// The emitting stage's end of one substream.
///
/// Holds at most one element: the first element until the substream is
/// materialized and pulled, or an element that arrived without demand.
struct SubOutlet<T> {
    id: u64,
    slot: CallbackSlot<SubSourceEvent<T>>,
    buffered: Option<T>,
    demand: bool,
    started: bool,
    closing: bool,
}

impl<T: Send + 'static> SubOutlet<T> {
    fn offer(&mut self, element: T) {
        if self.demand {
            self.demand = false;
            let _ = self.slot.invoke(SubSourceEvent::Push(element));
        } else {
            self.buffered = Some(element);
        }
    }

    /// Returns `true` when the substream is finished afterwards.
    fn pulled(&mut self) -> bool {
        match self.buffered.take() {
            Some(element) => {
                let _ = self.slot.invoke(SubSourceEvent::Push(element));
                if self.closing {
                    let _ = self.slot.invoke(SubSourceEvent::Complete);
                    return true;
                }
            }
            None => self.demand = true,
        }
        false
    }

    /// Complete after the buffered element, if any. Returns `true` when the
    /// substream is finished afterwards.
    fn complete(&mut self) -> bool {
        if self.buffered.is_some() {
            self.closing = true;
            return false;
        }
        let _ = self.slot.invoke(SubSourceEvent::Complete);
        true
    }

    fn fail(&self, error: StreamError) {
        let _ = self.slot.invoke(SubSourceEvent::Fail(error));
    }

    const fn held(&self) -> bool {
        self.buffered.is_some()
    }
}

/// Create the substream `id` holding `first` and arm its subscription timeout.
fn open_substream<T: Send + 'static>(
    ctx: &mut StageContext<'_>,
    id: u64,
    first: T,
) -> (SubOutlet<T>, Source<T>) {
    let slot = CallbackSlot::new();
    let source = sub_source(id, slot.clone(), ctx.async_callback());
    if let Some((mode, timeout)) = ctx.attributes().get_subscription_timeout() {
        if mode != SubscriptionTimeoutMode::Noop {
            ctx.schedule_once(id, timeout);
        }
    }
    let outlet = SubOutlet {
        id,
        slot,
        buffered: Some(first),
        demand: false,
        started: false,
        closing: false,
    };
    (outlet, source)
}

/// Apply the subscription timeout to a substream whose timer fired. Returns
/// `true` when the substream was cancelled.
fn subscription_timed_out<T: Send + 'static>(
    ctx: &StageContext<'_>,
    outlet: &SubOutlet<T>,
) -> bool {
    if outlet.started {
        return false;
    }
    match ctx.attributes().get_subscription_timeout() {
        Some((SubscriptionTimeoutMode::Cancel, timeout)) => {
            debug!(
                "{}: substream {} was not materialized within {:?}, cancelling it",
                ctx.stage_name(),
                outlet.id,
                timeout
            );
            outlet.fail(StreamError::subscription_timeout(format!(
                "substream {} was not materialized within {:?}",
                outlet.id, timeout
            )));
            true
        }
        Some((SubscriptionTimeoutMode::Warn, timeout)) => {
            warn!(
                "{}: substream {} was not materialized within {:?}",
                ctx.stage_name(),
                outlet.id,
                timeout
            );
            false
        }
        _ => false,
    }
}

fn abort_error(cause: Option<&StreamError>) -> StreamError {
    cause.cloned().unwrap_or_else(|| {
        StreamError::abrupt_termination("the stage feeding this substream has stopped")
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SplitMode {
    /// A matching element starts a new substream.
    When,
    /// A matching element ends the current substream.
    After,
}

struct SplitLogic<T, P> {
    shape: FlowShape<T, Source<T>>,
    mode: SplitMode,
    predicate: Arc<P>,
    cancel_strategy: SubstreamCancelStrategy,
    next_id: u64,
    current: Option<SubOutlet<T>>,
    /// First element of a substream that is not emitted yet.
    pending: Option<T>,
    /// The current substream was cancelled; drop elements until the next split.
    draining: bool,
    upstream_done: bool,
}

impl<T, P> SplitLogic<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn new(mode: SplitMode, predicate: Arc<P>, cancel_strategy: SubstreamCancelStrategy) -> Self {
        Self {
            shape: FlowShape::new(),
            mode,
            predicate,
            cancel_strategy,
            next_id: 0,
            current: None,
            pending: None,
            draining: false,
            upstream_done: false,
        }
    }

    fn open_pending(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.current.is_some() || self.pending.is_none() {
            return Ok(());
        }
        if ctx.is_closed(self.shape.outlet) {
            self.pending = None;
            return ctx.complete_stage();
        }
        if !ctx.is_available(self.shape.outlet) {
            return Ok(());
        }
        let Some(first) = self.pending.take() else {
            return Ok(());
        };
        let id = self.next_id;
        self.next_id += 1;
        let (mut outlet, source) = open_substream(ctx, id, first);
        if self.upstream_done {
            outlet.complete();
        }
        self.current = Some(outlet);
        ctx.push(self.shape.outlet, source)
    }

    fn check_done(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let finished = self.upstream_done || ctx.is_closed(self.shape.outlet);
        if self.current.is_none() && self.pending.is_none() && finished {
            return ctx.complete_stage();
        }
        Ok(())
    }

    fn current_cancelled(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.current = None;
        match self.cancel_strategy {
            SubstreamCancelStrategy::Propagate => {
                self.pending = None;
                ctx.complete_stage()
            }
            SubstreamCancelStrategy::Drain => {
                if !self.upstream_done {
                    self.draining = true;
                    ctx.try_pull(self.shape.inlet)?;
                }
                self.check_done(ctx)
            }
        }
    }

    fn on_drained_element(&mut self, ctx: &mut StageContext<'_>, element: T) -> Result<()> {
        if !(self.predicate)(&element) {
            return ctx.pull(self.shape.inlet);
        }
        self.draining = false;
        match self.mode {
            SplitMode::When => {
                self.pending = Some(element);
                self.open_pending(ctx)
            }
            SplitMode::After => {
                if ctx.is_available(self.shape.outlet) {
                    ctx.pull(self.shape.inlet)?;
                }
                self.check_done(ctx)
            }
        }
    }
}

impl<T, P> StageLogic for SplitLogic<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.set_keep_going(true);
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        if self.draining {
            return self.on_drained_element(ctx, element);
        }
        let Some(current) = self.current.as_mut() else {
            self.pending = Some(element);
            return self.open_pending(ctx);
        };
        let split = (self.predicate)(&element);
        match self.mode {
            SplitMode::When if split => {
                current.complete();
                self.current = None;
                self.pending = Some(element);
                self.open_pending(ctx)
            }
            SplitMode::When => {
                current.offer(element);
                Ok(())
            }
            SplitMode::After => {
                current.offer(element);
                if !split {
                    return Ok(());
                }
                if current.complete() {
                    self.current = None;
                }
                if ctx.is_available(self.shape.outlet) {
                    ctx.pull(self.shape.inlet)?;
                }
                self.check_done(ctx)
            }
        }
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if self.pending.is_some() {
            return self.open_pending(ctx);
        }
        if self.current.is_none() && !self.draining {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.upstream_done = true;
        self.draining = false;
        if let Some(current) = self.current.as_mut() {
            if current.complete() {
                self.current = None;
            }
        }
        self.open_pending(ctx)?;
        self.check_done(ctx)
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        if let Some(current) = self.current.take() {
            current.fail(error.clone());
        }
        ctx.fail_stage(error)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.pending = None;
        self.check_done(ctx)
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        let signal = downcast_event::<SubstreamSignal>(event)?;
        let id = match signal {
            SubstreamSignal::Started(id)
            | SubstreamSignal::Pulled(id)
            | SubstreamSignal::Cancelled(id) => id,
        };
        let Some(current) = self.current.as_mut().filter(|current| current.id == id) else {
            return Ok(());
        };
        match signal {
            SubstreamSignal::Started(_) => {
                current.started = true;
                ctx.cancel_timer(id);
                Ok(())
            }
            SubstreamSignal::Pulled(_) => {
                if current.pulled() {
                    self.current = None;
                    return self.check_done(ctx);
                }
                if current.demand {
                    ctx.try_pull(self.shape.inlet)?;
                }
                Ok(())
            }
            SubstreamSignal::Cancelled(_) => {
                ctx.cancel_timer(id);
                self.current_cancelled(ctx)
            }
        }
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, key: TimerKey) -> Result<()> {
        let timed_out = self
            .current
            .as_ref()
            .filter(|current| current.id == key)
            .is_some_and(|current| subscription_timed_out(ctx, current));
        if timed_out {
            return self.current_cancelled(ctx);
        }
        Ok(())
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        if let Some(current) = self.current.take() {
            current.fail(abort_error(abort_cause));
        }
    }
}

fn split<T, P>(
    name: &'static str,
    mode: SplitMode,
    predicate: P,
    cancel_strategy: SubstreamCancelStrategy,
) -> Flow<T, Source<T>>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    flow_stage(name, move || {
        SplitLogic::new(mode, Arc::clone(&predicate), cancel_strategy)
    })
}

/// Start a new substream before every element matching `predicate`, except the
/// first element of the stream.
pub(crate) fn split_when<T, P>(
    predicate: P,
    cancel_strategy: SubstreamCancelStrategy,
) -> Flow<T, Source<T>>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    split("split_when", SplitMode::When, predicate, cancel_strategy)
}

/// End the current substream after every element matching `predicate`.
pub(crate) fn split_after<T, P>(
    predicate: P,
    cancel_strategy: SubstreamCancelStrategy,
) -> Flow<T, Source<T>>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    split("split_after", SplitMode::After, predicate, cancel_strategy)
}

struct GroupByLogic<T, K, F> {
    shape: FlowShape<T, Source<T>>,
    max_substreams: usize,
    key_fn: Arc<F>,
    next_id: u64,
    active: HashMap<K, SubOutlet<T>>,
    keys: HashMap<u64, K>,
    /// Keys whose substream was cancelled; their elements are dropped.
    closed: HashSet<K>,
    /// First element of a new key waiting for demand on the main outlet.
    pending: Option<(K, T)>,
    upstream_done: bool,
}

impl<T, K, F> GroupByLogic<T, K, F>
where
    T: Send + 'static,
    K: Clone + Eq + Hash + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    fn held(&self) -> bool {
        self.pending.is_some() || self.active.values().any(SubOutlet::held)
    }

    /// Pull upstream when nothing is held and someone wants an element.
    fn try_pull_upstream(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.upstream_done || self.held() {
            return Ok(());
        }
        let wanted = ctx.is_available(self.shape.outlet)
            || self.active.values().any(|substream| substream.demand);
        if wanted {
            ctx.try_pull(self.shape.inlet)?;
        }
        Ok(())
    }

    fn open_pending(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if !ctx.is_available(self.shape.outlet) {
            return Ok(());
        }
        let Some((key, first)) = self.pending.take() else {
            return Ok(());
        };
        let id = self.next_id;
        self.next_id += 1;
        let (mut outlet, source) = open_substream(ctx, id, first);
        if self.upstream_done {
            outlet.complete();
        }
        self.keys.insert(id, key.clone());
        self.active.insert(key, outlet);
        ctx.push(self.shape.outlet, source)
    }

    fn check_done(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.pending.is_some() {
            return Ok(());
        }
        let main_closed = ctx.is_closed(self.shape.outlet);
        if (self.upstream_done || main_closed) && self.active.is_empty() {
            return ctx.complete_stage();
        }
        if self.upstream_done && !main_closed {
            ctx.complete(self.shape.outlet)?;
        }
        Ok(())
    }

    fn remove(&mut self, id: u64, cancelled: bool) {
        let Some(key) = self.keys.remove(&id) else {
            return;
        };
        if self.active.remove(&key).is_some() && cancelled {
            self.closed.insert(key);
        }
    }

    fn fail_all(&mut self, error: &StreamError) {
        for (_, substream) in self.active.drain() {
            substream.fail(error.clone());
        }
        self.keys.clear();
    }
}

impl<T, K, F> StageLogic for GroupByLogic<T, K, F>
where
    T: Send + 'static,
    K: Clone + Eq + Hash + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.set_keep_going(true);
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let element = ctx.grab(self.shape.inlet)?;
        let key = (self.key_fn)(&element);
        if self.closed.contains(&key) {
            return self.try_pull_upstream(ctx);
        }
        if let Some(substream) = self.active.get_mut(&key) {
            substream.offer(element);
            return self.try_pull_upstream(ctx);
        }
        if ctx.is_closed(self.shape.outlet) {
            // Nobody can receive a new substream any more.
            return self.try_pull_upstream(ctx);
        }
        if self.active.len() + self.closed.len() >= self.max_substreams {
            let error = StreamError::TooManySubstreams {
                max: self.max_substreams,
            };
            self.fail_all(&error);
            return ctx.fail_stage(error);
        }
        self.pending = Some((key, element));
        self.open_pending(ctx)?;
        self.try_pull_upstream(ctx)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.open_pending(ctx)?;
        self.try_pull_upstream(ctx)?;
        if self.upstream_done {
            return self.check_done(ctx);
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.upstream_done = true;
        self.active.retain(|_, substream| !substream.complete());
        let active = &self.active;
        self.keys.retain(|_, key| active.contains_key(key));
        self.open_pending(ctx)?;
        self.check_done(ctx)
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        self.fail_all(&error);
        ctx.fail_stage(error)
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.pending = None;
        self.check_done(ctx)?;
        self.try_pull_upstream(ctx)
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<SubstreamSignal>(event)? {
            SubstreamSignal::Started(id) => {
                ctx.cancel_timer(id);
                if let Some(substream) = self.keys.get(&id).and_then(|key| self.active.get_mut(key))
                {
                    substream.started = true;
                }
                Ok(())
            }
            SubstreamSignal::Pulled(id) => {
                let finished = self
                    .keys
                    .get(&id)
                    .and_then(|key| self.active.get_mut(key))
                    .is_some_and(SubOutlet::pulled);
                if finished {
                    self.remove(id, false);
                }
                self.try_pull_upstream(ctx)?;
                self.check_done(ctx)
            }
            SubstreamSignal::Cancelled(id) => {
                ctx.cancel_timer(id);
                self.remove(id, true);
                self.try_pull_upstream(ctx)?;
                self.check_done(ctx)
            }
        }
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, key: TimerKey) -> Result<()> {
        let timed_out = self
            .keys
            .get(&key)
            .and_then(|group| self.active.get(group))
            .is_some_and(|substream| subscription_timed_out(ctx, substream));
        if !timed_out {
            return Ok(());
        }
        self.remove(key, true);
        self.try_pull_upstream(ctx)?;
        self.check_done(ctx)
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        let error = abort_error(abort_cause);
        self.fail_all(&error);
    }
}

/// Route elements into one substream per key, opening at most
/// `max_substreams` substreams over the lifetime of the stage.
pub(crate) fn group_by<T, K, F>(max_substreams: usize, key_fn: F) -> Flow<T, Source<T>>
where
    T: Send + 'static,
    K: Clone + Eq + Hash + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let key_fn = Arc::new(key_fn);
    flow_stage("group_by", move || GroupByLogic {
        shape: FlowShape::<T, Source<T>>::new(),
        max_substreams,
        key_fn: Arc::clone(&key_fn),
        next_id: 0,
        active: HashMap::new(),
        keys: HashMap::new(),
        closed: HashSet::new(),
        pending: None,
        upstream_done: false,
    })
}
