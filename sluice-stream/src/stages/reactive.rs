// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Reactive Streams publisher and subscriber stages.
//!
//! [`StreamPublisher`] exposes the elements reaching a sink to one external
//! [`Subscriber`]; [`StreamSubscriber`] feeds a source from an external
//! [`Publisher`]. The same two logics, working on type-erased elements, carry
//! every connection that crosses an async boundary between islands.

use super::{sink_stage, source_stage};
use crate::async_callback::CallbackSlot;
use crate::context::StageContext;
use crate::dsl::{Sink, Source};
use crate::logging::{debug, warn};
use crate::logic::{downcast_event, StageLogic, TimerKey};
use crate::port::{Element, Inlet, Outlet};
use parking_lot::Mutex;
use sluice_core::{
    Attributes, CancelledSubscription, NotUsed, Publisher, Result, StreamError, Subscriber,
    Subscription, SubscriptionTimeoutMode,
};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

const SUBSCRIPTION_TIMEOUT: TimerKey = 0;

/// How a reactive stage moves elements over its single port.
pub(crate) trait ElementPort: Send + 'static {
    type Item: Send + 'static;

    fn grab(ctx: &mut StageContext<'_>) -> Result<Self::Item>;

    fn push(ctx: &mut StageContext<'_>, item: Self::Item) -> Result<()>;
}

/// Elements of a known type, for stages exposed to users.
pub(crate) struct Typed<T>(PhantomData<fn() -> T>);

impl<T: Send + 'static> ElementPort for Typed<T> {
    type Item = T;

    fn grab(ctx: &mut StageContext<'_>) -> Result<T> {
        ctx.grab(Inlet::<T>::new(0))
    }

    fn push(ctx: &mut StageContext<'_>, item: T) -> Result<()> {
        ctx.push(Outlet::<T>::new(0), item)
    }
}

/// Elements passed through untouched, for async boundaries.
pub(crate) struct Erased;

impl ElementPort for Erased {
    type Item = Element;

    fn grab(ctx: &mut StageContext<'_>) -> Result<Element> {
        ctx.grab_erased(0)
    }

    fn push(ctx: &mut StageContext<'_>, item: Element) -> Result<()> {
        ctx.push_erased(0, item)
    }
}

fn rejected() -> StreamError {
    StreamError::SubscriberRejected {
        reason: "the publisher accepts a single subscriber".to_string(),
    }
}

enum PublisherEvent<T> {
    Subscribe(Arc<dyn Subscriber<T>>),
    Request(u64),
    Cancel,
}

#[derive(Default)]
struct PublisherState {
    subscribed: bool,
    outcome: Option<Result<()>>,
}

struct StageSubscription<T> {
    slot: CallbackSlot<PublisherEvent<T>>,
}

impl<T: Send + 'static> Subscription for StageSubscription<T> {
    fn request(&self, n: u64) {
        let _ = self.slot.invoke(PublisherEvent::Request(n));
    }

    fn cancel(&self) {
        let _ = self.slot.invoke(PublisherEvent::Cancel);
    }
}

/// Materialized value of `Sink::as_publisher`.
///
/// Only the first subscriber is served. Later subscribers receive a cancelled
/// subscription followed by [`StreamError::SubscriberRejected`]; a subscriber
/// arriving after the stream ended without ever being subscribed receives the
/// stream's terminal signal instead.
pub struct StreamPublisher<T> {
    slot: CallbackSlot<PublisherEvent<T>>,
    state: Arc<Mutex<PublisherState>>,
}

impl<T: Send + 'static> Publisher<T> for StreamPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let Err(PublisherEvent::Subscribe(subscriber)) =
            self.slot.invoke(PublisherEvent::Subscribe(subscriber))
        else {
            return;
        };
        let outcome = {
            let state = self.state.lock();
            if state.subscribed {
                None
            } else {
                state.outcome.clone()
            }
        };
        subscriber.on_subscribe(Arc::new(CancelledSubscription));
        match outcome {
            Some(Ok(())) => subscriber.on_complete(),
            Some(Err(error)) => subscriber.on_error(error),
            None => subscriber.on_error(rejected()),
        }
    }
}

impl<T> Clone for StreamPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for StreamPublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPublisher").finish_non_exhaustive()
    }
}

/// Sink side: forwards upstream elements to one subscriber within its demand.
struct PublisherLogic<P: ElementPort> {
    slot: CallbackSlot<PublisherEvent<P::Item>>,
    state: Arc<Mutex<PublisherState>>,
    preset: Option<Arc<dyn Subscriber<P::Item>>>,
    subscriber: Option<Arc<dyn Subscriber<P::Item>>>,
    demand: u64,
    pending: Option<Result<()>>,
    timeout: Option<(SubscriptionTimeoutMode, Duration)>,
    watch_timeout: bool,
    _port: PhantomData<fn() -> P>,
}

impl<P: ElementPort> PublisherLogic<P> {
    fn new(
        slot: CallbackSlot<PublisherEvent<P::Item>>,
        state: Arc<Mutex<PublisherState>>,
        preset: Option<Arc<dyn Subscriber<P::Item>>>,
        watch_timeout: bool,
    ) -> Self {
        Self {
            slot,
            state,
            preset,
            subscriber: None,
            demand: 0,
            pending: None,
            timeout: None,
            watch_timeout,
            _port: PhantomData,
        }
    }

    fn inlet() -> Inlet<P::Item> {
        Inlet::new(0)
    }

    fn record(&self, outcome: Result<()>) {
        let mut state = self.state.lock();
        if state.outcome.is_none() {
            state.outcome = Some(outcome);
        }
    }

    fn attach(
        &mut self,
        ctx: &mut StageContext<'_>,
        subscriber: Arc<dyn Subscriber<P::Item>>,
    ) -> Result<()> {
        let first = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.subscribed, true)
        };
        if !first {
            subscriber.on_subscribe(Arc::new(CancelledSubscription));
            subscriber.on_error(rejected());
            return Ok(());
        }

        ctx.cancel_timer(SUBSCRIPTION_TIMEOUT);
        subscriber.on_subscribe(Arc::new(StageSubscription {
            slot: self.slot.clone(),
        }));
        match self.pending.take() {
            Some(Ok(())) => {
                subscriber.on_complete();
                self.record(Ok(()));
                ctx.complete_stage()
            }
            Some(Err(error)) => {
                subscriber.on_error(error.clone());
                self.record(Err(error.clone()));
                ctx.fail_stage(error)
            }
            None => {
                self.subscriber = Some(subscriber);
                Ok(())
            }
        }
    }

    fn upstream_terminated(&mut self, ctx: &mut StageContext<'_>, outcome: Result<()>) -> Result<()> {
        match self.subscriber.take() {
            Some(subscriber) => {
                match &outcome {
                    Ok(()) => subscriber.on_complete(),
                    Err(error) => subscriber.on_error(error.clone()),
                }
                self.record(outcome.clone());
            }
            None if !self.state.lock().subscribed => {
                // Held back until a subscriber shows up or the timeout fires.
                self.pending = Some(outcome);
                ctx.set_keep_going(true);
                return Ok(());
            }
            None => {}
        }
        match outcome {
            Ok(()) => ctx.complete_stage(),
            Err(error) => ctx.fail_stage(error),
        }
    }
}

impl<P: ElementPort> StageLogic for PublisherLogic<P> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.slot.bind(ctx.async_callback());
        if let Some(subscriber) = self.preset.take() {
            return self.attach(ctx, subscriber);
        }
        if self.watch_timeout {
            self.timeout = ctx.attributes().get_subscription_timeout();
            if let Some((mode, timeout)) = self.timeout {
                if mode != SubscriptionTimeoutMode::Noop {
                    ctx.schedule_once(SUBSCRIPTION_TIMEOUT, timeout);
                }
            }
        }
        Ok(())
    }

    fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        let item = P::grab(ctx)?;
        self.demand = self.demand.saturating_sub(1);
        if let Some(subscriber) = &self.subscriber {
            subscriber.on_next(item);
        }
        if self.demand > 0 {
            ctx.try_pull(Self::inlet())?;
        }
        Ok(())
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
        self.upstream_terminated(ctx, Ok(()))
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        _inlet: usize,
        error: StreamError,
    ) -> Result<()> {
        self.upstream_terminated(ctx, Err(error))
    }

    fn on_timer(&mut self, ctx: &mut StageContext<'_>, _key: TimerKey) -> Result<()> {
        if self.state.lock().subscribed {
            return Ok(());
        }
        let Some((mode, timeout)) = self.timeout else {
            return Ok(());
        };
        match mode {
            SubscriptionTimeoutMode::Cancel => {
                let error = StreamError::subscription_timeout(format!(
                    "publisher {} was not subscribed within {timeout:?}",
                    ctx.stage_name()
                ));
                self.record(Err(error.clone()));
                ctx.fail_stage(error)
            }
            SubscriptionTimeoutMode::Warn => {
                warn!(
                    "publisher {} was not subscribed within {:?}",
                    ctx.stage_name(),
                    timeout
                );
                Ok(())
            }
            SubscriptionTimeoutMode::Noop => Ok(()),
        }
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<PublisherEvent<P::Item>>(event)? {
            PublisherEvent::Subscribe(subscriber) => self.attach(ctx, subscriber),
            PublisherEvent::Request(0) => {
                if let Some(subscriber) = self.subscriber.take() {
                    let error = StreamError::InvalidDemand { requested: 0 };
                    subscriber.on_error(error.clone());
                    self.record(Err(error));
                }
                ctx.complete_stage()
            }
            PublisherEvent::Request(n) => {
                if self.subscriber.is_none() {
                    return Ok(());
                }
                self.demand = self.demand.saturating_add(n);
                ctx.try_pull(Self::inlet())
            }
            PublisherEvent::Cancel => {
                if self.subscriber.take().is_some() {
                    debug!("{}: subscriber cancelled", ctx.stage_name());
                    self.record(Ok(()));
                }
                ctx.complete_stage()
            }
        }
    }

    fn post_stop(&mut self, abort_cause: Option<&StreamError>) {
        self.slot.close();
        if let Some(subscriber) = self.subscriber.take() {
            let error = abort_cause.cloned().unwrap_or_else(|| {
                StreamError::abrupt_termination("publisher stopped before its upstream ended")
            });
            subscriber.on_error(error.clone());
            self.record(Err(error));
            return;
        }
        let outcome = self.pending.take().unwrap_or_else(|| {
            Err(abort_cause.cloned().unwrap_or_else(|| {
                StreamError::abrupt_termination("publisher stopped without a subscriber")
            }))
        });
        self.record(outcome);
    }
}

enum SubscriberEvent<T> {
    Subscribed(Arc<dyn Subscription>),
    Next(T),
    Error(StreamError),
    Complete,
}

/// Materialized value of `Source::as_subscriber`; also what `Source::from_publisher`
/// subscribes with.
///
/// Signals received before the stream has started are buffered. A subscription
/// offered after the stream stopped is cancelled right away.
pub struct StreamSubscriber<T> {
    slot: CallbackSlot<SubscriberEvent<T>>,
}

impl<T: Send + 'static> Subscriber<T> for StreamSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if let Err(SubscriberEvent::Subscribed(subscription)) =
            self.slot.invoke(SubscriberEvent::Subscribed(subscription))
        {
            subscription.cancel();
        }
    }

    fn on_next(&self, element: T) {
        let _ = self.slot.invoke(SubscriberEvent::Next(element));
    }

    fn on_error(&self, error: StreamError) {
        let _ = self.slot.invoke(SubscriberEvent::Error(error));
    }

    fn on_complete(&self) {
        let _ = self.slot.invoke(SubscriberEvent::Complete);
    }
}

impl<T> Clone for StreamSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> fmt::Debug for StreamSubscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSubscriber").finish_non_exhaustive()
    }
}

/// Source side: requests in batches to keep between half of and a full input
/// buffer in flight.
struct SubscriberLogic<P: ElementPort> {
    slot: CallbackSlot<SubscriberEvent<P::Item>>,
    upstream: Option<Arc<dyn Publisher<P::Item>>>,
    subscription: Option<Arc<dyn Subscription>>,
    buffer: VecDeque<P::Item>,
    sizes: Option<(usize, usize)>,
    outstanding: u64,
    upstream_done: bool,
    _port: PhantomData<fn() -> P>,
}

impl<P: ElementPort> SubscriberLogic<P> {
    fn new(
        slot: CallbackSlot<SubscriberEvent<P::Item>>,
        upstream: Option<Arc<dyn Publisher<P::Item>>>,
        sizes: Option<(usize, usize)>,
    ) -> Self {
        Self {
            slot,
            upstream,
            subscription: None,
            buffer: VecDeque::new(),
            sizes,
            outstanding: 0,
            upstream_done: false,
            _port: PhantomData,
        }
    }

    fn outlet() -> Outlet<P::Item> {
        Outlet::new(0)
    }

    fn max(&self) -> u64 {
        self.sizes.map_or(1, |(_, max)| max as u64)
    }

    fn request_more(&mut self) {
        if self.upstream_done {
            return;
        }
        let Some(subscription) = &self.subscription else {
            return;
        };
        let max = self.max();
        let held = self.outstanding + self.buffer.len() as u64;
        if held <= max / 2 && held < max {
            let batch = max - held;
            self.outstanding += batch;
            subscription.request(batch);
        }
    }
}

impl<P: ElementPort> StageLogic for SubscriberLogic<P> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.sizes.is_none() {
            self.sizes = Some(ctx.attributes().get_input_buffer().unwrap_or((4, 16)));
        }
        self.slot.bind(ctx.async_callback());
        if let Some(publisher) = self.upstream.take() {
            publisher.subscribe(Arc::new(StreamSubscriber {
                slot: self.slot.clone(),
            }));
        }
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(item) = self.buffer.pop_front() {
            P::push(ctx, item)?;
        }
        if self.upstream_done && self.buffer.is_empty() {
            return ctx.complete_stage();
        }
        self.request_more();
        Ok(())
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        ctx.complete_stage()
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<SubscriberEvent<P::Item>>(event)? {
            SubscriberEvent::Subscribed(subscription) => {
                if self.subscription.is_some() || self.upstream_done {
                    subscription.cancel();
                    return Ok(());
                }
                let initial = self.sizes.map_or(1, |(initial, _)| initial.max(1)) as u64;
                self.outstanding = initial;
                subscription.request(initial);
                self.subscription = Some(subscription);
                Ok(())
            }
            SubscriberEvent::Next(item) => {
                if self.outstanding == 0 {
                    return ctx.fail_stage(StreamError::protocol_violation(
                        "publisher signalled an element that was not requested",
                    ));
                }
                self.outstanding -= 1;
                if self.buffer.is_empty() && ctx.is_available(Self::outlet()) {
                    P::push(ctx, item)?;
                } else {
                    self.buffer.push_back(item);
                }
                self.request_more();
                Ok(())
            }
            SubscriberEvent::Complete => {
                self.upstream_done = true;
                self.subscription = None;
                if self.buffer.is_empty() {
                    ctx.complete_stage()?;
                }
                Ok(())
            }
            SubscriberEvent::Error(error) => {
                self.upstream_done = true;
                self.subscription = None;
                ctx.fail_stage(error)
            }
        }
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        self.slot.close();
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

pub(crate) fn as_publisher<T: Send + 'static>() -> Sink<T, StreamPublisher<T>> {
    sink_stage("publisher_sink", |_: &Attributes| {
        let slot = CallbackSlot::new();
        let state = Arc::new(Mutex::new(PublisherState::default()));
        let logic = PublisherLogic::<Typed<T>>::new(slot.clone(), Arc::clone(&state), None, true);
        Ok((
            Box::new(logic) as Box<dyn StageLogic>,
            StreamPublisher { slot, state },
        ))
    })
}

pub(crate) fn from_subscriber<T: Send + 'static>(
    subscriber: Arc<dyn Subscriber<T>>,
) -> Sink<T, NotUsed> {
    sink_stage("subscriber_sink", move |_: &Attributes| {
        let logic = PublisherLogic::<Typed<T>>::new(
            CallbackSlot::new(),
            Arc::new(Mutex::new(PublisherState::default())),
            Some(Arc::clone(&subscriber)),
            false,
        );
        Ok((Box::new(logic) as Box<dyn StageLogic>, NotUsed))
    })
}

pub(crate) fn as_subscriber<T: Send + 'static>() -> Source<T, StreamSubscriber<T>> {
    source_stage("subscriber_source", |_: &Attributes| {
        let slot = CallbackSlot::new();
        let logic = SubscriberLogic::<Typed<T>>::new(slot.clone(), None, None);
        Ok((
            Box::new(logic) as Box<dyn StageLogic>,
            StreamSubscriber { slot },
        ))
    })
}

pub(crate) fn from_publisher<T: Send + 'static>(
    publisher: Arc<dyn Publisher<T>>,
) -> Source<T, NotUsed> {
    source_stage("publisher_source", move |_: &Attributes| {
        let logic =
            SubscriberLogic::<Typed<T>>::new(CallbackSlot::new(), Some(Arc::clone(&publisher)), None);
        Ok((Box::new(logic) as Box<dyn StageLogic>, NotUsed))
    })
}

/// The two halves of a connection crossing islands: the first goes into the
/// upstream island (one inlet), the second into the downstream island (one
/// outlet).
pub(crate) fn async_boundary(
    initial: usize,
    max: usize,
) -> (Box<dyn StageLogic>, Box<dyn StageLogic>) {
    let publisher_slot = CallbackSlot::new();
    let subscriber_slot = CallbackSlot::new();
    let publisher = PublisherLogic::<Erased>::new(
        publisher_slot,
        Arc::new(Mutex::new(PublisherState::default())),
        Some(Arc::new(StreamSubscriber {
            slot: subscriber_slot.clone(),
        })),
        false,
    );
    let max = max.max(initial).max(1);
    let subscriber = SubscriberLogic::<Erased>::new(subscriber_slot, None, Some((initial, max)));
    (Box::new(publisher), Box::new(subscriber))
}
