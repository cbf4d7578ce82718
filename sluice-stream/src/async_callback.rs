// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Thread-safe entry points into a running stage.

use crate::logic::TimerKey;
use crate::port::Element;
use futures::channel::mpsc::UnboundedSender;
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Event delivered to an island from outside its run loop.
pub(crate) enum IslandEvent {
    Async {
        stage: usize,
        task: Option<u64>,
        payload: Element,
    },
    Timer {
        stage: usize,
        key: TimerKey,
        generation: u64,
    },
}

pub(crate) type Mailbox = UnboundedSender<IslandEvent>;

/// Handle that delivers events of type `E` to a stage's `on_async` callback.
///
/// Invocations are queued in the island mailbox and handled between run-loop
/// passes, in invocation order.
pub struct AsyncCallback<E> {
    stage: usize,
    mailbox: Mailbox,
    _marker: PhantomData<fn(E)>,
}

impl<E: Send + 'static> AsyncCallback<E> {
    pub(crate) const fn new(stage: usize, mailbox: Mailbox) -> Self {
        Self {
            stage,
            mailbox,
            _marker: PhantomData,
        }
    }

    /// Deliver `event`. Returns `false` when the island has already stopped.
    pub fn invoke(&self, event: E) -> bool {
        self.try_invoke(event).is_ok()
    }

    /// Deliver `event`, handing it back when the island has already stopped.
    ///
    /// # Errors
    /// Returns the event when it could not be delivered.
    pub fn try_invoke(&self, event: E) -> Result<(), E> {
        let message = IslandEvent::Async {
            stage: self.stage,
            task: None,
            payload: Box::new(event),
        };
        match self.mailbox.unbounded_send(message) {
            Ok(()) => Ok(()),
            Err(error) => match error.into_inner() {
                IslandEvent::Async { payload, .. } => match payload.downcast::<E>() {
                    Ok(event) => Err(*event),
                    Err(_) => Ok(()),
                },
                IslandEvent::Timer { .. } => Ok(()),
            },
        }
    }

    /// Whether the island behind this callback has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl<E> Clone for AsyncCallback<E> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            mailbox: self.mailbox.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E> fmt::Debug for AsyncCallback<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCallback")
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

enum SlotState<E> {
    Pending(Vec<E>),
    Bound(AsyncCallback<E>),
    Closed,
}

/// Late-bound [`AsyncCallback`].
///
/// Materialized values are handed out before their stage has started, so events
/// sent through them are buffered here until the stage binds its callback in
/// `pre_start`. Once the stage stops it closes the slot and further events are
/// returned to the sender.
pub struct CallbackSlot<E> {
    state: Arc<Mutex<SlotState<E>>>,
}

impl<E: Send + 'static> CallbackSlot<E> {
    /// Unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::Pending(Vec::new()))),
        }
    }

    /// Deliver `event`, or buffer it while the slot is unbound.
    ///
    /// # Errors
    /// Returns the event when the slot is closed or its island has stopped.
    pub fn invoke(&self, event: E) -> Result<(), E> {
        let mut state = self.state.lock();
        match &mut *state {
            SlotState::Pending(buffered) => {
                buffered.push(event);
                Ok(())
            }
            SlotState::Bound(callback) => callback.try_invoke(event),
            SlotState::Closed => Err(event),
        }
    }

    /// Attach the stage's callback and flush buffered events to it.
    pub fn bind(&self, callback: AsyncCallback<E>) {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Closed) {
            return;
        }
        if let SlotState::Pending(buffered) =
            std::mem::replace(&mut *state, SlotState::Bound(callback.clone()))
        {
            for event in buffered {
                callback.invoke(event);
            }
        }
    }

    /// Refuse every further event.
    pub fn close(&self) {
        *self.state.lock() = SlotState::Closed;
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Closed)
    }
}

impl<E: Send + 'static> Default for CallbackSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for CallbackSlot<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> fmt::Debug for CallbackSlot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackSlot")
    }
}
