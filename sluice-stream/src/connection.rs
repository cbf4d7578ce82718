// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Demand and data state of one outlet-to-inlet wire.
//!
//! Signals are two-phase: the sending side changes the state immediately and
//! enqueues an event, the receiving side observes the change when the event is
//! delivered. The `*_delivered` flags track the receiving side's view.

use crate::port::Element;
use sluice_core::{Result, StreamError};
use std::collections::VecDeque;

/// Stage and port index at one end of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub(crate) stage: usize,
    pub(crate) port: usize,
}

pub(crate) struct Connection {
    pub(crate) from: Endpoint,
    pub(crate) to: Endpoint,
    /// Pull issued by the inlet and not yet answered by a delivered push.
    pulled: bool,
    /// The outlet has seen the pull and may push once.
    pull_delivered: bool,
    slot: Option<Element>,
    /// The inlet has seen the push and may grab.
    push_delivered: bool,
    /// Completed or failed by the outlet's owner.
    out_closed: bool,
    /// Cancelled by the inlet's owner.
    in_closed: bool,
    finish_delivered: bool,
    cancel_delivered: bool,
    /// Elements emitted while the outlet had no demand.
    pub(crate) emit_queue: VecDeque<Element>,
    /// Complete the outlet once `emit_queue` drains.
    pub(crate) complete_after_emit: bool,
}

impl Connection {
    pub(crate) const fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            from,
            to,
            pulled: false,
            pull_delivered: false,
            slot: None,
            push_delivered: false,
            out_closed: false,
            in_closed: false,
            finish_delivered: false,
            cancel_delivered: false,
            emit_queue: VecDeque::new(),
            complete_after_emit: false,
        }
    }

    /// Returns whether a `Pull` event must be enqueued.
    pub(crate) fn pull(&mut self) -> Result<bool> {
        if self.in_closed || self.finish_delivered || self.out_closed {
            return Ok(false);
        }
        if self.pulled {
            return Err(StreamError::protocol_violation(
                "pull on an inlet that has already been pulled",
            ));
        }
        if self.push_delivered {
            // The previous element was never grabbed.
            self.slot = None;
            self.push_delivered = false;
        }
        self.pulled = true;
        Ok(true)
    }

    /// Returns whether a `Push` event must be enqueued.
    pub(crate) fn push(&mut self, element: Element) -> Result<bool> {
        if self.out_closed {
            return Err(StreamError::protocol_violation(
                "push on an outlet that has already been closed",
            ));
        }
        if self.in_closed {
            return Ok(false);
        }
        if !self.pull_delivered {
            return Err(StreamError::protocol_violation(
                "push on an outlet without demand",
            ));
        }
        self.pull_delivered = false;
        self.slot = Some(element);
        Ok(true)
    }

    pub(crate) fn grab(&mut self) -> Result<Element> {
        if !self.push_delivered {
            return Err(StreamError::protocol_violation(
                "grab on an inlet without an element",
            ));
        }
        self.push_delivered = false;
        self.slot.take().ok_or_else(|| {
            StreamError::protocol_violation("grab on an inlet whose element was already taken")
        })
    }

    /// Returns whether a terminal event must be enqueued.
    pub(crate) fn close_out(&mut self) -> Result<bool> {
        if self.out_closed {
            return Err(StreamError::protocol_violation(
                "outlet completed or failed twice",
            ));
        }
        self.out_closed = true;
        self.emit_queue.clear();
        self.complete_after_emit = false;
        Ok(!self.in_closed)
    }

    /// Returns whether a `Cancel` event must be enqueued.
    pub(crate) fn cancel(&mut self) -> bool {
        if self.in_closed {
            return false;
        }
        self.in_closed = true;
        self.pulled = false;
        self.slot = None;
        self.push_delivered = false;
        !self.out_closed
    }

    pub(crate) fn deliver_pull(&mut self) -> bool {
        if self.out_closed || self.in_closed {
            return false;
        }
        self.pull_delivered = true;
        true
    }

    pub(crate) fn deliver_push(&mut self) -> bool {
        if self.in_closed {
            return false;
        }
        self.pulled = false;
        self.push_delivered = true;
        true
    }

    pub(crate) fn deliver_finish(&mut self) -> bool {
        if self.in_closed {
            return false;
        }
        self.pulled = false;
        self.finish_delivered = true;
        true
    }

    pub(crate) fn deliver_cancel(&mut self) -> bool {
        if self.out_closed {
            return false;
        }
        self.cancel_delivered = true;
        self.pull_delivered = false;
        self.emit_queue.clear();
        self.complete_after_emit = false;
        true
    }

    /// Drop an element that was delivered but not grabbed.
    pub(crate) fn discard_pushed(&mut self) {
        if self.push_delivered {
            self.slot = None;
            self.push_delivered = false;
        }
    }

    pub(crate) fn inlet_available(&self) -> bool {
        self.push_delivered && self.slot.is_some()
    }

    pub(crate) fn inlet_closed(&self) -> bool {
        self.in_closed || self.finish_delivered
    }

    pub(crate) fn has_been_pulled(&self) -> bool {
        self.pulled && !self.in_closed
    }

    pub(crate) fn outlet_available(&self) -> bool {
        self.pull_delivered && !self.out_closed && self.emit_queue.is_empty()
    }

    pub(crate) fn outlet_closed(&self) -> bool {
        self.out_closed || self.cancel_delivered
    }

    /// Demand is present but an emission is queued behind it.
    pub(crate) fn can_drain_emit(&self) -> bool {
        self.pull_delivered && !self.out_closed && !self.emit_queue.is_empty()
    }

    pub(crate) const fn is_cancelled(&self) -> bool {
        self.in_closed
    }

    pub(crate) const fn is_out_closed(&self) -> bool {
        self.out_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::new(
            Endpoint { stage: 0, port: 0 },
            Endpoint { stage: 1, port: 0 },
        )
    }

    fn element(value: u32) -> Element {
        Box::new(value)
    }

    #[test]
    fn push_without_demand_is_a_protocol_violation() {
        // Arrange
        let mut conn = connection();

        // Act
        let result = conn.push(element(1));

        // Assert
        assert!(matches!(result, Err(StreamError::ProtocolViolation { .. })));
    }

    #[test]
    fn push_before_pull_is_delivered_is_a_protocol_violation() {
        // Arrange
        let mut conn = connection();
        assert!(conn.pull().unwrap());

        // Act
        let result = conn.push(element(1));

        // Assert
        assert!(matches!(result, Err(StreamError::ProtocolViolation { .. })));
    }

    #[test]
    fn one_pull_allows_exactly_one_push() {
        // Arrange
        let mut conn = connection();
        conn.pull().unwrap();
        assert!(conn.deliver_pull());
        assert!(conn.outlet_available());

        // Act
        let first = conn.push(element(1));
        let second = conn.push(element(2));

        // Assert
        assert!(first.unwrap());
        assert!(!conn.outlet_available());
        assert!(matches!(second, Err(StreamError::ProtocolViolation { .. })));
    }

    #[test]
    fn double_pull_is_a_protocol_violation() {
        // Arrange
        let mut conn = connection();
        conn.pull().unwrap();

        // Act
        let result = conn.pull();

        // Assert
        assert!(conn.has_been_pulled());
        assert!(matches!(result, Err(StreamError::ProtocolViolation { .. })));
    }

    #[test]
    fn grab_returns_pushed_element_once() {
        // Arrange
        let mut conn = connection();
        conn.pull().unwrap();
        conn.deliver_pull();
        conn.push(element(7)).unwrap();
        assert!(!conn.inlet_available());
        conn.deliver_push();

        // Act
        let grabbed = conn.grab().unwrap();
        let again = conn.grab();

        // Assert
        assert_eq!(*grabbed.downcast::<u32>().unwrap(), 7);
        assert!(!conn.has_been_pulled());
        assert!(matches!(again, Err(StreamError::ProtocolViolation { .. })));
    }

    #[test]
    fn pulling_again_drops_an_ungrabbed_element() {
        // Arrange
        let mut conn = connection();
        conn.pull().unwrap();
        conn.deliver_pull();
        conn.push(element(7)).unwrap();
        conn.deliver_push();

        // Act
        let pulled = conn.pull().unwrap();

        // Assert
        assert!(pulled);
        assert!(!conn.inlet_available());
    }

    #[test]
    fn double_completion_is_a_protocol_violation() {
        // Arrange
        let mut conn = connection();
        assert!(conn.close_out().unwrap());

        // Act
        let result = conn.close_out();

        // Assert
        assert!(matches!(result, Err(StreamError::ProtocolViolation { .. })));
    }

    #[test]
    fn push_after_completion_is_a_protocol_violation() {
        // Arrange
        let mut conn = connection();
        conn.pull().unwrap();
        conn.deliver_pull();
        conn.close_out().unwrap();

        // Act
        let result = conn.push(element(1));

        // Assert
        assert!(matches!(result, Err(StreamError::ProtocolViolation { .. })));
    }

    #[test]
    fn pulling_a_closed_inlet_is_a_no_op() {
        // Arrange
        let mut conn = connection();
        conn.close_out().unwrap();
        conn.deliver_finish();

        // Act
        let first = conn.pull();
        let second = conn.pull();

        // Assert
        assert!(conn.inlet_closed());
        assert!(!first.unwrap());
        assert!(!second.unwrap());
    }

    #[test]
    fn push_to_cancelled_inlet_is_dropped() {
        // Arrange
        let mut conn = connection();
        conn.pull().unwrap();
        conn.deliver_pull();
        assert!(conn.cancel());

        // Act
        let result = conn.push(element(1));

        // Assert
        assert!(!result.unwrap());
        assert!(conn.is_cancelled());
        assert!(!conn.cancel());
    }

    #[test]
    fn cancel_after_completion_needs_no_event() {
        // Arrange
        let mut conn = connection();
        conn.close_out().unwrap();

        // Act
        let needs_event = conn.cancel();

        // Assert
        assert!(!needs_event);
        assert!(!conn.deliver_cancel());
    }

    #[test]
    fn delivered_cancel_clears_pending_emits() {
        // Arrange
        let mut conn = connection();
        conn.emit_queue.push_back(element(1));
        conn.complete_after_emit = true;
        conn.cancel();

        // Act
        let delivered = conn.deliver_cancel();

        // Assert
        assert!(delivered);
        assert!(conn.outlet_closed());
        assert!(conn.emit_queue.is_empty());
        assert!(!conn.complete_after_emit);
    }
}
