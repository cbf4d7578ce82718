// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Resources that record how often they were opened and closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared open/close counters.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a resource yielding `items`.
    pub fn open<T>(&self, items: impl IntoIterator<Item = T>) -> TrackedResource<T> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        TrackedResource {
            items: items.into_iter().collect(),
            tracker: self.clone(),
            closed: false,
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of reads across every resource, including reads past the end.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Every opened resource was closed exactly once.
    pub fn is_balanced(&self) -> bool {
        self.opened() == self.closed()
    }
}

/// A resource handing out a fixed list of items.
#[derive(Debug)]
pub struct TrackedResource<T> {
    items: VecDeque<T>,
    tracker: ResourceTracker,
    closed: bool,
}

impl<T> TrackedResource<T> {
    /// Next item, `None` once exhausted.
    pub fn read(&mut self) -> Option<T> {
        self.tracker.reads.fetch_add(1, Ordering::SeqCst);
        self.items.pop_front()
    }

    /// Record a close. Closing twice counts twice, so double closes show up
    /// as an unbalanced tracker.
    pub fn close(&mut self) {
        self.closed = true;
        self.tracker.closed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
