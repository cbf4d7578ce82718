// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

/// Policy applied when an element arrives at a full bounded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverflowStrategy {
    /// Stop pulling upstream until there is room again.
    #[default]
    Backpressure,
    /// Drop the oldest buffered element to make room.
    DropHead,
    /// Drop the youngest buffered element to make room.
    DropTail,
    /// Drop every buffered element to make room.
    DropBuffer,
    /// Drop the incoming element.
    DropNew,
    /// Fail the stage with [`StreamError::BufferOverflow`](crate::StreamError::BufferOverflow).
    Fail,
}

impl OverflowStrategy {
    /// Whether the strategy withholds demand instead of accepting elements into a
    /// full buffer.
    #[must_use]
    pub const fn is_backpressure(self) -> bool {
        matches!(self, Self::Backpressure)
    }
}
