// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::timer::Timer;
use std::fmt::Debug;

pub trait Runtime: 'static {
    type Timer: Timer<Instant = Self::Instant> + Default;
    type Instant: Copy + Ord + Send + Sync + Debug;

    fn timer() -> Self::Timer {
        Self::Timer::default()
    }
}
