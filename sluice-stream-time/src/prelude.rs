// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Prelude module re-exporting the time operators.

pub use crate::tick::{tick, TickHandle};
pub use crate::throttle::ThrottleMode;
pub use crate::time_ops::TimeOps;
