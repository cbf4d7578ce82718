// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Prelude module re-exporting switches and hubs.

pub use crate::broadcast_hub::BroadcastHub;
pub use crate::kill_switch::{KillSwitch, KillSwitches, SharedKillSwitch, UniqueKillSwitch};
pub use crate::merge_hub::MergeHub;
