// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Dynamic topology for sluice streams.
//!
//! # Overview
//!
//! - **[`KillSwitches`]** - pass-through flows stopped from outside through a
//!   [`UniqueKillSwitch`] or a [`SharedKillSwitch`]
//! - **[`MergeHub`]** - a source fed by any number of producer sinks attached
//!   at runtime
//! - **[`BroadcastHub`]** - a sink feeding any number of consumer sources
//!   attached at runtime
//!
//! Handles are plain `Arc`-backed values: clone them freely and use them from
//! any thread. Hubs and switches tolerate attaching after they stopped; the
//! newcomer observes the same outcome as everyone else.
//!
//! # Example
//!
//! ```
//! use sluice_hub::prelude::*;
//! use sluice_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sluice_core::Result<()> {
//! let materializer = Materializer::new()?;
//! let switch = SharedKillSwitch::new("pipeline");
//!
//! let (producer, collected) = MergeHub::source::<u32>(16)
//!     .via(switch.flow())
//!     .to_mat(Sink::seq(), Keep::both)
//!     .run_with(&materializer)?;
//!
//! Source::single(7).run_with(producer, &materializer)?;
//! # tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//! switch.shutdown();
//!
//! assert_eq!(collected.await?, vec![7]);
//! # Ok(())
//! # }
//! ```

mod broadcast_hub;
mod kill_switch;
mod logging;
mod merge_hub;

pub mod prelude;

pub use broadcast_hub::BroadcastHub;
pub use kill_switch::{KillSwitch, KillSwitches, SharedKillSwitch, UniqueKillSwitch};
pub use merge_hub::{MergeHub, DEFAULT_DEMAND_THRESHOLD};
