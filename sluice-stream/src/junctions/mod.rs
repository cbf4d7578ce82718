// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Stages with more than one inlet or outlet.
//!
//! Junctions are plain [`GraphStage`](crate::GraphStage)s: add them to a
//! [`GraphDsl`](crate::GraphDsl) and wire their shape's ports. The operators
//! `merge`, `concat`, `prepend`, `zip`, `zip_with` and `also_to` on
//! [`FlowOps`](crate::FlowOps) are built from them.
//!
//! | Junction | Shape | Completes |
//! |----------|-------|-----------|
//! | [`Merge`] | n → 1 | when all inlets complete, or the first with `eager` |
//! | [`Concat`] | n → 1 | when the last inlet completes |
//! | [`ZipWith`], [`Zip`], [`ZipN`] | n → 1 | when any inlet completes with nothing buffered |
//! | [`Broadcast`] | 1 → n | with upstream |
//! | [`Balance`] | 1 → n | with upstream |
//! | [`Partition`] | 1 → n | with upstream, after the pending element |
//! | [`UnzipWith2`], [`UnzipWith3`], [`Unzip`] | 1 → 2 or 3 | with upstream |

mod balance;
mod broadcast;
mod concat;
mod merge;
mod partition;
mod unzip;
mod zip;

pub use self::balance::Balance;
pub use self::broadcast::Broadcast;
pub use self::concat::Concat;
pub use self::merge::Merge;
pub use self::partition::Partition;
pub use self::unzip::{Unzip, UnzipWith2, UnzipWith3};
pub use self::zip::{Zip, ZipN, ZipWith};
