// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Test utilities and fixtures for the sluice stream engine.
//!
//! This crate is meant for development and testing only. It depends on
//! `sluice-core` alone, so every sluice crate can use it from its tests.
//!
//! # Key Types
//!
//! ## `TestError`
//!
//! A concrete user error to inject into pipelines and find again in the
//! failure they produce:
//!
//! ```rust
//! use sluice_test_utils::{fail_on, TestError};
//!
//! let check = fail_on(3);
//! assert_eq!(check(1).ok(), Some(1));
//!
//! let error = check(3).unwrap_err();
//! assert_eq!(
//!     error.downcast_user_error::<TestError>(),
//!     Some(&TestError::new("rejected 3"))
//! );
//! ```
//!
//! ## `ResourceTracker`
//!
//! Counts opens and closes of [`TrackedResource`]s so tests can check that a
//! resource is released exactly once:
//!
//! ```rust
//! use sluice_test_utils::ResourceTracker;
//!
//! let tracker = ResourceTracker::new();
//! let mut resource = tracker.open(vec![1, 2]);
//! assert_eq!(resource.read(), Some(1));
//! resource.close();
//!
//! assert_eq!((tracker.opened(), tracker.closed()), (1, 1));
//! ```
//!
//! ## Helpers
//!
//! - [`await_within`] - await a future, panicking after a timeout
//! - [`assert_pending_for`] - check a future stays pending for a while
//! - [`init_tracing`] - install a test subscriber once per process

pub mod error_injection;
pub mod helpers;
pub mod tracked_resource;
pub mod tracing_init;

pub use error_injection::{fail_on, test_error, TestError};
pub use helpers::{assert_pending_for, await_within};
pub use tracked_resource::{ResourceTracker, TrackedResource};
pub use tracing_init::init_tracing;
