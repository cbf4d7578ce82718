// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

/// Materialized value of stages that have nothing to hand back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NotUsed;
