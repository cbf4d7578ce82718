// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Stage blueprints.
//!
//! A [`GraphStage`] is an immutable, shareable description. Each materialization
//! asks it for a fresh [`StageLogic`] plus the stage's materialized value, so the
//! same blueprint can run any number of times concurrently.

use crate::logic::StageLogic;
use crate::port::PortInfo;
use crate::shape::Shape;
use sluice_core::{Attributes, Result};
use std::any::{type_name, Any};

/// Blueprint of a single processing stage.
///
/// # Example
///
/// ```
/// use sluice_core::{Attributes, NotUsed, Result};
/// use sluice_stream::prelude::*;
/// use sluice_stream::{FlowShape, GraphStage, Inlet, Outlet, StageContext, StageLogic};
///
/// struct Double;
///
/// struct DoubleLogic {
///     shape: FlowShape<u32, u32>,
/// }
///
/// impl StageLogic for DoubleLogic {
///     fn on_push(&mut self, ctx: &mut StageContext<'_>, _inlet: usize) -> Result<()> {
///         let value = ctx.grab(self.shape.inlet)?;
///         ctx.push(self.shape.outlet, value * 2)
///     }
///
///     fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
///         ctx.pull(self.shape.inlet)
///     }
/// }
///
/// impl GraphStage for Double {
///     type Shape = FlowShape<u32, u32>;
///     type Mat = NotUsed;
///
///     fn shape(&self) -> Self::Shape {
///         FlowShape::new()
///     }
///
///     fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
///         Ok((Box::new(DoubleLogic { shape: self.shape() }), NotUsed))
///     }
/// }
///
/// let doubled: Flow<u32, u32> = Flow::from_graph_stage(Double);
/// # let _ = doubled;
/// ```
pub trait GraphStage: Send + Sync + 'static {
    /// Ports exposed by the stage.
    type Shape: Shape;

    /// Value handed back to the caller when the stage is materialized.
    type Mat: Send + 'static;

    /// The stage's ports, with indices starting at zero per direction.
    fn shape(&self) -> Self::Shape;

    /// Attributes the stage carries by default, typically its name.
    fn initial_attributes(&self) -> Attributes {
        Attributes::none()
    }

    /// Create the running logic and the materialized value.
    ///
    /// `attributes` are the effective attributes of this stage instance, with
    /// materializer defaults and enclosing composites already applied.
    ///
    /// # Errors
    /// A stage that can only be materialized once returns an error on the second
    /// attempt; the materialization as a whole then fails.
    fn create_logic(&self, attributes: &Attributes) -> Result<(Box<dyn StageLogic>, Self::Mat)>;

    /// Whether the stage may sit on a cycle of the graph.
    ///
    /// Such a stage must never wait for demand on one port before serving
    /// another; it owns a queue instead.
    fn breaks_cycles(&self) -> bool {
        false
    }
}

/// Object-safe view of a [`GraphStage`] used by graphs and the materializer.
pub(crate) trait ErasedStage: Send + Sync {
    fn inlets(&self) -> Vec<PortInfo>;

    fn outlets(&self) -> Vec<PortInfo>;

    fn create(&self, attributes: &Attributes) -> Result<(Box<dyn StageLogic>, Box<dyn Any + Send>)>;

    fn breaks_cycles(&self) -> bool;

    fn label(&self) -> &'static str;
}

impl<S: GraphStage> ErasedStage for S {
    fn inlets(&self) -> Vec<PortInfo> {
        self.shape().inlets()
    }

    fn outlets(&self) -> Vec<PortInfo> {
        self.shape().outlets()
    }

    fn create(&self, attributes: &Attributes) -> Result<(Box<dyn StageLogic>, Box<dyn Any + Send>)> {
        let (logic, mat) = self.create_logic(attributes)?;
        Ok((logic, Box::new(mat)))
    }

    fn breaks_cycles(&self) -> bool {
        GraphStage::breaks_cycles(self)
    }

    fn label(&self) -> &'static str {
        short_type_name(type_name::<S>())
    }
}

/// `sluice_stream::stages::simple::Map<F, u32>` becomes `Map`.
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::short_type_name;

    #[test]
    fn short_type_name_strips_path_and_generics() {
        assert_eq!(short_type_name("a::b::Map<c::F, u32>"), "Map");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
