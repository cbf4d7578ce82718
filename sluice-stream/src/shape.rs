// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Shapes: the open ports a stage or composite exposes.
//!
//! Stage constructors build their shape with [`Inlet::new`] / [`Outlet::new`]
//! indices starting at zero for each direction; `shifted` is applied when the
//! stage is placed into a larger graph.

use crate::port::{Inlet, Outlet, PortInfo};

/// Set of open ports of a graph component.
pub trait Shape: Clone + Send + Sync + 'static {
    /// Inlets in index order.
    fn inlets(&self) -> Vec<PortInfo>;

    /// Outlets in index order.
    fn outlets(&self) -> Vec<PortInfo>;

    /// Same shape with every port moved `offset` nodes further into a graph.
    #[must_use]
    fn shifted(&self, offset: usize) -> Self;
}

/// Shape of a fully connected graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClosedShape;

impl Shape for ClosedShape {
    fn inlets(&self) -> Vec<PortInfo> {
        Vec::new()
    }

    fn outlets(&self) -> Vec<PortInfo> {
        Vec::new()
    }

    fn shifted(&self, _offset: usize) -> Self {
        Self
    }
}

/// One outlet.
#[derive(Debug)]
pub struct SourceShape<T> {
    /// The produced stream
    pub out: Outlet<T>,
}

impl<T> SourceShape<T> {
    /// Shape of a stage with a single outlet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            out: Outlet::new(0),
        }
    }
}

impl<T> Default for SourceShape<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SourceShape<T> {
    fn clone(&self) -> Self {
        Self { out: self.out }
    }
}

impl<T: Send + 'static> Shape for SourceShape<T> {
    fn inlets(&self) -> Vec<PortInfo> {
        Vec::new()
    }

    fn outlets(&self) -> Vec<PortInfo> {
        vec![self.out.info()]
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            out: self.out.shifted(offset),
        }
    }
}

/// One inlet.
#[derive(Debug)]
pub struct SinkShape<T> {
    /// The consumed stream
    pub inlet: Inlet<T>,
}

impl<T> SinkShape<T> {
    /// Shape of a stage with a single inlet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inlet: Inlet::new(0),
        }
    }
}

impl<T> Default for SinkShape<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SinkShape<T> {
    fn clone(&self) -> Self {
        Self { inlet: self.inlet }
    }
}

impl<T: Send + 'static> Shape for SinkShape<T> {
    fn inlets(&self) -> Vec<PortInfo> {
        vec![self.inlet.info()]
    }

    fn outlets(&self) -> Vec<PortInfo> {
        Vec::new()
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            inlet: self.inlet.shifted(offset),
        }
    }
}

/// One inlet and one outlet.
#[derive(Debug)]
pub struct FlowShape<I, O> {
    /// Consumed stream
    pub inlet: Inlet<I>,
    /// Produced stream
    pub outlet: Outlet<O>,
}

impl<I, O> FlowShape<I, O> {
    /// Shape of a stage with one inlet and one outlet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inlet: Inlet::new(0),
            outlet: Outlet::new(0),
        }
    }

    /// Flow shape exposing the given ports of a composite.
    #[must_use]
    pub const fn of(inlet: Inlet<I>, outlet: Outlet<O>) -> Self {
        Self { inlet, outlet }
    }
}

impl<I, O> Default for FlowShape<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> Clone for FlowShape<I, O> {
    fn clone(&self) -> Self {
        Self {
            inlet: self.inlet,
            outlet: self.outlet,
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Shape for FlowShape<I, O> {
    fn inlets(&self) -> Vec<PortInfo> {
        vec![self.inlet.info()]
    }

    fn outlets(&self) -> Vec<PortInfo> {
        vec![self.outlet.info()]
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            inlet: self.inlet.shifted(offset),
            outlet: self.outlet.shifted(offset),
        }
    }
}

/// `n` inlets of one type merged into one outlet.
#[derive(Debug)]
pub struct UniformFanInShape<I, O> {
    /// Inputs in index order
    pub inlets: Vec<Inlet<I>>,
    /// Output
    pub out: Outlet<O>,
}

impl<I, O> UniformFanInShape<I, O> {
    /// Fan-in shape with `n` inlets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            inlets: (0..n).map(Inlet::new).collect(),
            out: Outlet::new(0),
        }
    }
}

impl<I, O> Clone for UniformFanInShape<I, O> {
    fn clone(&self) -> Self {
        Self {
            inlets: self.inlets.clone(),
            out: self.out,
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Shape for UniformFanInShape<I, O> {
    fn inlets(&self) -> Vec<PortInfo> {
        self.inlets.iter().map(Inlet::info).collect()
    }

    fn outlets(&self) -> Vec<PortInfo> {
        vec![self.out.info()]
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            inlets: self.inlets.iter().map(|i| i.shifted(offset)).collect(),
            out: self.out.shifted(offset),
        }
    }
}

/// One inlet fanned out to `n` outlets of one type.
#[derive(Debug)]
pub struct UniformFanOutShape<I, O> {
    /// Input
    pub inlet: Inlet<I>,
    /// Outputs in index order
    pub outlets: Vec<Outlet<O>>,
}

impl<I, O> UniformFanOutShape<I, O> {
    /// Fan-out shape with `n` outlets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            inlet: Inlet::new(0),
            outlets: (0..n).map(Outlet::new).collect(),
        }
    }
}

impl<I, O> Clone for UniformFanOutShape<I, O> {
    fn clone(&self) -> Self {
        Self {
            inlet: self.inlet,
            outlets: self.outlets.clone(),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Shape for UniformFanOutShape<I, O> {
    fn inlets(&self) -> Vec<PortInfo> {
        vec![self.inlet.info()]
    }

    fn outlets(&self) -> Vec<PortInfo> {
        self.outlets.iter().map(Outlet::info).collect()
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            inlet: self.inlet.shifted(offset),
            outlets: self.outlets.iter().map(|o| o.shifted(offset)).collect(),
        }
    }
}

/// Two differently typed inlets and one outlet.
#[derive(Debug)]
pub struct FanInShape2<I0, I1, O> {
    /// First input
    pub in0: Inlet<I0>,
    /// Second input
    pub in1: Inlet<I1>,
    /// Output
    pub out: Outlet<O>,
}

impl<I0, I1, O> FanInShape2<I0, I1, O> {
    /// Shape with inlets 0 and 1 and outlet 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in0: Inlet::new(0),
            in1: Inlet::new(1),
            out: Outlet::new(0),
        }
    }
}

impl<I0, I1, O> Default for FanInShape2<I0, I1, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I0, I1, O> Clone for FanInShape2<I0, I1, O> {
    fn clone(&self) -> Self {
        Self {
            in0: self.in0,
            in1: self.in1,
            out: self.out,
        }
    }
}

impl<I0, I1, O> Shape for FanInShape2<I0, I1, O>
where
    I0: Send + 'static,
    I1: Send + 'static,
    O: Send + 'static,
{
    fn inlets(&self) -> Vec<PortInfo> {
        vec![self.in0.info(), self.in1.info()]
    }

    fn outlets(&self) -> Vec<PortInfo> {
        vec![self.out.info()]
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            in0: self.in0.shifted(offset),
            in1: self.in1.shifted(offset),
            out: self.out.shifted(offset),
        }
    }
}

/// One inlet and two differently typed outlets.
#[derive(Debug)]
pub struct FanOutShape2<I, O0, O1> {
    /// Input
    pub inlet: Inlet<I>,
    /// First output
    pub out0: Outlet<O0>,
    /// Second output
    pub out1: Outlet<O1>,
}

impl<I, O0, O1> FanOutShape2<I, O0, O1> {
    /// Shape with inlet 0 and outlets 0 and 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inlet: Inlet::new(0),
            out0: Outlet::new(0),
            out1: Outlet::new(1),
        }
    }
}

impl<I, O0, O1> Default for FanOutShape2<I, O0, O1> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O0, O1> Clone for FanOutShape2<I, O0, O1> {
    fn clone(&self) -> Self {
        Self {
            inlet: self.inlet,
            out0: self.out0,
            out1: self.out1,
        }
    }
}

impl<I, O0, O1> Shape for FanOutShape2<I, O0, O1>
where
    I: Send + 'static,
    O0: Send + 'static,
    O1: Send + 'static,
{
    fn inlets(&self) -> Vec<PortInfo> {
        vec![self.inlet.info()]
    }

    fn outlets(&self) -> Vec<PortInfo> {
        vec![self.out0.info(), self.out1.info()]
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            inlet: self.inlet.shifted(offset),
            out0: self.out0.shifted(offset),
            out1: self.out1.shifted(offset),
        }
    }
}

/// One inlet and three differently typed outlets.
#[derive(Debug)]
pub struct FanOutShape3<I, O0, O1, O2> {
    /// Input
    pub inlet: Inlet<I>,
    /// First output
    pub out0: Outlet<O0>,
    /// Second output
    pub out1: Outlet<O1>,
    /// Third output
    pub out2: Outlet<O2>,
}

impl<I, O0, O1, O2> FanOutShape3<I, O0, O1, O2> {
    /// Shape with inlet 0 and outlets 0, 1 and 2.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inlet: Inlet::new(0),
            out0: Outlet::new(0),
            out1: Outlet::new(1),
            out2: Outlet::new(2),
        }
    }
}

impl<I, O0, O1, O2> Default for FanOutShape3<I, O0, O1, O2> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O0, O1, O2> Clone for FanOutShape3<I, O0, O1, O2> {
    fn clone(&self) -> Self {
        Self {
            inlet: self.inlet,
            out0: self.out0,
            out1: self.out1,
            out2: self.out2,
        }
    }
}

impl<I, O0, O1, O2> Shape for FanOutShape3<I, O0, O1, O2>
where
    I: Send + 'static,
    O0: Send + 'static,
    O1: Send + 'static,
    O2: Send + 'static,
{
    fn inlets(&self) -> Vec<PortInfo> {
        vec![self.inlet.info()]
    }

    fn outlets(&self) -> Vec<PortInfo> {
        vec![self.out0.info(), self.out1.info(), self.out2.info()]
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            inlet: self.inlet.shifted(offset),
            out0: self.out0.shifted(offset),
            out1: self.out1.shifted(offset),
            out2: self.out2.shifted(offset),
        }
    }
}

/// Two flows running in opposite directions through one stage.
///
/// `in1 -> out1` is the top (outgoing) direction, `in2 -> out2` the bottom
/// (returning) direction.
#[derive(Debug)]
pub struct BidiShape<I1, O1, I2, O2> {
    /// Top input
    pub in1: Inlet<I1>,
    /// Top output
    pub out1: Outlet<O1>,
    /// Bottom input
    pub in2: Inlet<I2>,
    /// Bottom output
    pub out2: Outlet<O2>,
}

impl<I1, O1, I2, O2> BidiShape<I1, O1, I2, O2> {
    /// Shape with inlets 0 (top) and 1 (bottom) and outlets 0 (top) and 1 (bottom).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in1: Inlet::new(0),
            out1: Outlet::new(0),
            in2: Inlet::new(1),
            out2: Outlet::new(1),
        }
    }
}

impl<I1, O1, I2, O2> Default for BidiShape<I1, O1, I2, O2> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I1, O1, I2, O2> Clone for BidiShape<I1, O1, I2, O2> {
    fn clone(&self) -> Self {
        Self {
            in1: self.in1,
            out1: self.out1,
            in2: self.in2,
            out2: self.out2,
        }
    }
}

impl<I1, O1, I2, O2> Shape for BidiShape<I1, O1, I2, O2>
where
    I1: Send + 'static,
    O1: Send + 'static,
    I2: Send + 'static,
    O2: Send + 'static,
{
    fn inlets(&self) -> Vec<PortInfo> {
        vec![self.in1.info(), self.in2.info()]
    }

    fn outlets(&self) -> Vec<PortInfo> {
        vec![self.out1.info(), self.out2.info()]
    }

    fn shifted(&self, offset: usize) -> Self {
        Self {
            in1: self.in1.shifted(offset),
            out1: self.out1.shifted(offset),
            in2: self.in2.shifted(offset),
            out2: self.out2.shifted(offset),
        }
    }
}
