// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Typed stage ports.
//!
//! A port is identified by the graph node that owns it and its index among that
//! node's inlets (or outlets). Inside a stage definition the node is always `0`;
//! composing graphs shifts the node so the same blueprint can be embedded many
//! times. Stage logic only ever looks at the index.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

/// Element travelling over a connection. Types are checked when the graph is
/// validated and again when the element is grabbed.
pub(crate) type Element = Box<dyn Any + Send>;

/// Description of one port used for validation and wiring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub(crate) node: usize,
    pub(crate) index: usize,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
}

impl PortInfo {
    pub(crate) fn shifted(self, offset: usize) -> Self {
        Self {
            node: self.node + offset,
            ..self
        }
    }
}

/// Consuming port of a stage.
pub struct Inlet<T> {
    pub(crate) node: usize,
    pub(crate) index: usize,
    _marker: PhantomData<fn() -> T>,
}

/// Producing port of a stage.
pub struct Outlet<T> {
    pub(crate) node: usize,
    pub(crate) index: usize,
    _marker: PhantomData<fn() -> T>,
}

macro_rules! port_impls {
    ($port:ident) => {
        impl<T> $port<T> {
            /// Port with the given index on the stage being defined.
            #[must_use]
            pub const fn new(index: usize) -> Self {
                Self {
                    node: 0,
                    index,
                    _marker: PhantomData,
                }
            }

            /// Index of the port among the stage's ports of the same direction.
            #[must_use]
            pub const fn index(&self) -> usize {
                self.index
            }

            #[must_use]
            pub(crate) const fn shifted(self, offset: usize) -> Self {
                Self {
                    node: self.node + offset,
                    index: self.index,
                    _marker: PhantomData,
                }
            }
        }

        impl<T: 'static> $port<T> {
            pub(crate) fn info(&self) -> PortInfo {
                PortInfo {
                    node: self.node,
                    index: self.index,
                    type_id: TypeId::of::<T>(),
                    type_name: type_name::<T>(),
                }
            }
        }

        impl<T> Clone for $port<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $port<T> {}

        impl<T> PartialEq for $port<T> {
            fn eq(&self, other: &Self) -> bool {
                self.node == other.node && self.index == other.index
            }
        }

        impl<T> Eq for $port<T> {}

        impl<T> fmt::Debug for $port<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{}<{}>({}.{})",
                    stringify!($port),
                    type_name::<T>(),
                    self.node,
                    self.index
                )
            }
        }
    };
}

port_impls!(Inlet);
port_impls!(Outlet);

/// Direction and index of a port, as seen from the stage that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortId {
    /// Inlet with the given index
    In(usize),
    /// Outlet with the given index
    Out(usize),
}

mod sealed {
    pub trait Sealed {}
    impl<T> Sealed for super::Inlet<T> {}
    impl<T> Sealed for super::Outlet<T> {}
}

/// Either an [`Inlet`] or an [`Outlet`]; accepted by port queries such as
/// `StageContext::is_closed`.
pub trait PortHandle: sealed::Sealed + Copy {
    /// Direction and index of the port.
    fn port_id(&self) -> PortId;
}

impl<T> PortHandle for Inlet<T> {
    fn port_id(&self) -> PortId {
        PortId::In(self.index)
    }
}

impl<T> PortHandle for Outlet<T> {
    fn port_id(&self) -> PortId {
        PortId::Out(self.index)
    }
}
