//! The time-series data model (spec.md §3.2): eight TS kinds, each with a
//! paired *output* (writable, owned by the producing node) and *input*
//! (a read-only view bound directly to an output, or toggled active/
//! passive at runtime via [crate::plan::EdgeActivation]).
//!
//! All outputs are dispatched through [AnyTsOutput], an object-safe trait
//! giving the engine and [reference::RefOutput] uniform access to
//! `valid`/`modified`/`last_modified_time`/`invalidate` without knowing
//! the concrete kind — the same role wingfoil's `dyn Node` plays for
//! scheduling, generalized here to the value layer.

pub mod bundle;
pub mod dict;
pub mod list;
pub mod reference;
pub mod scalar;
pub mod set;
pub mod signal;
pub mod window;

pub use bundle::TsbOutput;
pub use dict::{DictDelta, TsdOutput};
pub use list::TslOutput;
pub use reference::RefOutput;
pub use scalar::TsOutput;
pub use set::{SetDelta, TssOutput};
pub use signal::SignalOutput;
pub use window::TswOutput;

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

/// Bound on the element type carried by scalar/container TS kinds. Mirrors
/// wingfoil's `Element` (`Debug + Clone + 'static`); `Default` is not
/// required here since absence is modeled by `Option`/emptiness rather
/// than a sentinel value.
pub trait Element: Debug + Clone + 'static {}
impl<T: Debug + Clone + 'static> Element for T {}

/// Object-safe façade over every concrete TS output kind. Every concrete
/// output holds its mutable state behind its own `RefCell`/`Cell` fields
/// (the way [ObserverNode] itself does) so `&self` is enough here; the
/// engine can then hold a plain `Rc<dyn AnyTsOutput>` without an extra
/// layer of borrow-checking on top.
pub trait AnyTsOutput: Any {
    fn valid(&self) -> bool;
    fn modified(&self, now: EngineTime) -> bool;
    fn last_modified_time(&self) -> Option<EngineTime>;
    fn invalidate(&self);
    fn kind_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// A type-erased handle to any TS output, suitable for storing behind a
/// [reference::RefOutput] or passing across a non-peered binding boundary.
pub type DynTsHandle = Rc<dyn AnyTsOutput>;

/// Bound required of a TS output usable as the child storage of a
/// container kind (TSD/TSL/TSB): something embeddable with its own
/// observer node (bubbling modifications to the container) and able to
/// report a typed delta for the current instant.
pub trait TsChildOutput: AnyTsOutput {
    type Delta: Clone + Debug;

    fn new_default() -> Self
    where
        Self: Sized;
    fn observer(&self) -> &Rc<ObserverNode>;
    fn delta_snapshot(&self, now: EngineTime) -> Option<Self::Delta>;
}
