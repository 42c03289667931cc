//! Node runtime (spec.md §4.4): the lifecycle every node implementation
//! follows, generalized from wingfoil's `MutableNode`/`Node` split (a
//! `&mut self` authoring trait blanket-implemented as `&self` over
//! `RefCell<NODE>` so the engine can hold nodes behind `Rc<dyn Node>`
//! without every author writing interior mutability by hand).
//!
//! Unlike wingfoil's `cycle(&mut self, state) -> bool`, phases here return
//! `anyhow::Result<()>` so a failing `eval` can be distinguished from one
//! that simply declined to produce — the engine needs that distinction to
//! implement `NodeError`/`recover` (spec.md §7), which a bare bool can't
//! express.

use crate::error::EngineError;
use crate::scheduler::SchedulerHandle;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::{Debug, Display};

/// A node's position in the plan's node table, assigned once at build
/// time (spec.md §6.1) and stable for the life of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Policy-only classification of a node (spec.md §4.4). Does not change
/// the trait surface — a generator just happens to ignore its scheduled
/// inputs and a sink just happens to never write an output — but the
/// plan validator and the scheduler's termination check (§4.5) both
/// consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    /// No inputs; advances a lazily-generated sequence of `(time, value)`.
    Source,
    /// Externally tickled via a push queue sender (§4.7).
    PushSource,
    /// Inputs and an output.
    Compute,
    /// Inputs only; may request engine stop.
    Sink,
}

/// Context handed to every phase: the scheduler handle (for
/// `schedule`/`request_stop`), the node's own rank (mostly useful for
/// log/error messages), and the currently-evaluating node's own
/// top-level [NodeId]. A self-scheduling child built by
/// [crate::nested::MapNode]/[crate::nested::SwitchNode] has no
/// `NodeId` of its own — it schedules through `node_id`, which is
/// always its owning map/switch node's real, plan-registered id, since
/// `ctx` flows unchanged from the owner's own `eval` down into every
/// child it evaluates (spec.md §4.6: "child graphs share the engine's
/// time and rank space").
pub struct NodeContext<'a> {
    pub scheduler: &'a SchedulerHandle,
    pub rank: u32,
    pub node_id: NodeId,
}

/// Authoring trait: implement this (by hand, or via a nested-graph
/// primitive) to define a node's behavior. `&mut self` — the blanket
/// [Node] impl over `RefCell<NODE>` supplies the interior mutability the
/// engine needs to hold a read-only `Rc<dyn Node>`.
pub trait MutableNode: Debug {
    /// Runs once, before the first `eval`, in rank order, after every
    /// output exists and every edge is bound.
    #[allow(unused_variables)]
    fn start(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs whenever the ready predicate holds at the engine's current
    /// time (spec.md §4.4): all `valid`-flagged inputs valid, all
    /// `all_valid`-flagged inputs valid down to every child, and at
    /// least one `active`-flagged input modified (or an explicit
    /// schedule firing). The engine, not this trait, evaluates that
    /// predicate from the node's [crate::plan::NodeSpec]; by the time
    /// `eval` runs it already holds.
    fn eval(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()>;

    /// Runs once when the engine shuts down, or when the enclosing
    /// nested graph is torn down, in reverse rank order.
    #[allow(unused_variables)]
    fn stop(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Compute
    }

    /// If true, an error from any phase is logged and the node is
    /// skipped for the rest of the run instead of unwinding the engine
    /// (spec.md §7 `NodeError`'s `recover` declaration).
    fn recovers(&self) -> bool {
        false
    }

    fn type_name(&self) -> String {
        tynm::type_name::<Self>()
    }

    /// Captures this node's private state for a suspend/resume cycle
    /// (spec.md §6.4), via [crate::persist::Checkpoint] if the node
    /// implements it. `None` means this node carries nothing worth
    /// checkpointing; its `start()` reinitializes it from scratch on
    /// resume instead.
    fn checkpoint_save(&self) -> Option<serde_json::Value> {
        None
    }

    /// Restores state captured by [Self::checkpoint_save] into a freshly
    /// built node, before `start()` runs.
    #[allow(unused_variables)]
    fn checkpoint_restore(&mut self, state: serde_json::Value) {}
}

/// Engine-facing trait: the `&self` surface the scheduler dispatches
/// through. Blanket-implemented for `RefCell<NODE>` exactly the way
/// wingfoil implements `Node` for `RefCell<NODE: MutableNode>`.
pub trait Node: Debug {
    fn start(&self, ctx: &mut NodeContext) -> Result<(), EngineError>;
    fn eval(&self, ctx: &mut NodeContext) -> Result<(), EngineError>;
    fn stop(&self, ctx: &mut NodeContext) -> Result<(), EngineError>;
    fn category(&self) -> NodeCategory;
    fn recovers(&self) -> bool;
    fn type_name(&self) -> String;
    fn checkpoint_save(&self) -> Option<serde_json::Value>;
    fn checkpoint_restore(&self, state: serde_json::Value);
}

impl Display for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

fn wrap_phase_error(
    node_name: String,
    phase: &'static str,
    result: anyhow::Result<()>,
) -> Result<(), EngineError> {
    result.map_err(|source| EngineError::Node {
        node: node_name,
        phase,
        source,
    })
}

impl<NODE: MutableNode> Node for RefCell<NODE> {
    fn start(&self, ctx: &mut NodeContext) -> Result<(), EngineError> {
        let name = self.borrow().type_name();
        wrap_phase_error(name, "start", self.borrow_mut().start(ctx))
    }
    fn eval(&self, ctx: &mut NodeContext) -> Result<(), EngineError> {
        let name = self.borrow().type_name();
        wrap_phase_error(name, "eval", self.borrow_mut().eval(ctx))
    }
    fn stop(&self, ctx: &mut NodeContext) -> Result<(), EngineError> {
        let name = self.borrow().type_name();
        wrap_phase_error(name, "stop", self.borrow_mut().stop(ctx))
    }
    fn category(&self) -> NodeCategory {
        self.borrow().category()
    }
    fn recovers(&self) -> bool {
        self.borrow().recovers()
    }
    fn type_name(&self) -> String {
        self.borrow().type_name()
    }
    fn checkpoint_save(&self) -> Option<serde_json::Value> {
        self.borrow().checkpoint_save()
    }
    fn checkpoint_restore(&self, state: serde_json::Value) {
        self.borrow_mut().checkpoint_restore(state)
    }
}
