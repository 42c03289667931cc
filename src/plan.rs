//! The immutable build plan (spec.md §6.1): the node table and the edge
//! table the scheduler walks, assembled once by the wiring layer (out of
//! scope) and validated before the engine ever runs. Grounded on
//! wingfoil's `Graph::new` node/edge bookkeeping (`NodeData` with
//! `upstreams`/`downstreams: Vec<(usize, bool)>` and a `layer` — renamed
//! here to `rank` per spec terminology) with the cycle/rank checks it
//! performs implicitly during traversal pulled out into an explicit,
//! fallible `PlanBuilder::build`.

use crate::error::PlanError;
use crate::node::{Node, NodeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// A cheaply-cloned handle onto one edge's active/passive flag (spec.md
/// §4.3: "Nodes may toggle inputs between active and passive at
/// runtime"). Returned from [PlanBuilder::add_edge]/
/// [PlanBuilder::add_feedback_edge] so whichever node owns the
/// consuming input can hold it and flip it during its own `eval`, the
/// same way [crate::nested::FeedbackWriter] holds a handle back into the
/// plan rather than the plan reaching into the node.
#[derive(Debug, Clone)]
pub struct EdgeActivation(Rc<Cell<bool>>);

impl EdgeActivation {
    fn new(active: bool) -> Self {
        Self(Rc::new(Cell::new(active)))
    }

    pub fn is_active(&self) -> bool {
        self.0.get()
    }

    pub fn set_active(&self, active: bool) {
        self.0.set(active);
    }
}

/// One entry in the plan's flat downstream table: which node to wake,
/// and whether this edge is currently active (wakes its owner on tick)
/// or passive (recorded for completeness but never schedules).
#[derive(Debug, Clone)]
pub struct DownstreamEdge {
    pub target: NodeId,
    pub active: EdgeActivation,
}

#[derive(Debug)]
pub struct NodeSpec {
    pub id: NodeId,
    pub node: Rc<dyn Node>,
    pub rank: u32,
    pub downstreams: Vec<DownstreamEdge>,
}

/// The assembled, validated plan. Never mutates once built; a new key
/// appearing under `map_`/`switch_` (§4.6) grows a *child* plan sharing
/// this one's rank space, not this plan itself.
#[derive(Debug)]
pub struct GraphPlan {
    pub(crate) nodes: Vec<NodeSpec>,
}

impl GraphPlan {
    pub fn node(&self, id: NodeId) -> &NodeSpec {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.iter()
    }
}

/// A not-yet-validated edge, as recorded by the wiring layer.
struct PendingEdge {
    from: NodeId,
    to: NodeId,
    active: EdgeActivation,
    /// Feedback edges (§4.6) are exempt from the strictly-increasing-rank
    /// check: they deliver on the *next* instant, so they never need
    /// their target to out-rank their source within one instant.
    is_feedback: bool,
}

/// An object-safe check on a [crate::nested::DelayedBinding] registered
/// with a [PlanBuilder], so `build()` can reject a plan that declares
/// one and never binds it (spec.md §7 `PlanError`) without the builder
/// needing to know the bound kind `X`.
pub trait DelayedBindingCheck {
    fn is_bound(&self) -> bool;
    fn label(&self) -> String;
}

#[derive(Default)]
pub struct PlanBuilder {
    nodes: Vec<(Rc<dyn Node>, u32)>,
    edges: Vec<PendingEdge>,
    delayed_bindings: Vec<Rc<dyn DelayedBindingCheck>>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Rc<dyn Node>, rank: u32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push((node, rank));
        id
    }

    /// Registers a [crate::nested::DelayedBinding] so [Self::build] can
    /// verify it was bound before the plan is considered valid.
    pub fn register_delayed_binding(&mut self, binding: Rc<dyn DelayedBindingCheck>) {
        self.delayed_bindings.push(binding);
    }

    /// Registers an edge from `from` to `to`, starting active or passive
    /// per `active`. Returns a handle the consuming node can hold onto to
    /// toggle the edge's activation at runtime.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, active: bool) -> EdgeActivation {
        let activation = EdgeActivation::new(active);
        self.edges.push(PendingEdge {
            from,
            to,
            active: activation.clone(),
            is_feedback: false,
        });
        activation
    }

    /// Registers a feedback edge (§4.6): exempt from the rank-ordering
    /// check since its value is always one instant stale.
    pub fn add_feedback_edge(&mut self, from: NodeId, to: NodeId) -> EdgeActivation {
        let activation = EdgeActivation::new(true);
        self.edges.push(PendingEdge {
            from,
            to,
            active: activation.clone(),
            is_feedback: true,
        });
        activation
    }

    pub fn build(self) -> Result<GraphPlan, PlanError> {
        for binding in &self.delayed_bindings {
            if !binding.is_bound() {
                return Err(PlanError::UnboundDelayedBinding(binding.label()));
            }
        }

        let ranks: Vec<u32> = self.nodes.iter().map(|(_, rank)| *rank).collect();
        let names: Vec<String> = self.nodes.iter().map(|(node, _)| node.type_name()).collect();

        for edge in &self.edges {
            if edge.is_feedback {
                continue;
            }
            let from_rank = ranks[edge.from.0 as usize];
            let to_rank = ranks[edge.to.0 as usize];
            if to_rank <= from_rank {
                return Err(PlanError::NonIncreasingRank {
                    from: names[edge.from.0 as usize].clone(),
                    from_rank,
                    to: names[edge.to.0 as usize].clone(),
                    to_rank,
                });
            }
        }

        let mut downstreams: HashMap<NodeId, Vec<DownstreamEdge>> = HashMap::new();
        for edge in self.edges {
            downstreams.entry(edge.from).or_default().push(DownstreamEdge {
                target: edge.to,
                active: edge.active,
            });
        }

        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(i, (node, rank))| {
                let id = NodeId(i as u32);
                NodeSpec {
                    id,
                    node,
                    rank,
                    downstreams: downstreams.remove(&id).unwrap_or_default(),
                }
            })
            .collect();

        Ok(GraphPlan { nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MutableNode, NodeContext};
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    struct Noop;
    impl MutableNode for Noop {
        fn eval(&mut self, _ctx: &mut NodeContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noop() -> Rc<dyn Node> {
        Rc::new(RefCell::new(Noop))
    }

    #[test]
    fn build_succeeds_when_ranks_strictly_increase() {
        let mut builder = PlanBuilder::new();
        let a = builder.add_node(noop(), 0);
        let b = builder.add_node(noop(), 1);
        builder.add_edge(a, b, true);
        let plan = builder.build().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.node(a).downstreams[0].target, b);
    }

    #[test]
    fn build_rejects_non_increasing_rank() {
        let mut builder = PlanBuilder::new();
        let a = builder.add_node(noop(), 1);
        let b = builder.add_node(noop(), 1);
        builder.add_edge(a, b, true);
        let err = builder.build().unwrap_err();
        assert!(matches!(err, PlanError::NonIncreasingRank { .. }));
    }

    #[test]
    fn feedback_edge_is_exempt_from_rank_check() {
        let mut builder = PlanBuilder::new();
        let a = builder.add_node(noop(), 2);
        let b = builder.add_node(noop(), 0);
        builder.add_feedback_edge(a, b);
        assert!(builder.build().is_ok());
    }

    struct AlwaysUnbound;
    impl DelayedBindingCheck for AlwaysUnbound {
        fn is_bound(&self) -> bool {
            false
        }
        fn label(&self) -> String {
            "x".to_string()
        }
    }

    #[test]
    fn build_rejects_unbound_delayed_binding() {
        let mut builder = PlanBuilder::new();
        builder.register_delayed_binding(Rc::new(AlwaysUnbound));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, PlanError::UnboundDelayedBinding(label) if label == "x"));
    }
}
