//! Nested graph primitives (spec.md §4.6): `map_`/`switch_` over keyed
//! collections, `feedback` loop-back buffers and `delayed_binding`.
//! Grounded on wingfoil's `demux`/`GraphMapStream` (which spawn whole
//! sub-graphs keyed by an incoming value, one child per key, torn down
//! when the key is released — see
//! `wingfoil/src/nodes/demux.rs`'s `DemuxMap`) and `nodes::feedback`
//! (`FeedbackStream`/`FeedbackSink`, a `TimeQueue`-backed loop-back pair
//! with no upstream edge so the graph sees no cycle). Both are
//! generalized here to same-thread child graphs sharing the parent's
//! rank space, since distributed/multi-threaded graph embedding is out
//! of scope for this engine (spec.md §1 Non-goals).
//!
//! A child a `map_`/`switch_` builder constructs is never registered in
//! [crate::plan::PlanBuilder]'s node table — it has no top-level
//! [crate::node::NodeId] of its own, so it must never self-schedule
//! under one. `ChildGraph::eval` reuses the exact same [NodeContext]
//! its owning [MapNode]/[SwitchNode] was itself called with for every
//! child it steps, so `ctx.node_id` inside a child's own `eval`/`start`
//! is always that owner's real, plan-registered id; a child that wants
//! to wake itself up later schedules against `ctx.node_id`, which in
//! turn re-evaluates every live child (itself included) the next time
//! the owner ticks. This is what "child graphs share the engine's time
//! and rank space" (§4.6) actually means in this engine: shared clock,
//! shared rank (inherited unchanged through `ctx.rank`), and shared
//! scheduling identity.

use crate::node::{MutableNode, Node, NodeContext, NodeId};
use crate::plan::PlanBuilder;
use crate::queue::TimeQueue;
use crate::scheduler::ScheduleAt;
use crate::time::EngineTime;
use crate::ts::reference::RefOutput;
use crate::ts::{AnyTsOutput, DynTsHandle, Element, TsChildOutput};
use crate::ts::scalar::TsOutput;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

/// A self-contained set of nodes forming one child of a `map_`/`switch_`
/// instantiation, already in ascending-rank order. `start`/`stop` walk
/// the list forwards/backwards respectively, matching spec.md §4.4's
/// "start in rank order" / "stop in reverse rank order" for ordinary
/// top-level nodes.
#[derive(Debug)]
pub struct ChildGraph {
    nodes: Vec<Rc<dyn Node>>,
}

impl ChildGraph {
    pub fn new(nodes: Vec<Rc<dyn Node>>) -> Self {
        Self { nodes }
    }

    fn start(&self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        for node in &self.nodes {
            node.start(ctx).map_err(anyhow::Error::from)?;
        }
        Ok(())
    }

    fn eval(&self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        for node in &self.nodes {
            node.eval(ctx).map_err(anyhow::Error::from)?;
        }
        Ok(())
    }

    fn stop(&self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        for node in self.nodes.iter().rev() {
            node.stop(ctx).map_err(anyhow::Error::from)?;
        }
        Ok(())
    }
}

/// `map_(fn, tsd)` (spec.md §4.6): one child graph per key, built and
/// started the instant a key first appears, stopped and dropped the
/// instant it's removed. `builder` plays the role of the wiring layer's
/// per-key graph constructor; the engine core only owns the lifecycle.
pub struct MapNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    keys: Rc<crate::ts::set::TssOutput<K>>,
    output: Rc<crate::ts::dict::TsdOutput<K, CHILD>>,
    builder: F,
    children: HashMap<K, ChildGraph>,
}

impl<K, CHILD, F> Debug for MapNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapNode").field("live_keys", &self.children.len()).finish()
    }
}

impl<K, CHILD, F> MapNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    pub fn new(keys: Rc<crate::ts::set::TssOutput<K>>, builder: F) -> Self {
        Self {
            keys,
            output: crate::ts::dict::TsdOutput::new(),
            builder,
            children: HashMap::new(),
        }
    }

    pub fn output(&self) -> &Rc<crate::ts::dict::TsdOutput<K, CHILD>> {
        &self.output
    }
}

impl<K, CHILD, F> MutableNode for MapNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    fn eval(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        let now = ctx.scheduler.now();
        if let Some(delta) = self.keys.delta_value(now) {
            for key in delta.removed {
                if let Some(child) = self.children.remove(&key) {
                    child.stop(ctx)?;
                }
                self.output.remove_key(&key, now);
            }
            for key in delta.added {
                let (child, child_output) = (self.builder)(&key);
                child.start(ctx)?;
                self.output.adopt(key.clone(), child_output, now);
                self.children.insert(key, child);
            }
        }
        for child in self.children.values() {
            child.eval(ctx)?;
        }
        Ok(())
    }

    fn stop(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        for (_, child) in self.children.drain() {
            child.stop(ctx)?;
        }
        Ok(())
    }
}

/// `switch_(branches, key, ...)` (spec.md §4.6): only one child alive at
/// a time. A change of `key` stops the old child (if any), builds and
/// starts the new one, and evaluates it immediately within the same
/// instant so its output is current before downstream nodes at higher
/// rank run.
pub struct SwitchNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    key_input: Rc<TsOutput<K>>,
    current_key: Option<K>,
    current: Option<ChildGraph>,
    output: Rc<RefOutput<CHILD>>,
    builder: F,
}

impl<K, CHILD, F> Debug for SwitchNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchNode")
            .field("current_key", &self.current_key)
            .finish()
    }
}

impl<K, CHILD, F> SwitchNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    pub fn new(key_input: Rc<TsOutput<K>>, builder: F) -> Self {
        Self {
            key_input,
            current_key: None,
            current: None,
            output: RefOutput::new(),
            builder,
        }
    }

    pub fn output(&self) -> &Rc<RefOutput<CHILD>> {
        &self.output
    }
}

impl<K, CHILD, F> MutableNode for SwitchNode<K, CHILD, F>
where
    K: Element + Eq + Hash,
    CHILD: TsChildOutput,
    F: FnMut(&K) -> (ChildGraph, Rc<CHILD>),
{
    fn eval(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        let now = ctx.scheduler.now();
        let new_key = self.key_input.value();
        if new_key.is_some() && new_key != self.current_key {
            if let Some(old) = self.current.take() {
                old.stop(ctx)?;
            }
            let key = new_key.clone().unwrap();
            let (child, child_output) = (self.builder)(&key);
            child.start(ctx)?;
            let handle: DynTsHandle = child_output;
            self.output
                .rebind(&format!("switch:{key:?}"), handle, now)
                .map_err(anyhow::Error::from)?;
            self.current = Some(child);
            self.current_key = new_key;
        }
        if let Some(child) = &self.current {
            child.eval(ctx)?;
        }
        Ok(())
    }

    fn stop(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        if let Some(child) = self.current.take() {
            child.stop(ctx)?;
        }
        Ok(())
    }
}

/// Source half of a `feedback(kind, default?)` loop-back buffer
/// (spec.md §4.6). Grounded on `FeedbackStream`: no upstreams, so the
/// plan sees no cycle; it only ever ticks in response to a scheduled
/// wake-up from its paired [FeedbackWriter].
#[derive(Debug)]
struct FeedbackNode<T: Element + Hash + Eq> {
    output: Rc<TsOutput<T>>,
    queue: Rc<RefCell<TimeQueue<T>>>,
    default: Option<T>,
}

impl<T: Element + Hash + Eq> MutableNode for FeedbackNode<T> {
    fn start(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        if let Some(default) = self.default.clone() {
            self.output.set(default, ctx.scheduler.now());
        }
        Ok(())
    }

    fn eval(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
        let now = ctx.scheduler.now();
        let mut latest = None;
        while self.queue.borrow().pending(now) {
            latest = Some(self.queue.borrow_mut().pop());
        }
        if let Some(value) = latest {
            self.output.set(value, now);
        }
        Ok(())
    }

    fn category(&self) -> crate::node::NodeCategory {
        crate::node::NodeCategory::Source
    }
}

/// Write end of a `feedback` channel (spec.md §4.6). A value written
/// during the current instant's eval is delivered on the *next* instant
/// (`now.succ()`), never the current one — this is what lets a
/// feedback edge close a cycle without the plan rejecting it as cyclic
/// (spec.md §4.5 "feedback edges break cycles by delivering the
/// most-recent value on the NEXT instant").
#[derive(Debug, Clone)]
pub struct FeedbackWriter<T: Element + Hash + Eq> {
    node: NodeId,
    queue: Rc<RefCell<TimeQueue<T>>>,
}

impl<T: Element + Hash + Eq> FeedbackWriter<T> {
    pub fn send(&self, value: T, ctx: &mut NodeContext) {
        let at = ctx.scheduler.now().succ();
        self.queue.borrow_mut().push(value, at);
        ctx.scheduler.schedule(self.node, ScheduleAt::At(at), None);
    }
}

/// Declares a feedback loop-back buffer of `T`, registering its source
/// node in `builder` at rank 0 (no upstreams). Returns the writer and
/// the `TS[T]` output reads are bound against.
pub fn feedback<T: Element + Hash + Eq>(
    builder: &mut PlanBuilder,
    default: Option<T>,
) -> (FeedbackWriter<T>, Rc<TsOutput<T>>) {
    let output = TsOutput::new();
    let queue = Rc::new(RefCell::new(TimeQueue::new()));
    let node = Rc::new(RefCell::new(FeedbackNode {
        output: output.clone(),
        queue: queue.clone(),
        default,
    }));
    let id = builder.add_node(node, 0);
    (FeedbackWriter { node: id, queue }, output)
}

/// `delayed_binding(kind)` (spec.md §4.6): promises an output to be
/// wired later in the same wiring scope. Implemented as a [RefOutput]
/// whose rebind is tracked so [PlanBuilder::build] can reject a plan
/// that declares one and never binds it (spec.md §7 `PlanError`).
pub struct DelayedBinding<X: AnyTsOutput> {
    label: String,
    target: Rc<RefOutput<X>>,
}

impl<X: AnyTsOutput> DelayedBinding<X> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: RefOutput::new(),
        }
    }

    /// The peered-reference view consumers wire against immediately;
    /// it only starts reporting `valid`/`modified` once [Self::bind] is
    /// called.
    pub fn output(&self) -> &Rc<RefOutput<X>> {
        &self.target
    }

    pub fn bind(&self, handle: DynTsHandle, time: EngineTime) -> Result<(), crate::error::EngineError> {
        self.target.rebind(&self.label, handle, time)
    }

    pub fn is_bound(&self) -> bool {
        self.target.is_bound()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<X: AnyTsOutput> crate::plan::DelayedBindingCheck for DelayedBinding<X> {
    fn is_bound(&self) -> bool {
        self.target.is_bound()
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeContext;
    use crate::plan::PlanBuilder;
    use crate::scheduler::SchedulerHandle;
    use crate::ts::dict::TsdOutput;
    use crate::ts::scalar::TsOutput as Ts;
    use crate::ts::set::TssOutput;

    fn ctx(handle: &SchedulerHandle) -> NodeContext<'_> {
        NodeContext { scheduler: handle, rank: 0, node_id: NodeId(0) }
    }

    #[derive(Debug, Default)]
    struct LifecycleCounter {
        starts: Rc<RefCell<u32>>,
        stops: Rc<RefCell<u32>>,
    }

    impl MutableNode for LifecycleCounter {
        fn start(&mut self, _ctx: &mut NodeContext) -> anyhow::Result<()> {
            *self.starts.borrow_mut() += 1;
            Ok(())
        }
        fn eval(&mut self, _ctx: &mut NodeContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn stop(&mut self, _ctx: &mut NodeContext) -> anyhow::Result<()> {
            *self.stops.borrow_mut() += 1;
            Ok(())
        }
    }

    #[test]
    fn map_node_builds_and_tears_down_children_with_keys() {
        let starts = Rc::new(RefCell::new(0));
        let stops = Rc::new(RefCell::new(0));
        let keys: Rc<TssOutput<String>> = TssOutput::new();
        let handle = SchedulerHandle::detached();

        let starts_for_builder = starts.clone();
        let stops_for_builder = stops.clone();
        let mut map_node = MapNode::<String, Ts<i64>, _>::new(keys.clone(), move |_key| {
            let node = Rc::new(RefCell::new(LifecycleCounter {
                starts: starts_for_builder.clone(),
                stops: stops_for_builder.clone(),
            }));
            let output: Rc<Ts<i64>> = Ts::new();
            (ChildGraph::new(vec![node]), output)
        });

        let t0 = EngineTime::MIN_ST;
        keys.insert("a".to_string(), t0);
        map_node.eval(&mut ctx(&handle)).unwrap();
        assert_eq!(*starts.borrow(), 1);
        assert_eq!(*stops.borrow(), 0);
        assert!(map_node.output().contains_key(&"a".to_string()));

        let t1 = t0.succ();
        keys.remove(&"a".to_string(), t1);
        map_node.eval(&mut ctx(&handle)).unwrap();
        assert_eq!(*starts.borrow(), 1);
        assert_eq!(*stops.borrow(), 1);
        assert!(!map_node.output().contains_key(&"a".to_string()));
    }

    #[derive(Debug, Default)]
    struct NodeIdRecorder {
        seen: Rc<RefCell<Vec<NodeId>>>,
    }

    impl MutableNode for NodeIdRecorder {
        fn start(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
            self.seen.borrow_mut().push(ctx.node_id);
            Ok(())
        }
        fn eval(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
            self.seen.borrow_mut().push(ctx.node_id);
            Ok(())
        }
    }

    #[test]
    fn map_node_children_see_owners_node_id_for_self_scheduling() {
        // A child has no NodeId of its own: it must schedule against
        // whatever id the context it's handed carries, which has to be
        // the owning MapNode's real, plan-registered id, not a private
        // one the child invented.
        let seen = Rc::new(RefCell::new(Vec::new()));
        let keys: Rc<TssOutput<String>> = TssOutput::new();
        let handle = SchedulerHandle::detached();

        let seen_for_builder = seen.clone();
        let mut map_node = MapNode::<String, Ts<i64>, _>::new(keys.clone(), move |_key| {
            let node = Rc::new(RefCell::new(NodeIdRecorder { seen: seen_for_builder.clone() }));
            let output: Rc<Ts<i64>> = Ts::new();
            (ChildGraph::new(vec![node]), output)
        });

        let owner_id = NodeId(42);
        let mut owner_ctx = NodeContext { scheduler: &handle, rank: 0, node_id: owner_id };
        keys.insert("a".to_string(), EngineTime::MIN_ST);
        map_node.eval(&mut owner_ctx).unwrap();
        map_node.eval(&mut owner_ctx).unwrap();

        assert!(seen.borrow().iter().all(|id| *id == owner_id));
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn switch_node_start_stop_counts_match_key_changes() {
        let starts = Rc::new(RefCell::new(0));
        let stops = Rc::new(RefCell::new(0));
        let key_input: Rc<Ts<String>> = Ts::new();
        let handle = SchedulerHandle::detached();

        let starts_for_builder = starts.clone();
        let stops_for_builder = stops.clone();
        let mut switch_node = SwitchNode::<String, Ts<i64>, _>::new(key_input.clone(), move |_key| {
            let node = Rc::new(RefCell::new(LifecycleCounter {
                starts: starts_for_builder.clone(),
                stops: stops_for_builder.clone(),
            }));
            let output: Rc<Ts<i64>> = Ts::new();
            (ChildGraph::new(vec![node]), output)
        });

        let mut t = EngineTime::MIN_ST;
        key_input.set("one".to_string(), t);
        switch_node.eval(&mut ctx(&handle)).unwrap();
        t = t.succ();
        key_input.set("two".to_string(), t);
        switch_node.eval(&mut ctx(&handle)).unwrap();

        switch_node.stop(&mut ctx(&handle)).unwrap();
        assert_eq!(*starts.borrow(), 2);
        assert_eq!(*stops.borrow(), 2);
    }

    #[test]
    fn feedback_delivers_on_next_instant_not_current() {
        use crate::scheduler::SchedulerState;
        use std::cell::RefCell as Cell2;

        let mut builder = PlanBuilder::new();
        let (writer, reader) = feedback::<f64>(&mut builder, Some(0.0));
        let plan = builder.build().unwrap();

        let state = Rc::new(Cell2::new(SchedulerState {
            now: EngineTime::MIN_ST,
            ..Default::default()
        }));
        let handle = SchedulerHandle::new(state.clone());
        let mut node_ctx = ctx(&handle);

        plan.node(crate::node::NodeId(0)).node.start(&mut node_ctx).unwrap();
        assert_eq!(reader.value(), Some(0.0));

        writer.send(75.0, &mut node_ctx);
        // same instant: not yet visible
        assert_eq!(reader.value(), Some(0.0));

        // advance to the scheduled instant the way the engine's main loop
        // does between instants, then drain.
        state.borrow_mut().now = EngineTime::MIN_ST.succ();
        plan.node(crate::node::NodeId(0)).node.eval(&mut node_ctx).unwrap();
        assert_eq!(reader.value(), Some(75.0));
    }

    #[test]
    fn delayed_binding_reports_unbound_until_bound() {
        let binding = DelayedBinding::<Ts<i64>>::new("x");
        assert!(!binding.is_bound());
        let target: Rc<Ts<i64>> = Ts::new();
        target.set(1, EngineTime::MIN_ST);
        binding.bind(target, EngineTime::MIN_ST).unwrap();
        assert!(binding.is_bound());
        assert_eq!(binding.output().with_target(|t| t.value()), Some(Some(1)));
    }

    #[test]
    fn plan_build_rejects_unbound_delayed_binding_but_accepts_bound() {
        let binding = Rc::new(DelayedBinding::<Ts<i64>>::new("late"));

        let mut builder = PlanBuilder::new();
        builder.register_delayed_binding(binding.clone());
        assert!(builder.build().is_err());

        let target: Rc<Ts<i64>> = Ts::new();
        binding.bind(target, EngineTime::MIN_ST).unwrap();
        let mut builder = PlanBuilder::new();
        builder.register_delayed_binding(binding);
        assert!(builder.build().is_ok());
    }
}
