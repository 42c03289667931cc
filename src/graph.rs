//! Scheduler & engine (spec.md §4.5): the main loop that drains the
//! pending set, cycles the current instant's eval batch in rank order,
//! and advances the logical clock. Grounded on wingfoil's
//! `Graph`/`GraphState` (`dirty_nodes_by_layer: Vec<Vec<usize>>` cycled
//! layer-by-layer, `ready_callbacks` crossbeam channel for real-time
//! wake-ups) — "layer" renamed "rank" throughout, and the re-sort-within-
//! instant guarantee wingfoil gets "for free" by only ever marking a
//! strictly-higher layer dirty during the current sweep is preserved
//! unchanged here for the same reason (plan validation rejects edges
//! that don't strictly increase rank, §6.1).

use crate::error::EngineError;
use crate::node::{NodeContext, NodeId};
use crate::persist::{EngineSnapshot, PendingEntry};
use crate::plan::GraphPlan;
use crate::scheduler::{SchedulerHandle, SchedulerState};
use crate::time::{EngineTime, TimeDelta};
use crossbeam::channel::{Receiver, Sender};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Whether the engine runs against a logical clock driven purely by
/// scheduled callbacks (deterministic, no wall-clock waits) or against
/// real wall-clock time, waking for push-queue arrivals in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Simulation { start: EngineTime },
    RealTime,
}

/// How long the engine should run for.
#[derive(Clone, Copy, Debug)]
pub enum RunFor {
    Duration(Duration),
    Cycles(u32),
    Until(EngineTime),
    Forever,
}

impl RunFor {
    fn done(&self, cycles: u32, now: EngineTime, start: EngineTime) -> bool {
        match self {
            RunFor::Cycles(n) => cycles >= *n,
            RunFor::Duration(d) => now.saturating_sub(start) >= TimeDelta::from(*d),
            RunFor::Until(end) => now >= *end,
            RunFor::Forever => false,
        }
    }
}

/// Hook for embedding code to observe engine-level events without the
/// engine depending on a concrete logging/metrics sink (spec.md §6.2).
pub trait EngineObserver {
    #[allow(unused_variables)]
    fn on_tick(&mut self, now: EngineTime) {}
    #[allow(unused_variables)]
    fn on_node_error(&mut self, node: &str, err: &EngineError) {}
    #[allow(unused_variables)]
    fn on_stop(&mut self, now: EngineTime) {}
}

pub struct GraphConfiguration {
    pub run_mode: RunMode,
    pub run_for: RunFor,
    pub observers: Vec<Box<dyn EngineObserver>>,
}

impl Default for GraphConfiguration {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Simulation {
                start: EngineTime::MIN_ST,
            },
            run_for: RunFor::Forever,
            observers: Vec::new(),
        }
    }
}

pub struct Engine {
    plan: GraphPlan,
    scheduler: Rc<RefCell<SchedulerState>>,
    ready_tx: Sender<NodeId>,
    ready_rx: Receiver<NodeId>,
    dirty_by_rank: Vec<Vec<NodeId>>,
    node_dirty: Vec<bool>,
    config: GraphConfiguration,
    /// Set by [Self::resume]: tells [Self::run] the clock and pending
    /// queue were already restored from a snapshot, so the usual
    /// fresh-start clock initialization must not clobber them.
    resumed: bool,
}

impl Engine {
    pub fn new(plan: GraphPlan, config: GraphConfiguration) -> Self {
        let (ready_tx, ready_rx) = crossbeam::channel::unbounded();
        Self::with_ready_channel(plan, config, ready_tx, ready_rx)
    }

    /// Like [Self::new], but reuses an already-created ready channel. A
    /// push source's [crate::service::PushSender] must be wired to the
    /// exact sender the engine polls (§4.7), and that source's node has
    /// to exist — with its receiver already built — before the plan (and
    /// so the engine) does; creating the channel up front and threading
    /// it through both sides is what makes that ordering possible.
    pub fn with_ready_channel(
        plan: GraphPlan,
        config: GraphConfiguration,
        ready_tx: Sender<NodeId>,
        ready_rx: Receiver<NodeId>,
    ) -> Self {
        let max_rank = plan.iter().map(|n| n.rank).max().unwrap_or(0);
        let dirty_by_rank = vec![Vec::new(); max_rank as usize + 1];
        let node_dirty = vec![false; plan.len()];
        Self {
            plan,
            scheduler: Rc::new(RefCell::new(SchedulerState::default())),
            ready_tx,
            ready_rx,
            dirty_by_rank,
            node_dirty,
            config,
            resumed: false,
        }
    }

    /// Captures a resumable snapshot of the live engine (spec.md §6.4):
    /// the logical clock, every scheduled wake-up still pending, and
    /// every node's checkpointed private state, via
    /// [crate::persist::Checkpoint] for whichever nodes implement it.
    pub fn suspend(&self) -> EngineSnapshot {
        let (now, pending) = {
            let scheduler = self.scheduler.borrow();
            let pending = scheduler
                .pending
                .snapshot()
                .into_iter()
                .map(|((node, _tag), at)| PendingEntry { node, at })
                .collect();
            (scheduler.now, pending)
        };
        let node_states = self
            .plan
            .iter()
            .filter_map(|spec| spec.node.checkpoint_save().map(|state| (spec.id, state)))
            .collect();
        EngineSnapshot { now, pending, node_states }
    }

    /// Restores a snapshot captured by [Self::suspend]: resets the
    /// logical clock, re-enqueues every pending wake-up (tag identity
    /// isn't part of a checkpoint, so every restored entry dedups on
    /// `(node, None)`), and dispatches each captured node state to its
    /// node. Call before [Self::run]; the next `run()` continues from
    /// `snapshot.now` instead of initializing a fresh clock.
    pub fn resume(&mut self, snapshot: &EngineSnapshot) {
        {
            let mut scheduler = self.scheduler.borrow_mut();
            scheduler.now = snapshot.now;
            for entry in &snapshot.pending {
                let key = (entry.node, None);
                scheduler.tagged_at.insert(key, entry.at);
                scheduler.pending.push(key, entry.at);
            }
        }
        for (node, state) in &snapshot.node_states {
            self.plan.node(*node).node.checkpoint_restore(state.clone());
        }
        self.resumed = true;
    }

    /// A cloneable sender push sources (§4.7) use to wake the engine from
    /// a foreign thread: send a `NodeId` and the engine marks it dirty on
    /// its next poll.
    pub fn ready_sender(&self) -> Sender<NodeId> {
        self.ready_tx.clone()
    }

    pub fn scheduler_handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.scheduler.clone())
    }

    fn mark_dirty(&mut self, id: NodeId) {
        if !self.node_dirty[id.0 as usize] {
            self.node_dirty[id.0 as usize] = true;
            let rank = self.plan.node(id).rank as usize;
            self.dirty_by_rank[rank].push(id);
        }
    }

    fn now(&self) -> EngineTime {
        self.scheduler.borrow().now
    }

    fn stop_requested(&self) -> bool {
        self.scheduler.borrow().stop_requested
    }

    fn node_order_by_rank(&self, descending: bool) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.plan.iter().map(|n| n.id).collect();
        if descending {
            ids.sort_by_key(|id| std::cmp::Reverse(self.plan.node(*id).rank));
        } else {
            ids.sort_by_key(|id| self.plan.node(*id).rank);
        }
        ids
    }

    fn run_phase(
        &mut self,
        ids: &[NodeId],
        phase: impl Fn(&dyn crate::node::Node, &mut NodeContext<'_>) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let handle = self.scheduler_handle();
        for &id in ids {
            let rank = self.plan.node(id).rank;
            let node = self.plan.node(id).node.clone();
            let mut ctx = NodeContext {
                scheduler: &handle,
                rank,
                node_id: id,
            };
            if let Err(err) = phase(node.as_ref(), &mut ctx) {
                if node.recovers() {
                    log::error!("node `{}` recovered from error: {err}", node.type_name());
                    for observer in &mut self.config.observers {
                        observer.on_node_error(&node.type_name(), &err);
                    }
                } else {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Drains everything due at or before the current instant from the
    /// scheduled-callback queue and the real-time push channel, marking
    /// their owning nodes dirty. Returns false when nothing is pending
    /// and the run should terminate (spec.md §4.5 termination rule (c)).
    fn drain_ready_historical(&mut self) -> bool {
        let next = {
            let sched = self.scheduler.borrow();
            if sched.pending.is_empty() {
                None
            } else {
                Some(sched.pending.next_time())
            }
        };
        let Some(next_time) = next else {
            return false;
        };
        self.scheduler.borrow_mut().now = next_time;
        let due = self.scheduler.borrow_mut().pending.drain_ready(next_time);
        for (node_id, _tag) in due {
            self.mark_dirty(node_id);
        }
        true
    }

    fn drain_ready_realtime(&mut self, end_time: EngineTime) -> bool {
        let mut progressed = false;
        while let Ok(node_id) = self.ready_rx.try_recv() {
            self.mark_dirty(node_id);
            progressed = true;
        }
        let due_now = {
            let sched = self.scheduler.borrow();
            sched.pending.pending(EngineTime::now())
        };
        if due_now {
            let now = EngineTime::now();
            let due = self.scheduler.borrow_mut().pending.drain_ready(now);
            for (node_id, _tag) in due {
                self.mark_dirty(node_id);
            }
            progressed = true;
        }
        if !progressed {
            let wait_until = {
                let sched = self.scheduler.borrow();
                if sched.pending.is_empty() {
                    end_time
                } else {
                    sched.pending.next_time().min(end_time)
                }
            };
            let wall_now = EngineTime::now();
            let timeout = wait_until.saturating_sub(wall_now).into();
            if let Ok(node_id) = self.ready_rx.recv_timeout(timeout) {
                self.mark_dirty(node_id);
                progressed = true;
            }
        }
        self.scheduler.borrow_mut().now = EngineTime::now();
        progressed
    }

    fn cycle(&mut self) -> Result<(), EngineError> {
        let handle = self.scheduler_handle();
        let now = self.now();
        for rank in 0..self.dirty_by_rank.len() {
            let mut i = 0;
            while i < self.dirty_by_rank[rank].len() {
                let id = self.dirty_by_rank[rank][i];
                self.cycle_node(id, &handle, now)?;
                i += 1;
            }
        }
        for layer in self.dirty_by_rank.iter_mut() {
            layer.clear();
        }
        self.node_dirty.iter_mut().for_each(|d| *d = false);
        Ok(())
    }

    fn cycle_node(
        &mut self,
        id: NodeId,
        handle: &SchedulerHandle,
        now: EngineTime,
    ) -> Result<(), EngineError> {
        let rank = self.plan.node(id).rank;
        let node = self.plan.node(id).node.clone();
        let mut ctx = NodeContext { scheduler: handle, rank, node_id: id };
        match node.eval(&mut ctx) {
            Ok(()) => {
                for observer in &mut self.config.observers {
                    observer.on_tick(now);
                }
                let downstreams = self.plan.node(id).downstreams.clone();
                for edge in downstreams {
                    if edge.active.is_active() {
                        self.mark_dirty(edge.target);
                    }
                }
                Ok(())
            }
            Err(err) => {
                if node.recovers() {
                    log::error!("node `{}` recovered from error: {err}", node.type_name());
                    for observer in &mut self.config.observers {
                        observer.on_node_error(&node.type_name(), &err);
                    }
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn run(&mut self) -> Result<(), EngineError> {
        let ascending = self.node_order_by_rank(false);
        let descending = self.node_order_by_rank(true);

        if !self.resumed {
            self.scheduler.borrow_mut().now = match self.config.run_mode {
                RunMode::Simulation { start } => start,
                RunMode::RealTime => EngineTime::now(),
            };
        }

        self.run_phase(&ascending, |n, ctx| n.start(ctx))?;

        let start_time = self.now();
        let end_time = match self.config.run_for {
            RunFor::Until(end) => end,
            RunFor::Duration(d) => start_time + TimeDelta::from(d),
            _ => EngineTime::MAX_ET,
        };
        let mut cycles: u32 = 0;

        loop {
            if self.stop_requested() {
                break;
            }
            let progressed = match self.config.run_mode {
                RunMode::Simulation { .. } => self.drain_ready_historical(),
                RunMode::RealTime => self.drain_ready_realtime(end_time),
            };
            if !progressed {
                break;
            }
            self.cycle()?;
            cycles += 1;
            if self
                .config
                .run_for
                .done(cycles, self.now(), start_time)
            {
                break;
            }
        }

        self.run_phase(&descending, |n, ctx| n.stop(ctx))?;
        let now = self.now();
        for observer in &mut self.config.observers {
            observer.on_stop(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MutableNode, NodeContext};
    use crate::plan::PlanBuilder;
    use crate::scheduler::ScheduleAt;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct CountingSource {
        count: Rc<RefCell<u32>>,
        ticks_left: u32,
    }

    impl MutableNode for CountingSource {
        fn start(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
            ctx.scheduler.schedule(NodeId(0), ScheduleAt::After(TimeDelta::MIN_TD), None);
            Ok(())
        }
        fn eval(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
            *self.count.borrow_mut() += 1;
            self.ticks_left -= 1;
            if self.ticks_left > 0 {
                ctx.scheduler
                    .schedule(NodeId(0), ScheduleAt::After(TimeDelta::MIN_TD), None);
            }
            Ok(())
        }
    }

    #[test]
    fn simulation_run_drains_scheduled_callbacks_to_completion() {
        let count = Rc::new(RefCell::new(0));
        let mut builder = PlanBuilder::new();
        builder.add_node(
            Rc::new(RefCell::new(CountingSource {
                count: count.clone(),
                ticks_left: 3,
            })),
            0,
        );
        let plan = builder.build().unwrap();
        let config = GraphConfiguration {
            run_mode: RunMode::Simulation {
                start: EngineTime::MIN_ST,
            },
            run_for: RunFor::Forever,
            observers: Vec::new(),
        };
        let mut engine = Engine::new(plan, config);
        engine.run().unwrap();
        assert_eq!(*count.borrow(), 3);
    }

    #[derive(Debug)]
    struct CheckpointedCounter {
        total: u32,
        limit: u32,
    }

    impl crate::persist::Checkpoint for CheckpointedCounter {
        fn save(&self) -> serde_json::Value {
            serde_json::json!({ "total": self.total })
        }
        fn restore(&mut self, state: serde_json::Value) {
            self.total = state["total"].as_u64().unwrap() as u32;
        }
    }

    impl MutableNode for CheckpointedCounter {
        fn start(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
            ctx.scheduler.schedule(ctx.node_id, ScheduleAt::After(TimeDelta::MIN_TD), None);
            Ok(())
        }
        fn eval(&mut self, ctx: &mut NodeContext) -> anyhow::Result<()> {
            self.total += 1;
            if self.total < self.limit {
                ctx.scheduler.schedule(ctx.node_id, ScheduleAt::After(TimeDelta::MIN_TD), None);
            }
            Ok(())
        }
        fn checkpoint_save(&self) -> Option<serde_json::Value> {
            Some(crate::persist::Checkpoint::save(self))
        }
        fn checkpoint_restore(&mut self, state: serde_json::Value) {
            crate::persist::Checkpoint::restore(self, state)
        }
    }

    fn checkpointed_counter_plan(limit: u32) -> crate::plan::GraphPlan {
        let mut builder = PlanBuilder::new();
        builder.add_node(Rc::new(RefCell::new(CheckpointedCounter { total: 0, limit })), 0);
        builder.build().unwrap()
    }

    #[test]
    fn suspend_captures_clock_pending_and_node_state() {
        let plan = checkpointed_counter_plan(5);
        let config = GraphConfiguration {
            run_mode: RunMode::Simulation { start: EngineTime::MIN_ST },
            run_for: RunFor::Cycles(2),
            observers: Vec::new(),
        };
        let mut engine = Engine::new(plan, config);
        engine.run().unwrap();

        let snapshot = engine.suspend();
        assert_eq!(snapshot.node_states.len(), 1);
        assert_eq!(snapshot.node_states[0].0, NodeId(0));
        assert_eq!(snapshot.node_states[0].1["total"], 2);
        assert_eq!(snapshot.pending.len(), 1);
        assert_eq!(snapshot.pending[0].node, NodeId(0));
    }

    #[test]
    fn resume_continues_a_fresh_engine_from_a_suspended_snapshot() {
        let plan = checkpointed_counter_plan(5);
        let config = GraphConfiguration {
            run_mode: RunMode::Simulation { start: EngineTime::MIN_ST },
            run_for: RunFor::Cycles(2),
            observers: Vec::new(),
        };
        let mut engine = Engine::new(plan, config);
        engine.run().unwrap();
        let snapshot = engine.suspend();

        let resumed_plan = checkpointed_counter_plan(5);
        let resumed_config = GraphConfiguration {
            run_mode: RunMode::Simulation { start: EngineTime::MIN_ST },
            run_for: RunFor::Forever,
            observers: Vec::new(),
        };
        let mut resumed_engine = Engine::new(resumed_plan, resumed_config);
        resumed_engine.resume(&snapshot);
        resumed_engine.run().unwrap();

        let final_snapshot = resumed_engine.suspend();
        assert_eq!(final_snapshot.node_states[0].1["total"], 5);
    }
}
