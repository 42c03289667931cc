//! The scheduler surface nodes see during `start`/`eval`/`stop` (spec.md
//! §4.5): requesting a future wake-up, or asking the engine to stop.
//! [SchedulerHandle] is a thin, cloneable view over the engine's shared
//! pending queue and stop flag — the node-facing half of what
//! `src/graph.rs`'s main loop owns outright.

use crate::node::NodeId;
use crate::queue::TimeQueue;
use crate::time::{EngineTime, TimeDelta};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Either a relative delay from "now" or an absolute instant.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleAt {
    After(TimeDelta),
    At(EngineTime),
}

/// A scheduled wake-up's dedup key: a `(node, tag)` pair. Scheduling the
/// same pair again replaces the previous entry (spec.md §4.5) rather
/// than enqueueing a second one.
type ScheduleKey = (NodeId, Option<&'static str>);

#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    pub(crate) pending: TimeQueue<ScheduleKey>,
    pub(crate) tagged_at: HashMap<ScheduleKey, EngineTime>,
    pub(crate) now: EngineTime,
    pub(crate) stop_requested: bool,
}

/// Cloneable handle nodes hold in their [crate::node::NodeContext]. Never
/// sent across threads: the engine and all node code run on one thread
/// (spec.md §5); cross-thread entry is only via push queues.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    state: Rc<RefCell<SchedulerState>>,
}

impl SchedulerHandle {
    pub(crate) fn new(state: Rc<RefCell<SchedulerState>>) -> Self {
        Self { state }
    }

    /// A handle not wired to a running engine. Useful for unit-testing a
    /// node in isolation; `schedule`/`request_stop` calls are recorded
    /// but never drained by anything.
    pub fn detached() -> Self {
        Self::new(Rc::new(RefCell::new(SchedulerState::default())))
    }

    pub fn now(&self) -> EngineTime {
        self.state.borrow().now
    }

    /// Requests a future wake-up for `node` at `when`, tagged with
    /// `tag`. A later call with the same `(node, tag)` replaces this one.
    pub fn schedule(&self, node: NodeId, when: ScheduleAt, tag: Option<&'static str>) {
        let mut state = self.state.borrow_mut();
        let at = match when {
            ScheduleAt::After(delta) => state.now + delta,
            ScheduleAt::At(time) => time,
        };
        let key = (node, tag);
        state.tagged_at.insert(key, at);
        state.pending.push(key, at);
    }

    pub fn request_stop(&self) {
        self.state.borrow_mut().stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.state.borrow().stop_requested
    }
}
