//! TSS\[T\] — an unordered set of distinct values (spec.md §3.2). Each tick
//! carries a [SetDelta] of the elements added and removed that instant;
//! the full membership persists across ticks the way TS's `value` does.

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::{AnyTsOutput, Element, TsChildOutput};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

/// The elements added and removed in a single instant. TSD's `key_set`
/// reuses this shape for its key membership deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDelta<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> SetDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug)]
pub struct TssOutput<T: Element + Eq + Hash> {
    items: RefCell<HashSet<T>>,
    /// Snapshot of `items` as of the start of the current instant, so
    /// `delta_value` can diff full before/after membership rather than
    /// accumulate per-call — an add and a remove of the same value within
    /// one instant must net to no delta for that value, not a spurious
    /// added-and-removed pair.
    tick_start: RefCell<HashSet<T>>,
    observer: Rc<ObserverNode>,
}

impl<T: Element + Eq + Hash> Default for TssOutput<T> {
    fn default() -> Self {
        Self {
            items: RefCell::new(HashSet::new()),
            tick_start: RefCell::new(HashSet::new()),
            observer: ObserverNode::new(),
        }
    }
}

impl<T: Element + Eq + Hash> TssOutput<T> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn begin_tick(&self, time: EngineTime) {
        if self.observer.last_modified_time() != Some(time) {
            *self.tick_start.borrow_mut() = self.items.borrow().clone();
        }
    }

    pub fn insert(&self, value: T, time: EngineTime) -> bool {
        self.begin_tick(time);
        let added = self.items.borrow_mut().insert(value);
        self.observer.mark_modified(time);
        added
    }

    pub fn remove(&self, value: &T, time: EngineTime) -> bool {
        self.begin_tick(time);
        let removed = self.items.borrow_mut().remove(value);
        self.observer.mark_modified(time);
        removed
    }

    pub fn contains(&self, value: &T) -> bool {
        self.items.borrow().contains(value)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.borrow().iter().cloned().collect()
    }

    pub fn delta_value(&self, now: EngineTime) -> Option<SetDelta<T>> {
        if !self.observer.modified(now) {
            return None;
        }
        let items = self.items.borrow();
        let start = self.tick_start.borrow();
        let added = items.difference(&start).cloned().collect();
        let removed = start.difference(&items).cloned().collect();
        Some(SetDelta { added, removed })
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
}

impl<T: Element + Eq + Hash> AnyTsOutput for TssOutput<T> {
    fn valid(&self) -> bool {
        self.observer.valid()
    }
    fn modified(&self, now: EngineTime) -> bool {
        self.observer.modified(now)
    }
    fn last_modified_time(&self) -> Option<EngineTime> {
        self.observer.last_modified_time()
    }
    fn invalidate(&self) {
        self.observer.invalidate();
        self.items.borrow_mut().clear();
        self.tick_start.borrow_mut().clear();
    }
    fn kind_name(&self) -> &'static str {
        "TSS"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Element + Eq + Hash> TsChildOutput for TssOutput<T> {
    type Delta = SetDelta<T>;

    fn new_default() -> Self {
        Self::default()
    }
    fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
    fn delta_snapshot(&self, now: EngineTime) -> Option<SetDelta<T>> {
        self.delta_value(now)
    }
}
