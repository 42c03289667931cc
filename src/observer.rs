//! The observer graph (spec.md §4.2): a parent-link tree rooted at each
//! top-level time-series output. Every concrete output (scalar, bundle,
//! list, set, dict, window) embeds an [ObserverNode]; container children
//! point their `ObserverNode` at their owner's, so a modification to a
//! deeply-nested leaf bubbles `valid`/`modified` up to the root without
//! the root walking back down to find out what changed.
//!
//! Node wake-up is a side effect of evaluation, not of this tree: the
//! engine (src/graph) wakes downstream *nodes* from a flat, rank-ordered
//! edge table built at plan time (spec.md §4.3), coalescing repeated
//! wake-ups of the same node within an instant there. This module only
//! answers "is this output valid/modified at time t", walked upward.

use crate::time::EngineTime;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Embedded in every TS output. Tracks validity and the last instant at
/// which this output (or a descendant, for containers) was modified.
#[derive(Debug, Default)]
pub(crate) struct ObserverNode {
    valid: Cell<bool>,
    modified_at: Cell<Option<EngineTime>>,
    parent: RefCell<Option<Weak<ObserverNode>>>,
}

impl ObserverNode {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registers `self` as a child of `parent`: subsequent
    /// `mark_modified` calls bubble up to `parent` (and beyond).
    pub fn set_parent(self: &Rc<Self>, parent: &Rc<ObserverNode>) {
        *self.parent.borrow_mut() = Some(Rc::downgrade(parent));
    }

    pub fn clear_parent(&self) {
        *self.parent.borrow_mut() = None;
    }

    /// Stamps this output valid and modified at `time`, bubbling the same
    /// stamp up through every ancestor. Idempotent: bubbling the same
    /// `time` twice (e.g. two children of the same container ticking in
    /// the same instant) leaves the ancestor chain in the same state.
    pub fn mark_modified(&self, time: EngineTime) {
        self.valid.set(true);
        self.modified_at.set(Some(time));
        if let Some(parent) = self.parent.borrow().as_ref().and_then(Weak::upgrade) {
            parent.mark_modified(time);
        }
    }

    /// Clears validity without touching the modification stamp. Does not
    /// propagate to parents: invalidating one field of a bundle does not
    /// invalidate its siblings or the bundle as a whole.
    pub fn invalidate(&self) {
        self.valid.set(false);
    }

    pub fn valid(&self) -> bool {
        self.valid.get()
    }

    pub fn modified(&self, now: EngineTime) -> bool {
        self.modified_at.get() == Some(now)
    }

    pub fn last_modified_time(&self) -> Option<EngineTime> {
        self.modified_at.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bubbles_to_root() {
        let root = ObserverNode::new();
        let child = ObserverNode::new();
        child.set_parent(&root);

        let t = EngineTime::MIN_ST;
        assert!(!root.modified(t));
        child.mark_modified(t);
        assert!(child.modified(t));
        assert!(root.modified(t));
        assert!(root.valid());
    }

    #[test]
    fn grandchild_bubbles_through_two_levels() {
        let root = ObserverNode::new();
        let mid = ObserverNode::new();
        let leaf = ObserverNode::new();
        mid.set_parent(&root);
        leaf.set_parent(&mid);

        let t = EngineTime::MIN_ST.succ();
        leaf.mark_modified(t);
        assert!(mid.modified(t));
        assert!(root.modified(t));
    }

    #[test]
    fn stale_time_is_not_modified() {
        let node = ObserverNode::new();
        let t0 = EngineTime::MIN_ST;
        let t1 = t0.succ();
        node.mark_modified(t0);
        assert!(node.modified(t0));
        assert!(!node.modified(t1));
        assert!(node.valid());
    }

    #[test]
    fn dropped_parent_does_not_panic() {
        let child = ObserverNode::new();
        {
            let parent = ObserverNode::new();
            child.set_parent(&parent);
        }
        child.mark_modified(EngineTime::MIN_ST);
        assert!(child.valid());
    }
}
