//! TSL\[T, N\] — a fixed-size list of `N` time-series children (spec.md
//! §3.2), all of the same kind. Unlike TSD, the slot count is fixed at
//! construction; there is no add/remove, only per-index modification.

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::{AnyTsOutput, TsChildOutput};
use std::any::Any;
use std::rc::Rc;

#[derive(Debug)]
pub struct TslOutput<CHILD: TsChildOutput, const N: usize> {
    children: [Rc<CHILD>; N],
    observer: Rc<ObserverNode>,
}

impl<CHILD: TsChildOutput, const N: usize> Default for TslOutput<CHILD, N> {
    fn default() -> Self {
        let observer = ObserverNode::new();
        let children = std::array::from_fn(|_| {
            let child = Rc::new(CHILD::new_default());
            child.observer().set_parent(&observer);
            child
        });
        Self { children, observer }
    }
}

impl<CHILD: TsChildOutput, const N: usize> TslOutput<CHILD, N> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn get(&self, index: usize) -> &Rc<CHILD> {
        &self.children[index]
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<CHILD>> {
        self.children.iter()
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }

    pub fn delta_value(&self, now: EngineTime) -> Option<Vec<(usize, CHILD::Delta)>> {
        if !self.observer.modified(now) {
            return None;
        }
        let entries: Vec<_> = self
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| child.delta_snapshot(now).map(|d| (i, d)))
            .collect();
        Some(entries)
    }
}

impl<CHILD: TsChildOutput, const N: usize> AnyTsOutput for TslOutput<CHILD, N> {
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
        for child in self.children.iter() {
            child.invalidate();
        }
    }
    fn kind_name(&self) -> &'static str {
        "TSL"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<CHILD: TsChildOutput, const N: usize> TsChildOutput for TslOutput<CHILD, N> {
    type Delta = Vec<(usize, CHILD::Delta)>;

    fn new_default() -> Self {
        Self::default()
    }
    fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
    fn delta_snapshot(&self, now: EngineTime) -> Option<Self::Delta> {
        self.delta_value(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::scalar::TsOutput;

    #[test]
    fn fixed_slots_bubble_and_report_index() {
        let list = TslOutput::<TsOutput<i64>, 3>::new();
        let t = EngineTime::MIN_ST;
        list.get(1).set(7, t);
        assert!(list.observer.modified(t));
        let delta = list.delta_value(t).unwrap();
        assert_eq!(delta, vec![(1, 7)]);
    }

    #[test]
    fn len_matches_const_n() {
        let list = TslOutput::<TsOutput<i64>, 4>::new();
        assert_eq!(list.len(), 4);
    }
}
