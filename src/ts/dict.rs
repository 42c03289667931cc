//! TSD\[K, V\] — a dictionary of time-series children keyed by `K` (spec.md
//! §3.2). Exposes its own `key_set: TSS[K]` child output tracking key
//! membership, alongside the per-key `V` children. `CHILD` is generic over
//! any [TsChildOutput] so the same type serves TSD[K, TS[V]], TSD[K,
//! TSL[V]], TSD[K, TSD[K2, V]], etc.

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::set::TssOutput;
use crate::ts::{AnyTsOutput, Element, TsChildOutput};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictDelta<K, D> {
    pub updated: Vec<(K, D)>,
    pub removed: Vec<K>,
}

#[derive(Debug)]
pub struct TsdOutput<K: Element + Eq + Hash, CHILD: TsChildOutput> {
    children: RefCell<HashMap<K, Rc<CHILD>>>,
    key_set: Rc<TssOutput<K>>,
    removed_this_tick: RefCell<Vec<K>>,
    removed_tick: RefCell<Option<EngineTime>>,
    observer: Rc<ObserverNode>,
}

impl<K: Element + Eq + Hash, CHILD: TsChildOutput> Default for TsdOutput<K, CHILD> {
    fn default() -> Self {
        let observer = ObserverNode::new();
        let key_set = TssOutput::new();
        key_set.observer().set_parent(&observer);
        Self {
            children: RefCell::new(HashMap::new()),
            key_set,
            removed_this_tick: RefCell::new(Vec::new()),
            removed_tick: RefCell::new(None),
            observer,
        }
    }
}

impl<K: Element + Eq + Hash, CHILD: TsChildOutput> TsdOutput<K, CHILD> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Returns the child for `key`, creating it (and recording the key in
    /// `key_set`) if this is the first reference to it.
    pub fn get_or_create(&self, key: K, time: EngineTime) -> Rc<CHILD> {
        if let Some(child) = self.children.borrow().get(&key) {
            return child.clone();
        }
        let child = Rc::new(CHILD::new_default());
        self.adopt(key, child.clone(), time);
        child
    }

    /// Inserts a pre-built child (e.g. a `map_` child graph's own
    /// output) under `key`, bubbling its modifications into this dict
    /// and recording the key in `key_set`. Used where the child's
    /// storage is built elsewhere and handed in, rather than defaulted.
    pub fn adopt(&self, key: K, child: Rc<CHILD>, time: EngineTime) {
        child.observer().set_parent(&self.observer);
        self.key_set.insert(key.clone(), time);
        self.children.borrow_mut().insert(key, child);
    }

    pub fn get(&self, key: &K) -> Option<Rc<CHILD>> {
        self.children.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.children.borrow().contains_key(key)
    }

    pub fn remove_key(&self, key: &K, time: EngineTime) -> bool {
        let Some(child) = self.children.borrow_mut().remove(key) else {
            return false;
        };
        child.observer().clear_parent();
        self.key_set.remove(key, time);
        if *self.removed_tick.borrow() != Some(time) {
            self.removed_this_tick.borrow_mut().clear();
            *self.removed_tick.borrow_mut() = Some(time);
        }
        self.removed_this_tick.borrow_mut().push(key.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.children.borrow().keys().cloned().collect()
    }

    pub fn key_set(&self) -> &Rc<TssOutput<K>> {
        &self.key_set
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }

    pub fn delta_value(&self, now: EngineTime) -> Option<DictDelta<K, CHILD::Delta>> {
        if !self.observer.modified(now) {
            return None;
        }
        let updated = self
            .children
            .borrow()
            .iter()
            .filter_map(|(k, child)| child.delta_snapshot(now).map(|d| (k.clone(), d)))
            .collect();
        let removed = if *self.removed_tick.borrow() == Some(now) {
            self.removed_this_tick.borrow().clone()
        } else {
            Vec::new()
        };
        Some(DictDelta { updated, removed })
    }
}

impl<K: Element + Eq + Hash, CHILD: TsChildOutput> AnyTsOutput for TsdOutput<K, CHILD> {
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
        self.children.borrow_mut().clear();
        self.removed_this_tick.borrow_mut().clear();
        self.key_set.invalidate();
    }
    fn kind_name(&self) -> &'static str {
        "TSD"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K: Element + Eq + Hash, CHILD: TsChildOutput> TsChildOutput for TsdOutput<K, CHILD> {
    type Delta = DictDelta<K, CHILD::Delta>;

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
    fn get_or_create_registers_key_and_bubbles() {
        let dict = TsdOutput::<String, TsOutput<i64>>::new();
        let t = EngineTime::MIN_ST;
        let child = dict.get_or_create("a".to_string(), t);
        child.set(1, t);
        assert!(dict.observer.modified(t));
        assert!(dict.key_set.contains(&"a".to_string()));
        let delta = dict.delta_value(t).unwrap();
        assert_eq!(delta.updated, vec![("a".to_string(), 1)]);
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn invalidate_clears_key_set_along_with_children() {
        let dict = TsdOutput::<String, TsOutput<i64>>::new();
        let t = EngineTime::MIN_ST;
        dict.get_or_create("a".to_string(), t);
        assert!(dict.key_set().contains(&"a".to_string()));
        dict.invalidate();
        assert!(!dict.contains_key(&"a".to_string()));
        assert!(!dict.key_set().contains(&"a".to_string()));
        assert!(dict.key_set().is_empty());
    }

    #[test]
    fn remove_key_drops_child_and_records_removal() {
        let dict = TsdOutput::<String, TsOutput<i64>>::new();
        let t0 = EngineTime::MIN_ST;
        let t1 = t0.succ();
        dict.get_or_create("a".to_string(), t0);
        dict.remove_key(&"a".to_string(), t1);
        assert!(!dict.contains_key(&"a".to_string()));
        let delta = dict.delta_value(t1).unwrap();
        assert_eq!(delta.removed, vec!["a".to_string()]);
    }
}
