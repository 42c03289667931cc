//! TSW\[T, SIZE, MIN_SIZE\] — a sliding window over the last `SIZE` pushed
//! values (spec.md §3.2). Unlike the other kinds, validity is not "has
//! this output ever been modified" but "has it accumulated at least
//! `MIN_SIZE` values" — a window with two of five required slots filled
//! is not yet valid even though it has been pushed to.

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::{AnyTsOutput, Element, TsChildOutput};
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug)]
pub struct TswOutput<T: Element, const SIZE: usize, const MIN_SIZE: usize> {
    buffer: RefCell<VecDeque<T>>,
    /// The element most recently pushed — `delta_value` reports this
    /// alone, not a full buffer snapshot (spec.md §3.3 Invariant 4: every
    /// new append produces exactly one delta and at most one eviction).
    last_pushed: RefCell<Option<T>>,
    /// The element evicted by the most recent push, if the window was
    /// already at `SIZE` when that push happened.
    removed_value: RefCell<Option<T>>,
    observer: Rc<ObserverNode>,
}

impl<T: Element, const SIZE: usize, const MIN_SIZE: usize> Default for TswOutput<T, SIZE, MIN_SIZE> {
    fn default() -> Self {
        assert!(MIN_SIZE <= SIZE, "TSW min_size must not exceed size");
        Self {
            buffer: RefCell::new(VecDeque::with_capacity(SIZE)),
            last_pushed: RefCell::new(None),
            removed_value: RefCell::new(None),
            observer: ObserverNode::new(),
        }
    }
}

impl<T: Element, const SIZE: usize, const MIN_SIZE: usize> TswOutput<T, SIZE, MIN_SIZE> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn push(&self, value: T, time: EngineTime) {
        debug_assert!(time.is_valid_modification_time());
        let mut buffer = self.buffer.borrow_mut();
        buffer.push_back(value.clone());
        let evicted = if buffer.len() > SIZE { buffer.pop_front() } else { None };
        drop(buffer);
        *self.last_pushed.borrow_mut() = Some(value);
        *self.removed_value.borrow_mut() = evicted;
        self.observer.mark_modified(time);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.buffer.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.borrow().len()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.borrow().len() == SIZE
    }

    /// The single element appended this instant, or `None` if nothing
    /// was pushed at `now`.
    pub fn delta_value(&self, now: EngineTime) -> Option<T> {
        if self.observer.modified(now) {
            self.last_pushed.borrow().clone()
        } else {
            None
        }
    }

    /// Whether the most recent push evicted an element.
    pub fn has_removed_value(&self) -> bool {
        self.removed_value.borrow().is_some()
    }

    /// The element evicted by the most recent push, if any.
    pub fn removed_value(&self) -> Option<T> {
        self.removed_value.borrow().clone()
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
}

impl<T: Element, const SIZE: usize, const MIN_SIZE: usize> AnyTsOutput
    for TswOutput<T, SIZE, MIN_SIZE>
{
    fn valid(&self) -> bool {
        self.buffer.borrow().len() >= MIN_SIZE
    }
    fn modified(&self, now: EngineTime) -> bool {
        self.observer.modified(now)
    }
    fn last_modified_time(&self) -> Option<EngineTime> {
        self.observer.last_modified_time()
    }
    fn invalidate(&self) {
        self.observer.invalidate();
        self.buffer.borrow_mut().clear();
        *self.last_pushed.borrow_mut() = None;
        *self.removed_value.borrow_mut() = None;
    }
    fn kind_name(&self) -> &'static str {
        "TSW"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Element, const SIZE: usize, const MIN_SIZE: usize> TsChildOutput
    for TswOutput<T, SIZE, MIN_SIZE>
{
    type Delta = T;

    fn new_default() -> Self {
        Self::default()
    }
    fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
    fn delta_snapshot(&self, now: EngineTime) -> Option<T> {
        self.delta_value(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_valid_until_min_size_reached() {
        let win = TswOutput::<i64, 3, 2>::new();
        let t0 = EngineTime::MIN_ST;
        win.push(1, t0);
        assert!(!win.valid());
        win.push(2, t0.succ());
        assert!(win.valid());
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let win = TswOutput::<i64, 2, 1>::new();
        let mut t = EngineTime::MIN_ST;
        win.push(1, t);
        assert!(!win.has_removed_value());
        t = t.succ();
        win.push(2, t);
        assert!(!win.has_removed_value());
        t = t.succ();
        win.push(3, t);
        assert_eq!(win.snapshot(), vec![2, 3]);
        assert!(win.has_removed_value());
        assert_eq!(win.removed_value(), Some(1));
    }

    #[test]
    fn delta_is_the_single_pushed_element_not_a_snapshot() {
        let win = TswOutput::<i64, 3, 1>::new();
        let t = EngineTime::MIN_ST;
        win.push(10, t);
        assert_eq!(win.delta_value(t), Some(10));
        assert_eq!(win.delta_value(t.succ()), None);
        win.push(20, t.succ());
        assert_eq!(win.delta_value(t.succ()), Some(20));
        assert_eq!(win.snapshot(), vec![10, 20]);
    }

    #[test]
    fn every_eviction_reports_exactly_one_removed_value() {
        let win = TswOutput::<i64, 2, 1>::new();
        let mut t = EngineTime::MIN_ST;
        for v in 1..=4 {
            win.push(v, t);
            t = t.succ();
        }
        assert!(win.has_removed_value());
        assert_eq!(win.removed_value(), Some(2));
        assert_eq!(win.snapshot(), vec![3, 4]);
    }
}
