//! TS\[T\] — a scalar time-series (spec.md §3.2). `delta_value == value`:
//! each tick fully replaces the stored value.

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::{AnyTsOutput, Element, TsChildOutput};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub struct TsOutput<T: Element> {
    value: RefCell<Option<T>>,
    observer: Rc<ObserverNode>,
}

impl<T: Element> Default for TsOutput<T> {
    fn default() -> Self {
        Self {
            value: RefCell::new(None),
            observer: ObserverNode::new(),
        }
    }
}

impl<T: Element> TsOutput<T> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Stamps `value` at `time`. A second call within the same instant
    /// replaces the value but `modified` stays true for `time` either way
    /// (spec.md §4.1 "a second set in the same tick replaces the value
    /// but keeps modified=true").
    pub fn set(&self, value: T, time: EngineTime) {
        debug_assert!(time.is_valid_modification_time());
        *self.value.borrow_mut() = Some(value);
        self.observer.mark_modified(time);
    }

    pub fn value(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    pub fn delta_value(&self, now: EngineTime) -> Option<T> {
        if self.observer.modified(now) {
            self.value.borrow().clone()
        } else {
            None
        }
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
}

impl<T: Element> AnyTsOutput for TsOutput<T> {
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
        *self.value.borrow_mut() = None;
    }
    fn kind_name(&self) -> &'static str {
        "TS"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Element> TsChildOutput for TsOutput<T> {
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
