//! SIGNAL — a tick with no payload (spec.md §3.2). Carries only the
//! modified/valid timestamp from [ObserverNode]; `delta_snapshot` yields
//! `()` so containers of SIGNAL children still fit the [TsChildOutput]
//! shape uniformly.

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::{AnyTsOutput, TsChildOutput};
use std::any::Any;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct SignalOutput {
    observer: Rc<ObserverNode>,
}

impl SignalOutput {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn tick(&self, time: EngineTime) {
        debug_assert!(time.is_valid_modification_time());
        self.observer.mark_modified(time);
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
}

impl AnyTsOutput for SignalOutput {
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
    }
    fn kind_name(&self) -> &'static str {
        "SIGNAL"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TsChildOutput for SignalOutput {
    type Delta = ();

    fn new_default() -> Self {
        Self::default()
    }
    fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
    fn delta_snapshot(&self, now: EngineTime) -> Option<()> {
        self.observer.modified(now).then_some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_marks_modified_only_at_its_instant() {
        let sig = SignalOutput::new();
        let t0 = EngineTime::MIN_ST;
        let t1 = t0.succ();
        sig.tick(t0);
        assert!(sig.modified(t0));
        assert!(!sig.modified(t1));
        assert!(sig.valid());
    }
}
