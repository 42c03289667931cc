//! REF\[X\] — a rebindable reference to an output of kind `X` (spec.md
//! §3.2, §7 `TypeMismatch`). Rebinding swaps which concrete output this
//! reference points at; consumers only see a REF tick when the *binding
//! itself* changes identity, never when the referenced output ticks — so
//! `Delta` carries no payload, just the fact a rebind happened.

use crate::error::EngineError;
use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::{AnyTsOutput, DynTsHandle, TsChildOutput};
use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

#[derive(Debug)]
pub struct RefOutput<X: AnyTsOutput> {
    target: RefCell<Option<DynTsHandle>>,
    observer: Rc<ObserverNode>,
    _marker: PhantomData<fn() -> X>,
}

impl<X: AnyTsOutput> Default for RefOutput<X> {
    fn default() -> Self {
        Self {
            target: RefCell::new(None),
            observer: ObserverNode::new(),
            _marker: PhantomData,
        }
    }
}

impl<X: AnyTsOutput> RefOutput<X> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Rebinds this reference to `handle`, checking that it really is a
    /// `X` first. `label` identifies this REF in the error path only.
    pub fn rebind(
        &self,
        label: &str,
        handle: DynTsHandle,
        time: EngineTime,
    ) -> Result<(), EngineError> {
        if handle.as_any().downcast_ref::<X>().is_none() {
            return Err(EngineError::TypeMismatch {
                reference: label.to_string(),
                expected: tynm::type_name::<X>().leak(),
                found: handle.kind_name(),
            });
        }
        *self.target.borrow_mut() = Some(handle);
        self.observer.mark_modified(time);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.target.borrow().is_some()
    }

    pub fn unbind(&self) {
        *self.target.borrow_mut() = None;
    }

    /// Runs `f` against the referenced output if bound, downcast to `X`.
    pub fn with_target<R>(&self, f: impl FnOnce(&X) -> R) -> Option<R> {
        let guard = self.target.borrow();
        guard
            .as_ref()
            .and_then(|h| h.as_any().downcast_ref::<X>())
            .map(f)
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }
}

impl<X: AnyTsOutput> AnyTsOutput for RefOutput<X> {
    fn valid(&self) -> bool {
        self.with_target(|x| x.valid()).unwrap_or(false)
    }
    fn modified(&self, now: EngineTime) -> bool {
        self.observer.modified(now)
    }
    fn last_modified_time(&self) -> Option<EngineTime> {
        self.observer.last_modified_time()
    }
    fn invalidate(&self) {
        self.observer.invalidate();
        self.unbind();
    }
    fn kind_name(&self) -> &'static str {
        "REF"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<X: AnyTsOutput> TsChildOutput for RefOutput<X> {
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
    use crate::ts::scalar::TsOutput;
    use crate::ts::signal::SignalOutput;

    #[test]
    fn rebind_to_matching_kind_succeeds() {
        let reference = RefOutput::<TsOutput<i64>>::new();
        let target: Rc<TsOutput<i64>> = TsOutput::new();
        target.set(5, EngineTime::MIN_ST);
        let handle: DynTsHandle = target.clone();
        reference.rebind("r", handle, EngineTime::MIN_ST).unwrap();
        assert!(reference.with_target(|t| t.value()) == Some(Some(5)));
        assert!(reference.valid());
    }

    #[test]
    fn rebind_to_mismatched_kind_errors() {
        let reference = RefOutput::<TsOutput<i64>>::new();
        let wrong: Rc<SignalOutput> = SignalOutput::new();
        let handle: DynTsHandle = wrong;
        let err = reference.rebind("r", handle, EngineTime::MIN_ST).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn modified_reflects_rebind_not_target_ticks() {
        let reference = RefOutput::<TsOutput<i64>>::new();
        let target: Rc<TsOutput<i64>> = TsOutput::new();
        let t0 = EngineTime::MIN_ST;
        let t1 = t0.succ();
        reference.rebind("r", target.clone(), t0).unwrap();
        target.set(1, t1);
        assert!(!reference.modified(t1));
        assert!(reference.modified(t0));
    }
}
