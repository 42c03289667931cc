//! TSB — a bundle of named fields, each a time-series of the same child
//! kind (spec.md §3.2). Field names are fixed at construction, like TSL's
//! index slots, but addressed by name rather than position — the natural
//! shape for a struct-like group of signals (e.g. bid/ask/last) that are
//! all the same underlying kind.

use crate::observer::ObserverNode;
use crate::time::EngineTime;
use crate::ts::{AnyTsOutput, TsChildOutput};
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug)]
pub struct TsbOutput<CHILD: TsChildOutput> {
    fields: HashMap<&'static str, Rc<CHILD>>,
    order: Vec<&'static str>,
    observer: Rc<ObserverNode>,
}

impl<CHILD: TsChildOutput> TsbOutput<CHILD> {
    /// Builds a bundle with one child per name in `field_names`, in the
    /// given order. Panics on duplicate names, a plan-time-only mistake.
    pub fn new(field_names: &[&'static str]) -> Rc<Self> {
        let observer = ObserverNode::new();
        let mut fields = HashMap::with_capacity(field_names.len());
        for &name in field_names {
            let child = Rc::new(CHILD::new_default());
            child.observer().set_parent(&observer);
            if fields.insert(name, child).is_some() {
                panic!("duplicate TSB field name `{name}`");
            }
        }
        Rc::new(Self {
            fields,
            order: field_names.to_vec(),
            observer,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Rc<CHILD>> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> &[&'static str] {
        &self.order
    }

    pub fn observer(&self) -> &Rc<ObserverNode> {
        &self.observer
    }

    pub fn delta_value(&self, now: EngineTime) -> Option<Vec<(&'static str, CHILD::Delta)>> {
        if !self.observer.modified(now) {
            return None;
        }
        let entries = self
            .order
            .iter()
            .filter_map(|&name| {
                self.fields[name]
                    .delta_snapshot(now)
                    .map(|d| (name, d))
            })
            .collect();
        Some(entries)
    }
}

impl<CHILD: TsChildOutput> AnyTsOutput for TsbOutput<CHILD> {
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
        for child in self.fields.values() {
            child.invalidate();
        }
    }
    fn kind_name(&self) -> &'static str {
        "TSB"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<CHILD: TsChildOutput> TsChildOutput for TsbOutput<CHILD> {
    type Delta = Vec<(&'static str, CHILD::Delta)>;

    fn new_default() -> Self {
        panic!("TSB bundles must be constructed with TsbOutput::new(field_names), not a default")
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
    fn named_fields_bubble_independently() {
        let bundle = TsbOutput::<TsOutput<f64>>::new(&["bid", "ask"]);
        let t = EngineTime::MIN_ST;
        bundle.field("bid").unwrap().set(100.0, t);
        assert!(bundle.observer.modified(t));
        let delta = bundle.delta_value(t).unwrap();
        assert_eq!(delta, vec![("bid", 100.0)]);
        assert!(bundle.field("ask").unwrap().value().is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate TSB field name")]
    fn duplicate_field_names_panic() {
        TsbOutput::<TsOutput<i64>>::new(&["a", "a"]);
    }
}
