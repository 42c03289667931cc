//! Services, adaptors and push sources (spec.md §4.7). Grounded on
//! wingfoil's `channel`/`ChannelSender` kanal-backed MPSC pattern
//! (`channel_pair`, a `ReadyNotifier` paired with the sender so the
//! receiving graph wakes itself), generalized from a single-value
//! channel to the spec's `(output, value, scheduled_time)` push record
//! and from wingfoil's per-channel `ReadyNotifier` to the engine-wide
//! `ready_sender` every [crate::graph::Engine] exposes.

use crate::error::{PlanError, PushError};
use crate::node::{Node, NodeId};
use crate::time::EngineTime;
use crate::ts::Element;
use crossbeam::channel::Sender as ReadySender;
use kanal::{Receiver, Sender};
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

/// A globally-registered named node implementation (spec.md §4.7). The
/// wiring layer instantiates the service's graph once per
/// `(path, resolved-types)` and multiplexes caller requests through it;
/// the engine core only needs the name → node lookup, built once at plan
/// time and immutable afterward.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Rc<dyn Node>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>, node: Rc<dyn Node>) -> Result<(), PlanError> {
        let path = path.into();
        if self.services.contains_key(&path) {
            return Err(PlanError::ServiceAlreadyRegistered(path));
        }
        self.services.insert(path, node);
        Ok(())
    }

    pub fn resolve(&self, path: &str) -> Result<Rc<dyn Node>, PlanError> {
        self.services
            .get(path)
            .cloned()
            .ok_or_else(|| PlanError::ServiceNotRegistered(path.to_string()))
    }
}

/// A record enqueued by [PushSender::send]: the value, and the instant
/// it should be applied at. The engine clamps `scheduled_time` to
/// `max(now, wall_clock_at_arrival)` when it drains the queue, since a
/// foreign thread can race ahead of the engine's own clock.
#[derive(Debug, Clone)]
pub struct PushRecord<T> {
    pub value: T,
    pub scheduled_time: EngineTime,
}

/// Handed to user code running on a foreign thread (spec.md §4.7). The
/// only legal cross-thread entry point into the engine (§5). `send`
/// never blocks and never propagates a [PushError] to the engine — it
/// reports failure (engine already stopped, node torn down) to the
/// caller via its return value, matching `ChannelSender::send_message`'s
/// `Result` return.
#[derive(Debug, Clone)]
pub struct PushSender<T: Element + Send> {
    node: NodeId,
    kanal_sender: Sender<PushRecord<T>>,
    ready_sender: ReadySender<NodeId>,
}

impl<T: Element + Send> PushSender<T> {
    pub(crate) fn new(
        node: NodeId,
        kanal_sender: Sender<PushRecord<T>>,
        ready_sender: ReadySender<NodeId>,
    ) -> Self {
        Self {
            node,
            kanal_sender,
            ready_sender,
        }
    }

    pub fn send(&self, value: T, scheduled_time: EngineTime) -> Result<(), PushError> {
        self.kanal_sender
            .send(PushRecord {
                value,
                scheduled_time,
            })
            .map_err(|_| PushError)?;
        self.ready_sender.send(self.node).map_err(|_| PushError)?;
        Ok(())
    }
}

/// The receiving half, owned by the push-source node itself and drained
/// during its own `eval` once the engine has woken it.
#[derive(Debug)]
pub struct PushReceiver<T: Element + Send> {
    kanal_receiver: Receiver<PushRecord<T>>,
}

impl<T: Element + Send> PushReceiver<T> {
    pub fn try_recv_all(&self) -> Vec<PushRecord<T>> {
        let mut records = Vec::new();
        while let Ok(Some(record)) = self.kanal_receiver.try_recv() {
            records.push(record);
        }
        records
    }
}

/// Builds a bound sender/receiver pair for a push source node, the way
/// `channel_pair` does in wingfoil.
pub fn push_channel<T: Element + Send>(
    node: NodeId,
    ready_sender: ReadySender<NodeId>,
) -> (PushSender<T>, PushReceiver<T>) {
    let (tx, rx) = kanal::unbounded();
    (
        PushSender::new(node, tx, ready_sender),
        PushReceiver {
            kanal_receiver: rx,
        },
    )
}

/// An adaptor pairs a push source and a sink under one path-keyed
/// identity, letting user code act as both producer and consumer of an
/// external stream (spec.md §4.7's "adaptor" idiom). The engine core
/// only needs the pairing, not any particular transport.
#[derive(Debug)]
pub struct Adaptor<IN: Element + Send, OUT: Clone + Debug> {
    pub inbound: PushReceiver<IN>,
    pub outbound: Sender<OUT>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_drain_preserves_order() {
        let (tx_ready, _rx_ready) = crossbeam::channel::unbounded();
        let (sender, receiver) = push_channel::<i64>(NodeId(0), tx_ready);
        sender.send(1, EngineTime::MIN_ST).unwrap();
        sender.send(2, EngineTime::MIN_ST.succ()).unwrap();
        let drained = receiver.try_recv_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].value, 1);
        assert_eq!(drained[1].value, 2);
    }

    #[test]
    fn send_wakes_the_engine() {
        let (tx_ready, rx_ready) = crossbeam::channel::unbounded();
        let (sender, _receiver) = push_channel::<i64>(NodeId(7), tx_ready);
        sender.send(42, EngineTime::MIN_ST).unwrap();
        assert_eq!(rx_ready.try_recv().unwrap(), NodeId(7));
    }
}
