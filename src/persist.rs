//! Optional suspend/resume checkpointing (spec.md §6.4). A checkpoint is
//! an append-only stream of JSON records: one per node whose private
//! state implements [Checkpoint], plus a header record carrying `now`
//! and the scheduler's still-pending wake-ups. [crate::graph::Engine::suspend]
//! builds an [EngineSnapshot] from the live plan and scheduler;
//! [crate::graph::Engine::resume] dispatches it back in before the next
//! `run()`, which then continues from `now` instead of reinitializing
//! the clock.
//!
//! Grounded on the engine's existing `serde`/`serde_json` dependency
//! (already pulled in for [crate::graph::GraphConfiguration] — spec.md
//! §6.2) rather than a binary format: this is an optional, infrequently
//! used facility, not a hot path, so JSON's simplicity wins over a
//! binary codec's throughput.

use crate::node::NodeId;
use crate::time::EngineTime;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};

/// Implemented by node authors whose private state should survive a
/// suspend/resume cycle. Nodes that don't implement it are simply not
/// restored — their `start()` reinitializes them from scratch, which is
/// the correct behavior for stateless nodes (spec.md §6.4 only promises
/// a checkpoint of state that was deliberately captured).
pub trait Checkpoint {
    fn save(&self) -> serde_json::Value;
    fn restore(&mut self, state: serde_json::Value);
}

/// One pending scheduler entry, as captured at suspend time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub node: NodeId,
    pub at: EngineTime,
}

/// One line of the checkpoint stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckpointRecord {
    /// Written once, first: the instant the checkpoint was taken and
    /// every wake-up still pending at that instant.
    Header {
        now: EngineTime,
        pending: Vec<PendingEntry>,
    },
    /// One per node whose private state was captured via [Checkpoint].
    NodeState { node: NodeId, state: serde_json::Value },
}

/// Everything needed to resume a run: `now`, the still-pending
/// wake-ups, and the captured per-node states, in write order.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub now: EngineTime,
    pub pending: Vec<PendingEntry>,
    pub node_states: Vec<(NodeId, serde_json::Value)>,
}

/// Writes `snapshot` as an append-only sequence of newline-delimited
/// JSON records: a header, then one `NodeState` record per captured
/// node, in the order given.
pub fn write_snapshot(mut writer: impl Write, snapshot: &EngineSnapshot) -> io::Result<()> {
    let header = CheckpointRecord::Header {
        now: snapshot.now,
        pending: snapshot.pending.clone(),
    };
    writeln!(writer, "{}", serde_json::to_string(&header)?)?;
    for (node, state) in &snapshot.node_states {
        let record = CheckpointRecord::NodeState {
            node: *node,
            state: state.clone(),
        };
        writeln!(writer, "{}", serde_json::to_string(&record)?)?;
    }
    Ok(())
}

/// Reads back a snapshot written by [write_snapshot]. The first record
/// must be a `Header`; any record after it must be a `NodeState`, in
/// any order (the caller dispatches each to the right node by id).
pub fn read_snapshot(reader: impl BufRead) -> io::Result<EngineSnapshot> {
    let mut snapshot = EngineSnapshot {
        now: EngineTime::default(),
        pending: Vec::new(),
        node_states: Vec::new(),
    };
    let mut saw_header = false;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: CheckpointRecord = serde_json::from_str(&line)?;
        match record {
            CheckpointRecord::Header { now, pending } => {
                snapshot.now = now;
                snapshot.pending = pending;
                saw_header = true;
            }
            CheckpointRecord::NodeState { node, state } => {
                snapshot.node_states.push((node, state));
            }
        }
    }
    if !saw_header {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "checkpoint stream had no header record",
        ));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_node_states() {
        let snapshot = EngineSnapshot {
            now: EngineTime::MIN_ST.succ(),
            pending: vec![PendingEntry {
                node: NodeId(1),
                at: EngineTime::MIN_ST.succ().succ(),
            }],
            node_states: vec![(NodeId(0), serde_json::json!({"count": 3}))],
        };
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &snapshot).unwrap();
        let restored = read_snapshot(io::Cursor::new(buf)).unwrap();
        assert_eq!(restored.now, snapshot.now);
        assert_eq!(restored.pending.len(), 1);
        assert_eq!(restored.pending[0].node, NodeId(1));
        assert_eq!(restored.node_states[0].0, NodeId(0));
        assert_eq!(restored.node_states[0].1["count"], 3);
    }

    #[test]
    fn missing_header_is_an_error() {
        let record = CheckpointRecord::NodeState {
            node: NodeId(0),
            state: serde_json::json!(null),
        };
        let line = serde_json::to_string(&record).unwrap();
        let err = read_snapshot(io::Cursor::new(line)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
