//! Typed error surface for the engine (spec.md §7).
//!
//! `PlanError` is raised while building/wiring a [crate::plan::GraphPlan]
//! and never once the engine has started. `EngineError` is raised while
//! running and distinguishes the policies spec.md §7 calls for: a
//! `TypeMismatch` or un-recovered `Node` error unwinds the run, a `Push`
//! error is reported to the caller of [crate::service::PushSender::send]
//! rather than propagated, and `Service` is really a `PlanError` surfaced
//! at service-resolution time.

use thiserror::Error;

/// Errors detected while building the immutable graph plan. Fatal: the
/// engine never starts.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("cycle detected through node `{0}` with no feedback edge breaking it")]
    Cyclic(String),

    #[error("cannot wire `{from}` ({from_kind}) to `{to}` ({to_kind}): incompatible time-series kinds")]
    IncompatibleKinds {
        from: String,
        from_kind: &'static str,
        to: String,
        to_kind: &'static str,
    },

    #[error("delayed binding `{0}` was declared but never bound before the graph was built")]
    UnboundDelayedBinding(String),

    #[error("edge from `{from}` (rank {from_rank}) to `{to}` (rank {to_rank}) does not strictly increase rank")]
    NonIncreasingRank {
        from: String,
        from_rank: u32,
        to: String,
        to_rank: u32,
    },

    #[error("no service registered for path `{0}`")]
    ServiceNotRegistered(String),

    #[error("service at path `{0}` already registered")]
    ServiceAlreadyRegistered(String),
}

/// Errors raised once the engine is running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A REF rebound to an output of an incompatible kind. Wiring-time
    /// type checks should prevent this; reaching it at runtime is always
    /// a bug in the wiring layer producing the plan.
    #[error("REF `{reference}` rebound to incompatible kind: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        reference: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A node's `eval`, `start` or `stop` raised an error and did not
    /// declare `recover`.
    #[error("node `{node}` failed during `{phase}`: {source}")]
    Node {
        node: String,
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Returned by a push-queue sender when the engine has already stopped.
/// Never propagated to the engine: the sender just returns `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushError;

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("push queue sender called after engine stop")
    }
}

impl std::error::Error for PushError {}
