#![warn(clippy::perf)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_doctest_main)]
#![doc = include_str!("../README.md")]

#[macro_use]
extern crate log;
extern crate derive_new;

pub mod error;
pub mod graph;
pub mod nested;
pub mod node;
pub mod observer;
pub mod persist;
pub mod plan;
pub mod scheduler;
pub mod service;
pub mod time;
pub mod ts;

mod queue;

pub use error::{EngineError, PlanError, PushError};
pub use graph::{Engine, EngineObserver, GraphConfiguration, RunFor, RunMode};
pub use nested::{feedback, ChildGraph, DelayedBinding, FeedbackWriter, MapNode, SwitchNode};
pub use node::{MutableNode, Node, NodeContext, NodeId};
pub use plan::{DownstreamEdge, EdgeActivation, GraphPlan, NodeSpec, PlanBuilder};
pub use scheduler::{ScheduleAt, SchedulerHandle};
pub use service::{push_channel, Adaptor, PushReceiver, PushRecord, PushSender, ServiceRegistry};
pub use time::{EngineTime, TimeDelta};
pub use ts::{
    AnyTsOutput, DictDelta, DynTsHandle, Element, RefOutput, SetDelta, SignalOutput, TsChildOutput,
    TsOutput, TsbOutput, TsdOutput, TslOutput, TswOutput,
};
