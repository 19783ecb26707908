//! Selkie node workload manager
//!
//! TigerStyle: Explicit lifecycle, one pool mutex, narrow seams.
//!
//! # Overview
//!
//! The workload manager owns a node's pool of agent processes:
//!
//! - The process manager (micro-VM or direct spawn, behind the
//!   [`ProcessManager`] contract) warms agent processes and reports them
//!   through the narrow [`PoolCallback`] capability.
//! - Warmed agents hand-shake over the internal bus and become *pending*.
//! - A deploy request moves one pending agent to *active*; function-style
//!   workloads get their trigger subjects wired to the external bus.
//! - Stops drain trigger subscriptions, optionally undeploy gracefully,
//!   terminate the process and publish a `workload_stopped` event.
//!
//! Agent-emitted events and logs are republished under
//! `$NEX.events.<namespace>.<event-type>` and
//! `$NEX.logs.<namespace>.<workload-id>`.

mod events;
mod manager;
mod process;
mod summary;
mod trigger;

pub use events::{
    event_subject, log_subject, CloudEvent, EmittedEvent, EmittedLog, EventRelay,
    EVENT_SUBJECT_PREFIX, EVENT_TYPE_FUNCTION_EXEC_FAILED, EVENT_TYPE_FUNCTION_EXEC_SUCCEEDED,
    EVENT_TYPE_WORKLOAD_DEPLOYED, EVENT_TYPE_WORKLOAD_STOPPED, LOG_SUBJECT_PREFIX,
};
pub use manager::{ManagerStats, PoolSnapshot, WorkloadManager};
pub use process::{MockProcessManager, PoolCallback, ProcessInfo, ProcessManager};
pub use summary::{format_uptime, MachineSummary, WorkloadSummary};
