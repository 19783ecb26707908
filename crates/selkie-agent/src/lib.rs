//! Agent client protocol for Selkie
//!
//! TigerStyle: Explicit lifecycle, one client per agent process.
//!
//! # Overview
//!
//! Each agent process hosts at most one workload and speaks a private
//! request/reply protocol over the node's internal bus. This crate carries
//! the wire types, the per-workload subject scheme, and the
//! [`AgentClient`] the node uses to drive an agent through its lifecycle:
//! handshake, deploy, triggers, undeploy, drain.

mod client;
mod error;
mod types;

pub use client::{AgentClient, AgentEvents};
pub use error::{AgentError, AgentResult};
pub use types::{
    deploy_subject, events_subject, handshake_subject, logs_subject, trigger_subject,
    undeploy_subject, AgentEventEnvelope, AgentLogEnvelope, DeployRequest, DeployResponse,
    HandshakeMessage, WorkloadType, AGENT_SUBJECT_PREFIX, RUNTIME_NS_HEADER,
    TRIGGER_SUBJECT_HEADER,
};
