//! Message bus seam for Selkie
//!
//! TigerStyle: One trait for transport, an in-process implementation
//! beside it.
//!
//! # Overview
//!
//! The node uses two logical buses: the internal bus shared with agent
//! processes (handshake, deploy, undeploy, trigger RPCs) and the external
//! bus carrying function triggers, events and logs. Both go through the
//! [`Bus`] trait; [`MemoryBus`] is the in-process implementation used by
//! tests and single-process deployments.

mod error;
mod memory;
mod traits;

pub use error::{BusError, BusResult};
pub use memory::{MemoryBus, MemorySubscription};
pub use traits::{Bus, Headers, Message, MessageHandler, Subscription};
