//! Selkie Core
//!
//! Core types, errors, and constants for the Selkie workload node.
//!
//! # Overview
//!
//! Selkie is a single-node workload manager for a distributed
//! workload-execution fabric. A node owns a pool of sandboxed agent
//! processes; each warmed agent receives at most one workload deployment
//! and is supervised until it is stopped.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `HANDSHAKE_TIMEOUT_MS_DEFAULT`)
//! - Non-deterministic inputs behind provider traits

pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod metrics;
pub mod shutdown;
pub mod telemetry;

pub use config::NodeConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use io::{RngProvider, TimeProvider, WallClockTime, XorShiftRng};
pub use shutdown::ShutdownSignal;
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
