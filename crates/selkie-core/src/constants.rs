//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Workload Limits
// =============================================================================

/// Maximum length of a workload ID in bytes
pub const WORKLOAD_ID_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of a workload namespace in bytes
pub const WORKLOAD_NAMESPACE_LENGTH_BYTES_MAX: usize = 128;

/// Maximum number of trigger subjects a single deploy request may declare
pub const WORKLOAD_TRIGGER_SUBJECTS_COUNT_MAX: usize = 64;

/// Maximum artifact size accepted for a deployment in bytes (1 GB)
pub const WORKLOAD_ARTIFACT_SIZE_BYTES_MAX: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Pool Limits
// =============================================================================

/// Maximum number of agent processes a node manages at once
pub const POOL_AGENTS_COUNT_MAX: usize = 10_000;

/// Default handshake timeout for a warmed agent in milliseconds
pub const HANDSHAKE_TIMEOUT_MS_DEFAULT: u64 = 1_500;

/// Maximum configurable handshake timeout in milliseconds (1 min)
pub const HANDSHAKE_TIMEOUT_MS_MAX: u64 = 60 * 1000;

// =============================================================================
// RPC Limits
// =============================================================================

/// Default timeout for agent client RPCs (deploy, undeploy, trigger) in
/// milliseconds
pub const AGENT_RPC_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

/// Maximum agent RPC timeout in milliseconds (5 min)
pub const AGENT_RPC_TIMEOUT_MS_MAX: u64 = 5 * 60 * 1000;

/// Maximum size of a bus message payload in bytes (8 MB)
pub const BUS_MESSAGE_SIZE_BYTES_MAX: usize = 8 * 1024 * 1024;

// Compile-time assertions for constant validity
const _: () = {
    assert!(WORKLOAD_ID_LENGTH_BYTES_MAX >= 64);
    assert!(HANDSHAKE_TIMEOUT_MS_DEFAULT <= HANDSHAKE_TIMEOUT_MS_MAX);
    assert!(AGENT_RPC_TIMEOUT_MS_DEFAULT <= AGENT_RPC_TIMEOUT_MS_MAX);
    assert!(POOL_AGENTS_COUNT_MAX >= 1);
};
