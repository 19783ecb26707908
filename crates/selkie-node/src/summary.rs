//! Control-plane summary types
//!
//! Wire shapes for the running-workloads listing.

use selkie_agent::WorkloadType;
use serde::{Deserialize, Serialize};

/// Summary of one machine (agent process) on the node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSummary {
    /// Workload ID
    pub id: String,
    /// Whether the process is believed healthy
    pub healthy: bool,
    /// Wall-clock time since the deployment was accepted
    pub uptime: String,
    /// Namespace of the deployed workload
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// The deployed workload
    pub workload: WorkloadSummary,
}

/// Summary of a deployed workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSummary {
    /// Workload name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Accumulated function runtime for triggered workloads, uptime for
    /// services
    pub runtime: String,
    /// Workload type tag
    #[serde(rename = "type")]
    pub workload_type: WorkloadType,
    /// Artifact content hash
    pub hash: String,
}

/// Format a millisecond duration as a compact uptime string
pub fn format_uptime(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
