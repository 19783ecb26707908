//! Workload manager
//!
//! TigerStyle: One pool mutex, explicit lifecycle, fail-fast deploys.
//!
//! The workload manager owns the node's agent pool. It admits warmed
//! agent processes as pending, serializes deployment (select, prepare,
//! submit, attach triggers) under a single pool mutex, and drives the
//! best-effort stop path under a per-workload stop mutex. It does not know
//! how agent processes are created, only how to talk to them through the
//! agent client and the process manager contract.

use crate::events::EventRelay;
use crate::process::{PoolCallback, ProcessManager};
use crate::summary::{format_uptime, MachineSummary, WorkloadSummary};
use crate::trigger::{trigger_handler, TriggerContext};
use async_trait::async_trait;
use selkie_agent::{
    AgentClient, AgentEventEnvelope, AgentEvents, AgentLogEnvelope, DeployRequest,
};
use selkie_bus::{Bus, Subscription};
use selkie_core::{
    metrics, Error, NodeConfig, Result, RngProvider, ShutdownSignal, TimeProvider,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Namespace used for lifecycle events of workloads that never bound a
/// deploy request
const NAMESPACE_DEFAULT: &str = "default";

/// Pool state, all guarded by the single pool mutex
#[derive(Default)]
struct PoolState {
    /// Agents that hand-shook and await a deployment
    pending: HashMap<String, Arc<AgentClient>>,
    /// Agents that acknowledged a deployment and are not yet stopped
    active: HashMap<String, Arc<AgentClient>>,
    /// Handshake completion stamps, RFC3339 UTC; presence doubles as the
    /// "at least one handshake ever" signal
    handshakes: HashMap<String, String>,
    /// Per-workload stop mutexes; presence marks a slot owned by the pool
    stop_locks: HashMap<String, Arc<Mutex<()>>>,
    /// Trigger subject subscriptions per deployed workload
    subz: HashMap<String, Vec<Box<dyn Subscription>>>,
    /// Deploy acceptance times, epoch ms
    deploy_times: HashMap<String, u64>,
}

/// Internal statistics with atomic counters
#[derive(Default)]
pub(crate) struct ManagerStatsInner {
    pub(crate) workloads_deployed: AtomicU64,
    pub(crate) deployed_bytes: AtomicU64,
    pub(crate) function_triggers: AtomicU64,
    pub(crate) function_triggers_failed: AtomicU64,
    pub(crate) function_runtime_ns: AtomicU64,
    runtime_ns_by_workload: StdMutex<HashMap<String, u64>>,
}

impl ManagerStatsInner {
    pub(crate) fn add_workload_runtime(&self, workload_id: &str, runtime_ns: u64) {
        let mut map = self
            .runtime_ns_by_workload
            .lock()
            .expect("stats map poisoned");
        *map.entry(workload_id.to_string()).or_default() += runtime_ns;
    }

    fn workload_runtime_ns(&self, workload_id: &str) -> u64 {
        self.runtime_ns_by_workload
            .lock()
            .expect("stats map poisoned")
            .get(workload_id)
            .copied()
            .unwrap_or(0)
    }

    fn remove_workload(&self, workload_id: &str) {
        self.runtime_ns_by_workload
            .lock()
            .expect("stats map poisoned")
            .remove(workload_id);
    }
}

/// Manager statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ManagerStats {
    /// Accepted deployments
    pub workloads_deployed: u64,
    /// Bytes of accepted deployment artifacts
    pub deployed_bytes: u64,
    /// Successful function trigger invocations
    pub function_triggers: u64,
    /// Failed function trigger invocations
    pub function_triggers_failed: u64,
    /// Accumulated function runtime in nanoseconds
    pub function_runtime_ns: u64,
}

/// Pool membership snapshot, sorted for stable assertions
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    /// Workload IDs in the pending set
    pub pending: Vec<String>,
    /// Workload IDs in the active set
    pub active: Vec<String>,
    /// Workload IDs with a completed handshake
    pub handshaken: Vec<String>,
    /// Workload IDs holding a stop mutex (slots owned by the pool)
    pub stop_locks: Vec<String>,
    /// Trigger subscription counts per workload
    pub trigger_subscriptions: HashMap<String, usize>,
}

/// The node's workload manager
///
/// Create with [`WorkloadManager::new`], hand it to the process manager
/// with [`WorkloadManager::start`], then drive it from the control plane.
pub struct WorkloadManager {
    config: NodeConfig,
    node_id: String,
    /// External bus: triggers in, events and logs out
    bus: Arc<dyn Bus>,
    /// Internal bus shared with agent processes
    bus_internal: Arc<dyn Bus>,
    procman: Arc<dyn ProcessManager>,
    time: Arc<dyn TimeProvider>,
    rng: Arc<dyn RngProvider>,
    shutdown: ShutdownSignal,
    relay: EventRelay,
    pool: Mutex<PoolState>,
    closing: AtomicU32,
    stats: Arc<ManagerStatsInner>,
    self_weak: Weak<WorkloadManager>,
}

impl WorkloadManager {
    /// Create a new workload manager
    ///
    /// Validates the node configuration and logs the sandbox warning when
    /// isolation is disabled.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: NodeConfig,
        bus: Arc<dyn Bus>,
        bus_internal: Arc<dyn Bus>,
        procman: Arc<dyn ProcessManager>,
        time: Arc<dyn TimeProvider>,
        rng: Arc<dyn RngProvider>,
        shutdown: ShutdownSignal,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        if config.no_sandbox {
            warn!("sandboxing has been disabled, workloads should be considered unsafe");
            warn!("make sure this is the behavior you wanted and you are in an appropriate environment");
        }

        let node_id = config
            .node_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let relay = EventRelay::new(Arc::clone(&bus), node_id.clone(), Arc::clone(&time));

        Ok(Arc::new_cyclic(|weak| Self {
            config,
            node_id,
            bus,
            bus_internal,
            procman,
            time,
            rng,
            shutdown,
            relay,
            pool: Mutex::new(PoolState::default()),
            closing: AtomicU32::new(0),
            stats: Arc::new(ManagerStatsInner::default()),
            self_weak: weak.clone(),
        }))
    }

    /// Node identifier
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Start the workload manager, which in turn starts the process manager
    ///
    /// A process manager start failure cancels the node.
    pub async fn start(&self) {
        info!(node_id = %self.node_id, "workload manager starting");

        let Some(callback) = self.self_weak.upgrade() else {
            return;
        };

        let callback: Arc<dyn PoolCallback> = callback;
        if let Err(e) = self.procman.start(callback).await {
            error!(error = %e, "agent process manager failed to start");
            self.shutdown.cancel();
        }
    }

    /// Deploy a workload to an available agent in the pool
    ///
    /// The entire body runs under the pool mutex so selection, preparation
    /// and the pending to active transition are atomic; no other deploy
    /// observes a transient state and no stop races the transition.
    /// Rollback paths release the mutex before calling
    /// [`WorkloadManager::stop_workload`].
    pub async fn deploy_workload(&self, request: &DeployRequest) -> Result<String> {
        request.validate()?;

        let mut pool = self.pool.lock().await;

        let agent = Self::select_pending(&pool, self.rng.as_ref())?;
        let workload_id = agent.id().to_string();

        self.procman
            .prepare_workload(&workload_id, request)
            .await
            .map_err(|e| Error::prepare_failed(&workload_id, e.to_string()))?;

        debug!(
            workload_id = %workload_id,
            workload_type = %request.workload_type,
            "workload manager deploying workload"
        );

        let response = agent.deploy_workload(request).await.map_err(|e| {
            Error::DeploySubmissionFailed {
                workload_id: workload_id.clone(),
                reason: e.to_string(),
            }
        })?;

        if !response.accepted {
            let message = response
                .message
                .unwrap_or_else(|| "agent gave no reason".to_string());

            drop(pool);
            if let Err(e) = self.stop_workload(&workload_id, false).await {
                warn!(workload_id = %workload_id, error = %e, "rollback stop after rejected deploy failed");
            }

            return Err(Error::DeployRejected {
                workload_id,
                message,
            });
        }

        if let Some(client) = pool.pending.remove(&workload_id) {
            pool.active.insert(workload_id.clone(), client);
        }
        pool.deploy_times
            .insert(workload_id.clone(), self.time.now_ms());

        if request.supports_trigger_subjects() {
            for tsub in &request.trigger_subjects {
                let handler = trigger_handler(TriggerContext {
                    bus: Arc::clone(&self.bus),
                    agent: Arc::clone(&agent),
                    workload_id: workload_id.clone(),
                    workload_name: request.workload_name.clone(),
                    workload_type: request.workload_type.to_string(),
                    namespace: request.namespace.clone(),
                    trigger_subject: tsub.clone(),
                    stats: Arc::clone(&self.stats),
                    relay: self.relay.clone(),
                    shutdown: self.shutdown.clone(),
                });

                match self.bus.subscribe(tsub, handler).await {
                    Ok(sub) => {
                        info!(
                            workload_id = %workload_id,
                            trigger_subject = %tsub,
                            workload_type = %request.workload_type,
                            "created trigger subject subscription for deployed workload"
                        );
                        pool.subz.entry(workload_id.clone()).or_default().push(sub);
                    }
                    Err(e) => {
                        error!(
                            workload_id = %workload_id,
                            trigger_subject = %tsub,
                            workload_type = %request.workload_type,
                            error = %e,
                            "failed to create trigger subject subscription for deployed workload"
                        );

                        drop(pool);
                        if let Err(stop_err) = self.stop_workload(&workload_id, true).await {
                            warn!(workload_id = %workload_id, error = %stop_err, "rollback stop after trigger install failure failed");
                        }

                        return Err(Error::TriggerInstallFailed {
                            workload_id,
                            subject: tsub.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        drop(pool);

        self.stats.workloads_deployed.fetch_add(1, Ordering::SeqCst);
        self.stats
            .deployed_bytes
            .fetch_add(request.total_bytes, Ordering::SeqCst);
        metrics::record_workload_deployed(
            &request.workload_type.to_string(),
            &request.namespace,
        );
        metrics::record_deployed_bytes(request.total_bytes, &request.namespace);

        self.relay
            .publish_workload_deployed(&request.namespace, &workload_id)
            .await;

        Ok(workload_id)
    }

    /// Look up the deploy request bound to a workload
    ///
    /// Pending workloads are not considered: only a prepared deployment has
    /// a stored request.
    pub async fn lookup_workload(&self, workload_id: &str) -> Result<Option<DeployRequest>> {
        self.procman.lookup(workload_id).await
    }

    /// List deployed, running workloads
    pub async fn running_workloads(&self) -> Result<Vec<MachineSummary>> {
        let procs = self.procman.list_processes().await?;
        let now = self.time.now_ms();

        let deploy_times = {
            let pool = self.pool.lock().await;
            pool.deploy_times.clone()
        };

        Ok(procs
            .into_iter()
            .map(|p| {
                let uptime = deploy_times
                    .get(&p.workload_id)
                    .map(|deployed_at| format_uptime(now.saturating_sub(*deployed_at)))
                    .unwrap_or_else(|| format_uptime(0));

                let runtime = if p.deploy_request.supports_trigger_subjects() {
                    format!("{}ns", self.stats.workload_runtime_ns(&p.workload_id))
                } else {
                    uptime.clone()
                };

                MachineSummary {
                    id: p.workload_id,
                    healthy: true,
                    uptime,
                    namespace: p.namespace,
                    workload: WorkloadSummary {
                        name: p.name,
                        description: p.deploy_request.description.clone().unwrap_or_default(),
                        runtime,
                        workload_type: p.deploy_request.workload_type,
                        hash: p.deploy_request.hash.clone(),
                    },
                }
            })
            .collect())
    }

    /// Stop a workload, optionally attempting a graceful undeploy first
    ///
    /// Best-effort: subscription drain and undeploy failures are logged and
    /// do not abort the stop; only a process stop failure is surfaced.
    pub async fn stop_workload(&self, workload_id: &str, undeploy: bool) -> Result<()> {
        let deploy_request = match self.procman.lookup(workload_id).await {
            Ok(request) => request,
            Err(e) => {
                warn!(workload_id, error = %e, "request to stop workload failed");
                return Err(e);
            }
        };

        // A missing stop mutex means the slot is no longer owned by the
        // pool: a concurrent or repeated stop already won
        let stop_lock = {
            let pool = self.pool.lock().await;
            pool.stop_locks.get(workload_id).cloned()
        }
        .ok_or_else(|| Error::workload_not_found(workload_id))?;

        let _guard = stop_lock.lock().await;

        debug!(workload_id, undeploy, "attempting to stop workload");

        let subs = {
            let mut pool = self.pool.lock().await;
            pool.subz.remove(workload_id).unwrap_or_default()
        };

        for sub in &subs {
            match sub.drain().await {
                Ok(()) => {
                    debug!(workload_id, subject = sub.subject(), "drained trigger subject subscription")
                }
                Err(e) => warn!(
                    workload_id,
                    subject = sub.subject(),
                    error = %e,
                    "failed to drain trigger subject subscription"
                ),
            }
        }

        if undeploy && deploy_request.is_some() {
            let client = {
                let pool = self.pool.lock().await;
                pool.active.get(workload_id).cloned()
            };

            if let Some(client) = client {
                if let Err(e) = client.undeploy().await {
                    warn!(workload_id, error = %e, "request to undeploy workload via internal bus failed");
                }
            }
        }

        if let Err(e) = self.procman.stop_process(workload_id).await {
            warn!(workload_id, error = %e, "failed to stop workload process");
            return Err(Error::stop_process_failed(workload_id, e.to_string()));
        }

        let removed = {
            let mut pool = self.pool.lock().await;
            pool.stop_locks.remove(workload_id);
            pool.deploy_times.remove(workload_id);

            let mut removed = Vec::new();
            if let Some(client) = pool.pending.remove(workload_id) {
                removed.push(client);
            }
            if let Some(client) = pool.active.remove(workload_id) {
                removed.push(client);
            }
            removed
        };
        self.stats.remove_workload(workload_id);

        let namespace = deploy_request
            .as_ref()
            .map(|r| r.namespace.as_str())
            .unwrap_or(NAMESPACE_DEFAULT);
        self.relay
            .publish_workload_stopped(namespace, workload_id)
            .await;

        // Scheduled client drains run last so the undeploy exchange above
        // is not cut off
        for client in removed {
            if let Err(e) = client.drain().await {
                warn!(workload_id, error = %e, "failed to drain agent client");
            }
        }

        Ok(())
    }

    /// Stop the workload manager and all managed agents
    ///
    /// Idempotent: the first caller wins and delegates full-pool teardown
    /// to the process manager; later calls are no-ops.
    pub async fn stop(&self) -> Result<()> {
        if self.closing.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("workload manager stopping");

            if let Err(e) = self.procman.stop().await {
                error!(error = %e, "failed to stop agent process manager");
                return Err(e);
            }
        }

        Ok(())
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            workloads_deployed: self.stats.workloads_deployed.load(Ordering::SeqCst),
            deployed_bytes: self.stats.deployed_bytes.load(Ordering::SeqCst),
            function_triggers: self.stats.function_triggers.load(Ordering::SeqCst),
            function_triggers_failed: self
                .stats
                .function_triggers_failed
                .load(Ordering::SeqCst),
            function_runtime_ns: self.stats.function_runtime_ns.load(Ordering::SeqCst),
        }
    }

    /// Pool membership snapshot
    pub async fn pool_snapshot(&self) -> PoolSnapshot {
        let pool = self.pool.lock().await;

        let mut snapshot = PoolSnapshot {
            pending: pool.pending.keys().cloned().collect(),
            active: pool.active.keys().cloned().collect(),
            handshaken: pool.handshakes.keys().cloned().collect(),
            stop_locks: pool.stop_locks.keys().cloned().collect(),
            trigger_subscriptions: pool
                .subz
                .iter()
                .map(|(id, subs)| (id.clone(), subs.len()))
                .collect(),
        };

        snapshot.pending.sort();
        snapshot.active.sort();
        snapshot.handshaken.sort();
        snapshot.stop_locks.sort();
        snapshot
    }

    /// Pick a pending agent for the next deployment
    ///
    /// Uniform-random over the pending set. HashMap iteration order is
    /// fixed per map instance in Rust, so an explicit index draw is
    /// required for the pick to be uniform across invocations.
    fn select_pending(pool: &PoolState, rng: &dyn RngProvider) -> Result<Arc<AgentClient>> {
        if pool.pending.is_empty() {
            return Err(Error::NoAvailableAgent);
        }

        let index = rng.gen_index(pool.pending.len());
        pool.pending
            .values()
            .nth(index)
            .cloned()
            .ok_or(Error::NoAvailableAgent)
    }
}

#[async_trait]
impl PoolCallback for WorkloadManager {
    /// Called by the process manager when an agent process has been warmed
    async fn on_process_started(&self, workload_id: &str) {
        let Some(manager) = self.self_weak.upgrade() else {
            return;
        };

        let mut pool = self.pool.lock().await;

        if pool.pending.len() + pool.active.len() >= self.config.pool_agents_max {
            warn!(workload_id, "agent pool at capacity, ignoring warmed process");
            return;
        }

        let client = AgentClient::new(
            Arc::clone(&self.bus_internal),
            Duration::from_millis(self.config.handshake_timeout_ms),
            Duration::from_millis(self.config.agent_rpc_timeout_ms),
            manager as Arc<dyn AgentEvents>,
        );

        if let Err(e) = client.start(workload_id).await {
            error!(workload_id, error = %e, "failed to start agent client");
            return;
        }

        pool.pending.insert(workload_id.to_string(), client);
        pool.stop_locks
            .insert(workload_id.to_string(), Arc::new(Mutex::new(())));

        debug!(workload_id, "agent admitted to pending pool");
    }
}

#[async_trait]
impl AgentEvents for WorkloadManager {
    async fn on_handshake_succeeded(&self, workload_id: &str) {
        let mut pool = self.pool.lock().await;
        let stamp = self.time.now_rfc3339();

        debug!(workload_id, handshake_at = %stamp, "agent handshake succeeded");
        pool.handshakes.insert(workload_id.to_string(), stamp);
    }

    async fn on_handshake_timed_out(&self, workload_id: &str) {
        let mut pool = self.pool.lock().await;

        error!(workload_id, "did not receive handshake from agent within timeout");
        pool.pending.remove(workload_id);
        pool.stop_locks.remove(workload_id);

        if pool.handshakes.is_empty() {
            error!("first handshake failed, shutting down to avoid inconsistent behavior");
            self.shutdown.cancel();
        }
    }

    async fn on_agent_event(&self, workload_id: &str, envelope: AgentEventEnvelope) {
        debug!(workload_id, event_type = %envelope.event_type, "relaying agent event");
        self.relay
            .publish_event(&envelope.namespace, &envelope.event_type, envelope.event)
            .await;
    }

    async fn on_agent_log(&self, workload_id: &str, log: AgentLogEnvelope) {
        self.relay.publish_log(workload_id, log).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessManager;
    use selkie_agent::WorkloadType;
    use selkie_bus::MemoryBus;
    use selkie_core::{WallClockTime, XorShiftRng};

    fn manager_with(
        procman: Arc<MockProcessManager>,
        config: NodeConfig,
    ) -> Arc<WorkloadManager> {
        WorkloadManager::new(
            config,
            Arc::new(MemoryBus::new()),
            Arc::new(MemoryBus::new()),
            procman,
            Arc::new(WallClockTime::new()),
            Arc::new(XorShiftRng::with_seed(7)),
            ShutdownSignal::new(),
        )
        .unwrap()
    }

    fn request() -> DeployRequest {
        DeployRequest {
            workload_name: "svc".into(),
            workload_type: WorkloadType::Native,
            namespace: "default".into(),
            description: None,
            total_bytes: 1024,
            hash: "abc".into(),
            trigger_subjects: vec![],
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let result = WorkloadManager::new(
            NodeConfig::default().with_handshake_timeout_ms(0),
            Arc::new(MemoryBus::new()),
            Arc::new(MemoryBus::new()),
            Arc::new(MockProcessManager::new()),
            Arc::new(WallClockTime::new()),
            Arc::new(XorShiftRng::with_seed(7)),
            ShutdownSignal::new(),
        );

        assert!(matches!(
            result.err(),
            Some(Error::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_deploy_with_empty_pool_fails() {
        let procman = Arc::new(MockProcessManager::new());
        let manager = manager_with(Arc::clone(&procman), NodeConfig::default());
        manager.start().await;

        let err = manager.deploy_workload(&request()).await.unwrap_err();
        assert!(matches!(err, Error::NoAvailableAgent));
        assert_eq!(manager.stats().workloads_deployed, 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let procman = Arc::new(MockProcessManager::new());
        let manager = manager_with(Arc::clone(&procman), NodeConfig::default());
        manager.start().await;

        manager.stop().await.unwrap();
        manager.stop().await.unwrap();
        manager.stop().await.unwrap();

        assert_eq!(procman.stop_all_calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_workload_unknown_id_is_rejected() {
        let procman = Arc::new(MockProcessManager::new());
        let manager = manager_with(Arc::clone(&procman), NodeConfig::default());
        manager.start().await;

        let err = manager.stop_workload("ghost", false).await.unwrap_err();
        assert!(matches!(err, Error::WorkloadNotFound { .. }));
    }

    #[tokio::test]
    async fn test_node_id_generated_when_unset() {
        let manager = manager_with(Arc::new(MockProcessManager::new()), NodeConfig::default());
        assert!(!manager.node_id().is_empty());

        let manager = manager_with(
            Arc::new(MockProcessManager::new()),
            NodeConfig::default().with_node_id("node-9"),
        );
        assert_eq!(manager.node_id(), "node-9");
    }
}
