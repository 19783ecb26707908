//! Agent process manager contract
//!
//! TigerStyle: Narrow capability interfaces at the process boundary.
//!
//! The workload manager does not know how agent processes are created
//! (micro-VM or direct spawn), only how to ask for them through this
//! contract. The process manager calls back into the pool through the
//! equally narrow [`PoolCallback`] capability instead of holding a full
//! manager reference.

use async_trait::async_trait;
use selkie_agent::{AgentEvents, DeployRequest};
use selkie_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A process known to the process manager, with its bound deploy request
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Workload ID assigned when the process was prepared
    pub workload_id: String,
    /// Namespace of the bound workload
    pub namespace: String,
    /// Name of the bound workload
    pub name: String,
    /// The last deploy request bound to the process
    pub deploy_request: DeployRequest,
}

/// Capability the pool hands to the process manager
///
/// Covers warmed-process admission plus the four per-agent callbacks, so
/// the process manager and the agent transport never see the manager
/// itself.
#[async_trait]
pub trait PoolCallback: AgentEvents {
    /// An agent process has been warmed and is ready for a deployment
    async fn on_process_started(&self, workload_id: &str);
}

/// Contract for starting, preparing and stopping agent processes
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Begin warming processes; the callback fires once per warmed process
    async fn start(&self, callback: Arc<dyn PoolCallback>) -> Result<()>;

    /// Bind a deploy request to process `workload_id` (e.g. mount artifacts)
    async fn prepare_workload(&self, workload_id: &str, request: &DeployRequest) -> Result<()>;

    /// Return the last deploy request bound to `workload_id`, if any
    ///
    /// Errors when the process itself is unknown.
    async fn lookup(&self, workload_id: &str) -> Result<Option<DeployRequest>>;

    /// List processes with a bound deploy request
    async fn list_processes(&self) -> Result<Vec<ProcessInfo>>;

    /// Terminate process `workload_id`
    async fn stop_process(&self, workload_id: &str) -> Result<()>;

    /// Terminate all processes
    async fn stop(&self) -> Result<()>;
}

/// In-memory process manager for tests
///
/// Warms processes on demand via [`MockProcessManager::warm_process`] and
/// records every stop so scenarios can assert teardown ordering.
#[derive(Default)]
pub struct MockProcessManager {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    callback: Option<Arc<dyn PoolCallback>>,
    processes: HashMap<String, Option<DeployRequest>>,
    stopped: Vec<String>,
    stop_all_calls: u64,
    fail_prepare: bool,
    fail_stop: bool,
}

impl MockProcessManager {
    /// Create a new mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a warmed process and fire the pool callback
    pub async fn warm_process(&self, workload_id: &str) -> Result<()> {
        let callback = {
            let mut state = self.state.lock().expect("mock state poisoned");
            state.processes.insert(workload_id.to_string(), None);
            state.callback.clone()
        };

        let callback = callback.ok_or_else(|| {
            Error::process_manager("process manager not started, no pool callback")
        })?;

        callback.on_process_started(workload_id).await;
        Ok(())
    }

    /// Make subsequent `prepare_workload` calls fail
    pub fn set_fail_prepare(&self, fail: bool) {
        self.state.lock().expect("mock state poisoned").fail_prepare = fail;
    }

    /// Make subsequent `stop_process` calls fail
    pub fn set_fail_stop(&self, fail: bool) {
        self.state.lock().expect("mock state poisoned").fail_stop = fail;
    }

    /// Workload IDs stopped so far, in stop order
    pub fn stopped_processes(&self) -> Vec<String> {
        self.state.lock().expect("mock state poisoned").stopped.clone()
    }

    /// Number of full-pool stop calls received
    pub fn stop_all_calls(&self) -> u64 {
        self.state.lock().expect("mock state poisoned").stop_all_calls
    }

    /// Whether a process is still registered
    pub fn has_process(&self, workload_id: &str) -> bool {
        self.state
            .lock()
            .expect("mock state poisoned")
            .processes
            .contains_key(workload_id)
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    async fn start(&self, callback: Arc<dyn PoolCallback>) -> Result<()> {
        self.state.lock().expect("mock state poisoned").callback = Some(callback);
        Ok(())
    }

    async fn prepare_workload(&self, workload_id: &str, request: &DeployRequest) -> Result<()> {
        let mut state = self.state.lock().expect("mock state poisoned");

        if state.fail_prepare {
            return Err(Error::process_manager("simulated prepare failure"));
        }

        match state.processes.get_mut(workload_id) {
            Some(slot) => {
                *slot = Some(request.clone());
                Ok(())
            }
            None => Err(Error::workload_not_found(workload_id)),
        }
    }

    async fn lookup(&self, workload_id: &str) -> Result<Option<DeployRequest>> {
        let state = self.state.lock().expect("mock state poisoned");

        match state.processes.get(workload_id) {
            Some(slot) => Ok(slot.clone()),
            None => Err(Error::workload_not_found(workload_id)),
        }
    }

    async fn list_processes(&self) -> Result<Vec<ProcessInfo>> {
        let state = self.state.lock().expect("mock state poisoned");

        Ok(state
            .processes
            .iter()
            .filter_map(|(id, slot)| {
                slot.as_ref().map(|request| ProcessInfo {
                    workload_id: id.clone(),
                    namespace: request.namespace.clone(),
                    name: request.workload_name.clone(),
                    deploy_request: request.clone(),
                })
            })
            .collect())
    }

    async fn stop_process(&self, workload_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("mock state poisoned");

        if state.fail_stop {
            return Err(Error::process_manager("simulated stop failure"));
        }

        if state.processes.remove(workload_id).is_none() {
            return Err(Error::workload_not_found(workload_id));
        }

        state.stopped.push(workload_id.to_string());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.stop_all_calls += 1;
        state.processes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_agent::{AgentEventEnvelope, AgentLogEnvelope, WorkloadType};

    #[derive(Default)]
    struct NoopCallback;

    #[async_trait]
    impl AgentEvents for NoopCallback {
        async fn on_handshake_succeeded(&self, _workload_id: &str) {}
        async fn on_handshake_timed_out(&self, _workload_id: &str) {}
        async fn on_agent_event(&self, _workload_id: &str, _envelope: AgentEventEnvelope) {}
        async fn on_agent_log(&self, _workload_id: &str, _log: AgentLogEnvelope) {}
    }

    #[async_trait]
    impl PoolCallback for NoopCallback {
        async fn on_process_started(&self, _workload_id: &str) {}
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
    async fn test_warm_requires_start() {
        let procman = MockProcessManager::new();
        assert!(procman.warm_process("w1").await.is_err());

        procman.start(Arc::new(NoopCallback)).await.unwrap();
        assert!(procman.warm_process("w1").await.is_ok());
        assert!(procman.has_process("w1"));
    }

    #[tokio::test]
    async fn test_lookup_distinguishes_unknown_and_unbound() {
        let procman = MockProcessManager::new();
        procman.start(Arc::new(NoopCallback)).await.unwrap();
        procman.warm_process("w1").await.unwrap();

        // Known process, nothing bound yet
        assert!(procman.lookup("w1").await.unwrap().is_none());

        // Unknown process is an error
        assert!(procman.lookup("nope").await.is_err());

        procman.prepare_workload("w1", &request()).await.unwrap();
        assert!(procman.lookup("w1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_processes_only_bound() {
        let procman = MockProcessManager::new();
        procman.start(Arc::new(NoopCallback)).await.unwrap();
        procman.warm_process("w1").await.unwrap();
        procman.warm_process("w2").await.unwrap();
        procman.prepare_workload("w1", &request()).await.unwrap();

        let procs = procman.list_processes().await.unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].workload_id, "w1");
        assert_eq!(procs[0].name, "svc");
    }

    #[tokio::test]
    async fn test_stop_process_records_order() {
        let procman = MockProcessManager::new();
        procman.start(Arc::new(NoopCallback)).await.unwrap();
        procman.warm_process("w1").await.unwrap();
        procman.warm_process("w2").await.unwrap();

        procman.stop_process("w2").await.unwrap();
        procman.stop_process("w1").await.unwrap();

        assert_eq!(procman.stopped_processes(), ["w2", "w1"]);
        assert!(procman.stop_process("w1").await.is_err());
    }
}
