//! Shared test harness: in-process node plus a scripted fake agent
//! speaking the internal protocol.

#![allow(dead_code)]

use bytes::Bytes;
use selkie_agent::{
    deploy_subject, handshake_subject, trigger_subject, undeploy_subject, DeployRequest,
    DeployResponse, HandshakeMessage, WorkloadType, RUNTIME_NS_HEADER,
};
use selkie_bus::{Bus, Headers, MemoryBus, Message, Subscription};
use selkie_core::{NodeConfig, ShutdownSignal, WallClockTime, XorShiftRng};
use selkie_node::{MockProcessManager, WorkloadManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// A fully wired in-process node
pub struct TestNode {
    pub bus: MemoryBus,
    pub bus_internal: MemoryBus,
    pub procman: Arc<MockProcessManager>,
    pub manager: Arc<WorkloadManager>,
    pub shutdown: ShutdownSignal,
}

/// Build and start a node over in-process buses
pub async fn test_node(config: NodeConfig) -> TestNode {
    let bus = MemoryBus::new();
    let bus_internal = MemoryBus::new();
    let procman = Arc::new(MockProcessManager::new());
    let shutdown = ShutdownSignal::new();

    let manager = WorkloadManager::new(
        config,
        Arc::new(bus.clone()),
        Arc::new(bus_internal.clone()),
        Arc::clone(&procman) as Arc<dyn selkie_node::ProcessManager>,
        Arc::new(WallClockTime::new()),
        Arc::new(XorShiftRng::with_seed(42)),
        shutdown.clone(),
    )
    .expect("valid test config");

    manager.start().await;

    TestNode {
        bus,
        bus_internal,
        procman,
        manager,
        shutdown,
    }
}

/// Scripted behavior for a fake agent process
#[derive(Clone)]
pub struct SimAgentBehavior {
    pub accept: bool,
    pub reject_message: Option<String>,
    pub respond_to_deploys: bool,
    pub respond_to_triggers: bool,
    pub trigger_reply: Bytes,
    /// Value for the runtime header on trigger replies; None omits it
    pub runtime_ns: Option<String>,
}

impl Default for SimAgentBehavior {
    fn default() -> Self {
        Self {
            accept: true,
            reject_message: None,
            respond_to_deploys: true,
            respond_to_triggers: true,
            trigger_reply: Bytes::from_static(b"pong"),
            runtime_ns: Some("42000".to_string()),
        }
    }
}

/// Fake agent listening on the internal bus for one workload ID
pub struct SimAgent {
    pub workload_id: String,
    bus: MemoryBus,
    pub deploys: Arc<AtomicUsize>,
    pub undeploys: Arc<AtomicUsize>,
    pub triggers: Arc<AtomicUsize>,
    subscriptions: Vec<Box<dyn Subscription>>,
}

impl SimAgent {
    /// Subscribe the agent's RPC subjects on the internal bus
    pub async fn install(
        bus_internal: &MemoryBus,
        workload_id: &str,
        behavior: SimAgentBehavior,
    ) -> SimAgent {
        let deploys = Arc::new(AtomicUsize::new(0));
        let undeploys = Arc::new(AtomicUsize::new(0));
        let triggers = Arc::new(AtomicUsize::new(0));
        let mut subscriptions = Vec::new();

        {
            let bus = bus_internal.clone();
            let counter = Arc::clone(&deploys);
            let behavior = behavior.clone();
            let sub = bus_internal
                .subscribe(
                    &deploy_subject(workload_id),
                    Arc::new(move |msg: Message| {
                        let bus = bus.clone();
                        let counter = Arc::clone(&counter);
                        let behavior = behavior.clone();
                        Box::pin(async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            let _request: DeployRequest =
                                serde_json::from_slice(&msg.payload).expect("valid deploy request");

                            if !behavior.respond_to_deploys {
                                return;
                            }

                            let response = DeployResponse {
                                accepted: behavior.accept,
                                message: behavior.reject_message.clone(),
                            };
                            bus.respond(
                                &msg,
                                Bytes::from(serde_json::to_vec(&response).unwrap()),
                                Headers::new(),
                            )
                            .await
                            .expect("deploy reply");
                        })
                    }),
                )
                .await
                .expect("deploy subscription");
            subscriptions.push(sub);
        }

        {
            let bus = bus_internal.clone();
            let counter = Arc::clone(&undeploys);
            let sub = bus_internal
                .subscribe(
                    &undeploy_subject(workload_id),
                    Arc::new(move |msg: Message| {
                        let bus = bus.clone();
                        let counter = Arc::clone(&counter);
                        Box::pin(async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            bus.respond(&msg, Bytes::from_static(b"OK"), Headers::new())
                                .await
                                .expect("undeploy reply");
                        })
                    }),
                )
                .await
                .expect("undeploy subscription");
            subscriptions.push(sub);
        }

        {
            let bus = bus_internal.clone();
            let counter = Arc::clone(&triggers);
            let behavior = behavior.clone();
            let sub = bus_internal
                .subscribe(
                    &trigger_subject(workload_id),
                    Arc::new(move |msg: Message| {
                        let bus = bus.clone();
                        let counter = Arc::clone(&counter);
                        let behavior = behavior.clone();
                        Box::pin(async move {
                            counter.fetch_add(1, Ordering::SeqCst);

                            if !behavior.respond_to_triggers {
                                return;
                            }

                            let mut headers = Headers::new();
                            if let Some(runtime_ns) = &behavior.runtime_ns {
                                headers.insert(RUNTIME_NS_HEADER.to_string(), runtime_ns.clone());
                            }
                            bus.respond(&msg, behavior.trigger_reply.clone(), headers)
                                .await
                                .expect("trigger reply");
                        })
                    }),
                )
                .await
                .expect("trigger subscription");
            subscriptions.push(sub);
        }

        SimAgent {
            workload_id: workload_id.to_string(),
            bus: bus_internal.clone(),
            deploys,
            undeploys,
            triggers,
            subscriptions,
        }
    }

    /// Publish the agent's handshake
    pub async fn handshake(&self) {
        let payload = serde_json::to_vec(&HandshakeMessage {
            workload_id: self.workload_id.clone(),
            message: None,
        })
        .unwrap();

        self.bus
            .publish(&handshake_subject(&self.workload_id), Bytes::from(payload))
            .await
            .expect("handshake publish");
    }
}

/// Warm a process, install a default fake agent for it, and hand-shake
pub async fn warm_agent(node: &TestNode, workload_id: &str) -> SimAgent {
    warm_agent_with(node, workload_id, SimAgentBehavior::default()).await
}

/// Warm a process, install a scripted fake agent for it, and hand-shake
pub async fn warm_agent_with(
    node: &TestNode,
    workload_id: &str,
    behavior: SimAgentBehavior,
) -> SimAgent {
    let agent = SimAgent::install(&node.bus_internal, workload_id, behavior).await;
    node.procman
        .warm_process(workload_id)
        .await
        .expect("warm process");
    settle().await;

    agent.handshake().await;
    settle().await;

    agent
}

/// Collect every message published on a subject
pub async fn capture(bus: &MemoryBus, subject: &str) -> Arc<StdMutex<Vec<Message>>> {
    let collected: Arc<StdMutex<Vec<Message>>> = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&collected);

    bus.subscribe(
        subject,
        Arc::new(move |msg: Message| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(msg);
            })
        }),
    )
    .await
    .expect("capture subscription");

    collected
}

/// A deploy request with the given trigger subjects
pub fn deploy_request(trigger_subjects: &[&str]) -> DeployRequest {
    DeployRequest {
        workload_name: "svc".into(),
        workload_type: WorkloadType::Native,
        namespace: "default".into(),
        description: Some("test workload".into()),
        total_bytes: 1024,
        hash: "abc123".into(),
        trigger_subjects: trigger_subjects.iter().map(|s| s.to_string()).collect(),
        extra: serde_json::Map::new(),
    }
}

/// Let queued bus deliveries settle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
