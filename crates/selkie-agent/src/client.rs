//! Agent client
//!
//! TigerStyle: One client per agent process, explicit lifecycle.
//!
//! The client is created when the process manager reports a warmed agent
//! process. `start` subscribes the internal-bus subject tree for the
//! workload and arms the handshake timer; the four callbacks on
//! [`AgentEvents`] surface handshake results and agent-emitted events and
//! logs to the pool. The client is drained when the workload is stopped.

use crate::error::{AgentError, AgentResult};
use crate::types::{
    deploy_subject, events_subject, handshake_subject, logs_subject, trigger_subject,
    undeploy_subject, AgentEventEnvelope, AgentLogEnvelope, DeployRequest, DeployResponse,
    TRIGGER_SUBJECT_HEADER,
};
use async_trait::async_trait;
use bytes::Bytes;
use selkie_bus::{Bus, Headers, Message, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Callbacks surfacing per-agent activity to the pool
#[async_trait]
pub trait AgentEvents: Send + Sync {
    /// The agent completed its handshake
    async fn on_handshake_succeeded(&self, workload_id: &str);

    /// The agent did not hand-shake within the timeout
    async fn on_handshake_timed_out(&self, workload_id: &str);

    /// The agent emitted a CloudEvents envelope
    async fn on_agent_event(&self, workload_id: &str, envelope: AgentEventEnvelope);

    /// The agent emitted a log line
    async fn on_agent_log(&self, workload_id: &str, log: AgentLogEnvelope);
}

/// Client handle bound to one agent process
pub struct AgentClient {
    bus: Arc<dyn Bus>,
    handshake_timeout: Duration,
    rpc_timeout: Duration,
    events: Arc<dyn AgentEvents>,
    workload_id: OnceLock<String>,
    handshaken: AtomicBool,
    drained: AtomicBool,
    subscriptions: Mutex<Vec<Box<dyn Subscription>>>,
    /// Handed to bus handlers and the timeout task so they never keep the
    /// client alive on their own
    self_weak: Weak<AgentClient>,
}

impl AgentClient {
    /// Create a new client over the internal bus
    pub fn new(
        bus: Arc<dyn Bus>,
        handshake_timeout: Duration,
        rpc_timeout: Duration,
        events: Arc<dyn AgentEvents>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            bus,
            handshake_timeout,
            rpc_timeout,
            events,
            workload_id: OnceLock::new(),
            handshaken: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            self_weak: weak.clone(),
        })
    }

    /// The workload ID this client is bound to
    ///
    /// Panics if the client was never started; pool code only touches
    /// started clients.
    pub fn id(&self) -> &str {
        self.workload_id
            .get()
            .map(String::as_str)
            .expect("agent client not started")
    }

    /// Whether the agent completed its handshake
    pub fn is_handshaken(&self) -> bool {
        self.handshaken.load(Ordering::SeqCst)
    }

    /// Begin the handshake for `workload_id`
    ///
    /// Subscribes the workload's subject tree and arms the handshake
    /// timer. If the agent does not hand-shake within the timeout, the
    /// `on_handshake_timed_out` callback fires and the client drains
    /// itself.
    pub async fn start(&self, workload_id: &str) -> AgentResult<()> {
        self.workload_id
            .set(workload_id.to_string())
            .map_err(|_| AgentError::AlreadyStarted {
                workload_id: self.id().to_string(),
            })?;

        let handshake = {
            let weak = self.self_weak.clone();
            self.bus
                .subscribe(
                    &handshake_subject(workload_id),
                    Arc::new(move |msg: Message| {
                        let weak = weak.clone();
                        Box::pin(async move {
                            if let Some(client) = weak.upgrade() {
                                client.handle_handshake(msg).await;
                            }
                        })
                    }),
                )
                .await
                .map_err(|e| AgentError::from_bus(handshake_subject(workload_id), e))?
        };

        let events = {
            let weak = self.self_weak.clone();
            self.bus
                .subscribe(
                    &events_subject(workload_id),
                    Arc::new(move |msg: Message| {
                        let weak = weak.clone();
                        Box::pin(async move {
                            if let Some(client) = weak.upgrade() {
                                client.handle_event(msg).await;
                            }
                        })
                    }),
                )
                .await
                .map_err(|e| AgentError::from_bus(events_subject(workload_id), e))?
        };

        let logs = {
            let weak = self.self_weak.clone();
            self.bus
                .subscribe(
                    &logs_subject(workload_id),
                    Arc::new(move |msg: Message| {
                        let weak = weak.clone();
                        Box::pin(async move {
                            if let Some(client) = weak.upgrade() {
                                client.handle_log(msg).await;
                            }
                        })
                    }),
                )
                .await
                .map_err(|e| AgentError::from_bus(logs_subject(workload_id), e))?
        };

        {
            let mut subs = self.subscriptions.lock().await;
            subs.push(handshake);
            subs.push(events);
            subs.push(logs);
        }

        let weak = self.self_weak.clone();
        let handshake_timeout = self.handshake_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(handshake_timeout).await;

            let Some(client) = weak.upgrade() else {
                return;
            };

            if !client.handshaken.load(Ordering::SeqCst) && !client.drained.load(Ordering::SeqCst)
            {
                client.events.on_handshake_timed_out(client.id()).await;
                if let Err(e) = client.drain().await {
                    warn!(workload_id = client.id(), error = %e, "failed to drain timed-out agent client");
                }
            }
        });

        Ok(())
    }

    async fn handle_handshake(&self, msg: Message) {
        // Only the first handshake counts; replays are acknowledged but not
        // re-surfaced
        let first = !self.handshaken.swap(true, Ordering::SeqCst);

        if msg.reply.is_some() {
            if let Err(e) = self
                .bus
                .respond(&msg, Bytes::from_static(b"OK"), Headers::new())
                .await
            {
                warn!(workload_id = self.id(), error = %e, "failed to acknowledge agent handshake");
            }
        }

        if first {
            debug!(workload_id = self.id(), "agent handshake received");
            self.events.on_handshake_succeeded(self.id()).await;
        }
    }

    async fn handle_event(&self, msg: Message) {
        match serde_json::from_slice::<AgentEventEnvelope>(&msg.payload) {
            Ok(envelope) => self.events.on_agent_event(self.id(), envelope).await,
            Err(e) => {
                warn!(workload_id = self.id(), error = %e, "discarding malformed agent event")
            }
        }
    }

    async fn handle_log(&self, msg: Message) {
        match serde_json::from_slice::<AgentLogEnvelope>(&msg.payload) {
            Ok(log) => self.events.on_agent_log(self.id(), log).await,
            Err(e) => {
                warn!(workload_id = self.id(), error = %e, "discarding malformed agent log")
            }
        }
    }

    /// Submit a deploy request and await the agent's decision
    pub async fn deploy_workload(&self, request: &DeployRequest) -> AgentResult<DeployResponse> {
        let subject = deploy_subject(self.started_id()?);

        let payload = serde_json::to_vec(request).map_err(|e| AgentError::EncodeFailed {
            subject: subject.clone(),
            reason: e.to_string(),
        })?;

        let reply = self
            .bus
            .request(
                &subject,
                Bytes::from(payload),
                Headers::new(),
                self.rpc_timeout,
            )
            .await
            .map_err(|e| AgentError::from_bus(subject.clone(), e))?;

        serde_json::from_slice(&reply.payload).map_err(|e| AgentError::DecodeFailed {
            subject,
            reason: e.to_string(),
        })
    }

    /// Ask the agent to release workload resources
    pub async fn undeploy(&self) -> AgentResult<()> {
        let subject = undeploy_subject(self.started_id()?);

        self.bus
            .request(&subject, Bytes::new(), Headers::new(), self.rpc_timeout)
            .await
            .map_err(|e| AgentError::from_bus(subject, e))?;

        Ok(())
    }

    /// Invoke the agent's trigger handler
    ///
    /// The originating trigger subject rides in the `x-nex-trigger-subject`
    /// header; the reply carries the execution time in `x-nex-runtime-ns`.
    pub async fn run_trigger(&self, subject: &str, payload: Bytes) -> AgentResult<Message> {
        let rpc_subject = trigger_subject(self.started_id()?);

        let mut headers = Headers::new();
        headers.insert(TRIGGER_SUBJECT_HEADER.to_string(), subject.to_string());

        self.bus
            .request(&rpc_subject, payload, headers, self.rpc_timeout)
            .await
            .map_err(|e| AgentError::from_bus(rpc_subject, e))
    }

    /// Gracefully shut the client down
    ///
    /// Draining is idempotent; per-subscription failures are logged and do
    /// not abort the drain.
    pub async fn drain(&self) -> AgentResult<()> {
        if self.drained.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let subs = {
            let mut guard = self.subscriptions.lock().await;
            std::mem::take(&mut *guard)
        };

        for sub in subs {
            if let Err(e) = sub.drain().await {
                warn!(
                    workload_id = self.id(),
                    subject = sub.subject(),
                    error = %e,
                    "failed to drain agent client subscription"
                );
            }
        }

        Ok(())
    }

    fn started_id(&self) -> AgentResult<&str> {
        self.workload_id
            .get()
            .map(String::as_str)
            .ok_or(AgentError::NotStarted)
    }
}
