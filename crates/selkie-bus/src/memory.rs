//! In-process bus implementation
//!
//! TigerStyle: Deterministic single-process delivery with explicit drain.
//!
//! `MemoryBus` backs tests and single-process deployments. Each
//! subscription owns a worker task fed by an unbounded channel; draining a
//! subscription deregisters it, lets queued messages finish, and joins the
//! worker so no handler runs after `drain` returns.

use crate::error::{BusError, BusResult};
use crate::traits::{Bus, Headers, Message, MessageHandler, Subscription};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::trace;
use uuid::Uuid;

/// Prefix for request/reply inbox subjects
const INBOX_SUBJECT_PREFIX: &str = "_INBOX.";

/// In-process message bus
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    /// Exact-match subject registry
    subjects: Mutex<HashMap<String, Vec<SubEntry>>>,
    /// Pending request inboxes
    inboxes: Mutex<HashMap<String, oneshot::Sender<Message>>>,
    sub_seq: AtomicU64,
}

struct SubEntry {
    id: u64,
    tx: mpsc::UnboundedSender<Message>,
}

impl MemoryBus {
    /// Create a new bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a subject
    pub fn subscription_count(&self, subject: &str) -> usize {
        self.inner
            .subjects
            .lock()
            .expect("bus subject registry poisoned")
            .get(subject)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn deliver(&self, msg: Message) {
        // Request inboxes take precedence and receive exactly one message
        if msg.subject.starts_with(INBOX_SUBJECT_PREFIX) {
            let inbox = self
                .inner
                .inboxes
                .lock()
                .expect("bus inbox registry poisoned")
                .remove(&msg.subject);

            if let Some(tx) = inbox {
                let _ = tx.send(msg);
            }
            return;
        }

        let senders: Vec<mpsc::UnboundedSender<Message>> = self
            .inner
            .subjects
            .lock()
            .expect("bus subject registry poisoned")
            .get(&msg.subject)
            .map(|subs| subs.iter().map(|s| s.tx.clone()).collect())
            .unwrap_or_default();

        trace!(subject = %msg.subject, subscribers = senders.len(), "delivering message");

        for tx in senders {
            // A send failure means the subscription drained concurrently
            let _ = tx.send(msg.clone());
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> BusResult<()> {
        self.publish_message(Message::new(subject, payload)).await
    }

    async fn publish_message(&self, msg: Message) -> BusResult<()> {
        self.deliver(msg);
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        headers: Headers,
        timeout: Duration,
    ) -> BusResult<Message> {
        let inbox = format!("{}{}", INBOX_SUBJECT_PREFIX, Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();

        self.inner
            .inboxes
            .lock()
            .expect("bus inbox registry poisoned")
            .insert(inbox.clone(), tx);

        let mut msg = Message::new(subject, payload).with_reply(inbox.clone());
        msg.headers = headers;
        self.deliver(msg);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::Internal {
                reason: "request inbox dropped without reply".to_string(),
            }),
            Err(_) => {
                self.inner
                    .inboxes
                    .lock()
                    .expect("bus inbox registry poisoned")
                    .remove(&inbox);

                Err(BusError::RequestTimeout {
                    subject: subject.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
    ) -> BusResult<Box<dyn Subscription>> {
        let id = self.inner.sub_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        // Sequential per subscription: after the channel closes and this
        // task exits, no handler invocation can be in flight
        let worker = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                handler(msg).await;
            }
        });

        self.inner
            .subjects
            .lock()
            .expect("bus subject registry poisoned")
            .entry(subject.to_string())
            .or_default()
            .push(SubEntry { id, tx });

        Ok(Box::new(MemorySubscription {
            id,
            subject: subject.to_string(),
            inner: Arc::clone(&self.inner),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }))
    }
}

/// Subscription handle for [`MemoryBus`]
pub struct MemorySubscription {
    id: u64,
    subject: String,
    inner: Arc<BusInner>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn subject(&self) -> &str {
        &self.subject
    }

    async fn drain(&self) -> BusResult<()> {
        let worker = self
            .worker
            .lock()
            .await
            .take()
            .ok_or_else(|| BusError::AlreadyDrained {
                subject: self.subject.clone(),
            })?;

        // Deregister so no new messages are queued; dropping the sender
        // closes the channel once queued messages are handled
        {
            let mut subjects = self
                .inner
                .subjects
                .lock()
                .expect("bus subject registry poisoned");

            if let Some(subs) = subjects.get_mut(&self.subject) {
                subs.retain(|s| s.id != self.id);
                if subs.is_empty() {
                    subjects.remove(&self.subject);
                }
            }
        }

        worker.await.map_err(|e| BusError::Internal {
            reason: format!("subscription worker panicked: {}", e),
        })
    }
}
