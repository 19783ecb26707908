//! Bus traits and message types
//!
//! TigerStyle: External transport goes through one narrow seam.
//!
//! The node talks to two buses: the internal one shared with its agent
//! processes and the external one carrying control traffic, events, logs
//! and function triggers. Both are used exclusively through the [`Bus`]
//! trait so deployments can swap the transport and tests can run fully
//! in-process.

use crate::error::BusResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Message headers, ordered for stable serialization
pub type Headers = BTreeMap<String, String>;

/// A message delivered by or published on a bus
#[derive(Debug, Clone)]
pub struct Message {
    /// Subject the message was published on
    pub subject: String,
    /// Reply subject for request/reply exchanges
    pub reply: Option<String>,
    /// Message headers
    pub headers: Headers,
    /// Message payload
    pub payload: Bytes,
}

impl Message {
    /// Create a new message with an empty header set
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            headers: Headers::new(),
            payload: payload.into(),
        }
    }

    /// Set a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the reply subject
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Handler invoked for each message delivered to a subscription
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// A live subscription on a bus
///
/// Dropping the handle does NOT cancel delivery; subscriptions are released
/// with [`Subscription::drain`], which stops new deliveries and lets queued
/// messages finish.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Subject this subscription is bound to
    fn subject(&self) -> &str;

    /// Gracefully drain the subscription
    ///
    /// After `drain` returns, no further handler invocations occur for this
    /// subscription. Draining twice is an error.
    async fn drain(&self) -> BusResult<()>;
}

/// Message bus seam
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a message, fire-and-forget
    async fn publish(&self, subject: &str, payload: Bytes) -> BusResult<()>;

    /// Publish a prepared message (headers, reply subject)
    async fn publish_message(&self, msg: Message) -> BusResult<()>;

    /// Publish a request and await a single reply
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        headers: Headers,
        timeout: Duration,
    ) -> BusResult<Message>;

    /// Subscribe a handler to a subject
    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
    ) -> BusResult<Box<dyn Subscription>>;

    /// Reply to a request message
    async fn respond(&self, request: &Message, payload: Bytes, headers: Headers) -> BusResult<()> {
        let reply = request
            .reply
            .clone()
            .ok_or_else(|| crate::error::BusError::NoReplySubject {
                subject: request.subject.clone(),
            })?;

        let mut msg = Message::new(reply, payload);
        msg.headers = headers;
        self.publish_message(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = Message::new("foo.bar", Bytes::from_static(b"ping"))
            .with_header("x-test", "1")
            .with_reply("_INBOX.abc");

        assert_eq!(msg.subject, "foo.bar");
        assert_eq!(msg.header("x-test"), Some("1"));
        assert_eq!(msg.reply.as_deref(), Some("_INBOX.abc"));
        assert_eq!(msg.payload.as_ref(), b"ping");
    }

    #[test]
    fn test_missing_header_is_none() {
        let msg = Message::new("foo", Bytes::new());
        assert!(msg.header("absent").is_none());
    }
}
