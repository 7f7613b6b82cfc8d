//! Inbound message events and the reply sink.
//!
//! The chat-platform client is an external collaborator. The core only needs
//! who sent a message, in which context, and its text; replies go out through
//! a [`ResponseSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::context::{ContextId, UserId};
use crate::error::DeliveryError;

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub context: ContextId,
    pub sender_id: UserId,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(context: impl Into<ContextId>, sender_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::random(),
            context: context.into(),
            sender_id,
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }
}

/// Where replies to inbound messages are sent.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Send `text` as a reply to `to`.
    async fn respond(&self, to: &InboundMessage, text: &str) -> Result<(), DeliveryError>;
}

/// A reply captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReply {
    pub in_reply_to: MessageId,
    pub context: ContextId,
    pub text: String,
}

/// Sink that keeps every reply in memory.
#[derive(Default)]
pub struct RecordingSink {
    replies: Mutex<Vec<RecordedReply>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replies(&self) -> Vec<RecordedReply> {
        self.replies.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.replies
            .lock()
            .await
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    async fn respond(&self, to: &InboundMessage, text: &str) -> Result<(), DeliveryError> {
        self.replies.lock().await.push(RecordedReply {
            in_reply_to: to.id.clone(),
            context: to.context.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}
