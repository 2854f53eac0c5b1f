//! Remote persistence contract.
//!
//! The session applies every change locally first and then mirrors it through
//! this trait. Implementations own durability; callers only learn whether a
//! single call was acknowledged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::core::conversation::ConversationId;
use crate::core::message::{MessageId, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub owner: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied after a message append. `title` is only present when
/// the append changed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationFilter {
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backend could not be reached or failed internally.
    Unavailable(String),
    /// The referenced record does not exist remotely.
    NotFound(String),
    /// The backend refused the write.
    Rejected(String),
    /// No acknowledgement arrived within the configured limit.
    Timeout(Duration),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Unavailable(reason) => write!(f, "storage unavailable: {reason}"),
            PersistenceError::NotFound(what) => write!(f, "not found in storage: {what}"),
            PersistenceError::Rejected(reason) => {
                write!(f, "storage rejected the change: {reason}")
            }
            PersistenceError::Timeout(limit) => {
                write!(f, "storage did not respond within {}s", limit.as_secs_f32())
            }
        }
    }
}

impl Error for PersistenceError {}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_conversation(&self, record: &ConversationRecord)
        -> Result<(), PersistenceError>;

    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<(), PersistenceError>;

    /// Removes the conversation and every message that belongs to it.
    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), PersistenceError>;

    async fn create_message(&self, record: &MessageRecord) -> Result<(), PersistenceError>;

    async fn delete_message(&self, id: &MessageId) -> Result<(), PersistenceError>;

    /// Conversations sorted by `updated_at` in `order`.
    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationRecord>, PersistenceError>;

    /// Messages sorted by `created_at` in `order`.
    async fn list_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> Result<Vec<MessageRecord>, PersistenceError>;
}
