use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::backend::completion::ChatTurn;
use crate::backend::persistence::{ConversationRecord, MessageRecord};
use crate::core::message::{Message, MessageId, Role, SyncStatus};

/// Title given to conversations before their first message arrives.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Number of characters of the first message kept in a derived title.
pub const TITLE_MAX_CHARS: usize = 30;

const TITLE_ELLIPSIS: &str = "...";

/// Opaque conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Title shown for a conversation whose first message is `first_message`.
///
/// Counts Unicode scalar values, so multi-byte text is never split inside a
/// character.
pub fn derive_title(first_message: &str) -> String {
    if first_message.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = first_message.chars().take(TITLE_MAX_CHARS).collect();
        title.push_str(TITLE_ELLIPSIS);
        title
    } else {
        first_message.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
    pub sync: SyncStatus,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            updated_at: Utc::now(),
            sync: SyncStatus::Pending,
        }
    }

    /// Rebuilds a conversation from persisted records. Everything loaded from
    /// the backend is by definition in sync.
    pub fn from_records(record: ConversationRecord, messages: Vec<MessageRecord>) -> Self {
        Self {
            id: record.id,
            title: record.title,
            messages: messages
                .into_iter()
                .map(|message| Message {
                    id: message.id,
                    role: message.role,
                    content: message.content,
                    timestamp: message.created_at,
                    sync: SyncStatus::Synced,
                })
                .collect(),
            updated_at: record.updated_at,
            sync: SyncStatus::Synced,
        }
    }

    pub fn to_record(&self, owner: &str) -> ConversationRecord {
        ConversationRecord {
            id: self.id.clone(),
            owner: owner.to_string(),
            title: self.title.clone(),
            updated_at: self.updated_at,
        }
    }

    pub fn message_record(&self, message: &Message) -> MessageRecord {
        MessageRecord {
            id: message.id.clone(),
            conversation_id: self.id.clone(),
            role: message.role,
            content: message.content.clone(),
            created_at: message.timestamp,
        }
    }

    /// Role and content of every message, in order, as sent to the completion
    /// backend. Ids and timestamps are deliberately left out.
    pub fn history(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|message| ChatTurn::new(message.role, message.content.clone()))
            .collect()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == id)
    }

    /// True when the conversation ends with an assistant reply that directly
    /// answers a user message.
    pub fn can_regenerate(&self) -> bool {
        match self.messages.as_slice() {
            [.., prompt, reply] => prompt.role == Role::User && reply.role == Role::Assistant,
            _ => false,
        }
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.is_assistant())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
