//! Authoritative in-memory list of conversations.
//!
//! Everything here is synchronous and local. The session layer mirrors each
//! change to the persistence backend and records the outcome through the
//! `mark_*` methods.

use chrono::{DateTime, Utc};

use crate::core::conversation::{derive_title, Conversation, ConversationId};
use crate::core::message::{Message, MessageId, Role, SyncStatus};

/// Result of appending a message, carrying what the backend needs to mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendedMessage {
    pub message: Message,
    /// New title, present only when this append derived one.
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// An entity whose local state has not been acknowledged by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsyncedEntity {
    Conversation {
        id: ConversationId,
        status: SyncStatus,
    },
    Message {
        conversation_id: ConversationId,
        id: MessageId,
        status: SyncStatus,
    },
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    /// Most recently created first.
    conversations: Vec<Conversation>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.get(id).is_some()
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    /// Inserts an empty conversation at the front and makes it active.
    pub fn create_conversation(&mut self) -> ConversationId {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.active = Some(id.clone());
        id
    }

    /// Appends an already persisted conversation, keeping backend order.
    pub fn insert_loaded(&mut self, conversation: Conversation) {
        if self.contains(&conversation.id) {
            return;
        }
        self.conversations.push(conversation);
    }

    /// Makes `id` active. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: &ConversationId) -> bool {
        if self.contains(id) {
            self.active = Some(id.clone());
            true
        } else {
            false
        }
    }

    pub fn delete(&mut self, id: &ConversationId) -> Option<Conversation> {
        let index = self.conversations.iter().position(|c| &c.id == id)?;
        let removed = self.conversations.remove(index);
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        Some(removed)
    }

    pub fn append_message(
        &mut self,
        id: &ConversationId,
        role: Role,
        content: impl Into<String>,
    ) -> Option<AppendedMessage> {
        let conversation = self.get_mut(id)?;
        let message = Message::new(role, content);

        let title = if conversation.messages.is_empty() {
            let title = derive_title(&message.content);
            conversation.title = title.clone();
            Some(title)
        } else {
            None
        };

        conversation.updated_at = message.timestamp;
        conversation.messages.push(message.clone());

        Some(AppendedMessage {
            message,
            title,
            updated_at: conversation.updated_at,
        })
    }

    /// Id of the message `regenerate` would replace, if the conversation ends
    /// with a user message answered by an assistant message.
    pub fn regenerate_target(&self, id: &ConversationId) -> Option<MessageId> {
        let conversation = self.get(id)?;
        if !conversation.can_regenerate() {
            return None;
        }
        conversation.last_message().map(|message| message.id.clone())
    }

    pub fn remove_last_message(&mut self, id: &ConversationId) -> Option<Message> {
        self.get_mut(id)?.messages.pop()
    }

    pub fn mark_conversation(&mut self, id: &ConversationId, status: SyncStatus) {
        if let Some(conversation) = self.get_mut(id) {
            conversation.sync = status;
        }
    }

    pub fn mark_message(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        status: SyncStatus,
    ) {
        if let Some(message) = self
            .get_mut(conversation_id)
            .and_then(|c| c.messages.iter_mut().find(|m| &m.id == message_id))
        {
            message.sync = status;
        }
    }

    pub fn unsynced(&self) -> Vec<UnsyncedEntity> {
        let mut entities = Vec::new();
        for conversation in &self.conversations {
            if !conversation.sync.is_synced() {
                entities.push(UnsyncedEntity::Conversation {
                    id: conversation.id.clone(),
                    status: conversation.sync,
                });
            }
            for message in &conversation.messages {
                if !message.sync.is_synced() {
                    entities.push(UnsyncedEntity::Message {
                        conversation_id: conversation.id.clone(),
                        id: message.id.clone(),
                        status: message.sync,
                    });
                }
            }
        }
        entities
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
        self.active = None;
    }
}
